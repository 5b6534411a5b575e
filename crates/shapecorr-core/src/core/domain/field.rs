use nalgebra::{Point3, Vector3};
use std::ops::{Add, Mul};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FieldError {
    #[error("Grid must have at least 2 nodes along every axis, got {dims:?}")]
    InvalidDimensions { dims: [usize; 3] },
    #[error("Grid spacing must be positive and finite along every axis, got {spacing:?}")]
    InvalidSpacing { spacing: [f64; 3] },
    #[error("Expected {expected} field values for the grid, found {found}")]
    ValueCountMismatch { expected: usize, found: usize },
    #[error("Field value at node {index} is not finite")]
    NonFiniteValue { index: usize },
}

/// A scalar field sampled on a regular, axis-aligned 3-D grid.
///
/// Values are stored with x varying fastest. Gradient and mean-curvature grids
/// are derived once at construction and owned by the field; all queries are
/// trilinear interpolations over those grids.
#[derive(Debug, Clone)]
pub struct ScalarField {
    dims: [usize; 3],
    origin: Point3<f64>,
    spacing: Vector3<f64>,
    values: Vec<f64>,
    gradients: Vec<Vector3<f64>>,
    curvatures: Vec<f64>,
}

impl ScalarField {
    pub fn new(
        dims: [usize; 3],
        origin: Point3<f64>,
        spacing: Vector3<f64>,
        values: Vec<f64>,
    ) -> Result<Self, FieldError> {
        if dims.iter().any(|&d| d < 2) {
            return Err(FieldError::InvalidDimensions { dims });
        }
        if spacing.iter().any(|&h| !(h.is_finite() && h > 0.0)) {
            return Err(FieldError::InvalidSpacing {
                spacing: [spacing.x, spacing.y, spacing.z],
            });
        }
        let expected = dims[0] * dims[1] * dims[2];
        if values.len() != expected {
            return Err(FieldError::ValueCountMismatch {
                expected,
                found: values.len(),
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(FieldError::NonFiniteValue { index });
        }

        let mut field = Self {
            dims,
            origin,
            spacing,
            values,
            gradients: Vec::new(),
            curvatures: Vec::new(),
        };
        field.gradients = field.compute_gradients();
        field.curvatures = field.compute_curvatures();
        Ok(field)
    }

    /// Builds a field by evaluating `f` at every grid node.
    pub fn from_fn<F>(
        dims: [usize; 3],
        origin: Point3<f64>,
        spacing: Vector3<f64>,
        f: F,
    ) -> Result<Self, FieldError>
    where
        F: Fn(&Point3<f64>) -> f64,
    {
        let count = dims[0] * dims[1] * dims[2];
        let mut values = Vec::with_capacity(count);
        for k in 0..dims[2] {
            for j in 0..dims[1] {
                for i in 0..dims[0] {
                    let index = Vector3::new(i as f64, j as f64, k as f64);
                    let p = origin + spacing.component_mul(&index);
                    values.push(f(&p));
                }
            }
        }
        Self::new(dims, origin, spacing, values)
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn spacing(&self) -> &Vector3<f64> {
        &self.spacing
    }

    pub fn lower_bound(&self) -> Point3<f64> {
        self.origin
    }

    pub fn upper_bound(&self) -> Point3<f64> {
        let extent = Vector3::new(
            (self.dims[0] - 1) as f64,
            (self.dims[1] - 1) as f64,
            (self.dims[2] - 1) as f64,
        );
        self.origin + self.spacing.component_mul(&extent)
    }

    pub fn is_inside_buffer(&self, p: &Point3<f64>) -> bool {
        let lower = self.lower_bound();
        let upper = self.upper_bound();
        (0..3).all(|a| p[a] >= lower[a] && p[a] <= upper[a])
    }

    /// Interpolated field value. Points outside the buffer are clamped onto it.
    pub fn sample(&self, p: &Point3<f64>) -> f64 {
        self.interpolate(&self.values, p)
    }

    /// Interpolated gradient, or `None` when `p` lies outside the buffer.
    pub fn sample_gradient(&self, p: &Point3<f64>) -> Option<Vector3<f64>> {
        if self.is_inside_buffer(p) {
            Some(self.interpolate(&self.gradients, p))
        } else {
            None
        }
    }

    /// Interpolated mean curvature. Points outside the buffer are clamped onto it.
    pub fn sample_curvature(&self, p: &Point3<f64>) -> f64 {
        self.interpolate(&self.curvatures, p)
    }

    /// Grid node whose value is closest to the zero level set.
    pub fn node_nearest_zero(&self) -> Point3<f64> {
        let (best, _) = self
            .values
            .iter()
            .enumerate()
            .fold((0, f64::INFINITY), |(best, best_abs), (idx, v)| {
                if v.abs() < best_abs {
                    (idx, v.abs())
                } else {
                    (best, best_abs)
                }
            });
        let [i, j, k] = self.node_coords(best);
        self.node_position(i, j, k)
    }

    #[inline]
    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.dims[0] * (j + self.dims[1] * k)
    }

    fn node_coords(&self, idx: usize) -> [usize; 3] {
        let i = idx % self.dims[0];
        let j = (idx / self.dims[0]) % self.dims[1];
        let k = idx / (self.dims[0] * self.dims[1]);
        [i, j, k]
    }

    fn node_position(&self, i: usize, j: usize, k: usize) -> Point3<f64> {
        self.origin
            + self
                .spacing
                .component_mul(&Vector3::new(i as f64, j as f64, k as f64))
    }

    /// Continuous grid coordinates split into the lower cell corner and the
    /// fractional offset inside the cell, after clamping into the buffer.
    fn locate(&self, p: &Point3<f64>) -> ([usize; 3], [f64; 3]) {
        let mut cell = [0usize; 3];
        let mut frac = [0.0f64; 3];
        for a in 0..3 {
            let max_index = (self.dims[a] - 1) as f64;
            let u = ((p[a] - self.origin[a]) / self.spacing[a]).clamp(0.0, max_index);
            let base = (u.floor() as usize).min(self.dims[a] - 2);
            cell[a] = base;
            frac[a] = u - base as f64;
        }
        (cell, frac)
    }

    fn interpolate<T>(&self, data: &[T], p: &Point3<f64>) -> T
    where
        T: Copy + Add<Output = T> + Mul<f64, Output = T>,
    {
        let ([i, j, k], [fx, fy, fz]) = self.locate(p);
        let c = |di: usize, dj: usize, dk: usize| data[self.index(i + di, j + dj, k + dk)];

        let c00 = c(0, 0, 0) * (1.0 - fx) + c(1, 0, 0) * fx;
        let c10 = c(0, 1, 0) * (1.0 - fx) + c(1, 1, 0) * fx;
        let c01 = c(0, 0, 1) * (1.0 - fx) + c(1, 0, 1) * fx;
        let c11 = c(0, 1, 1) * (1.0 - fx) + c(1, 1, 1) * fx;

        let c0 = c00 * (1.0 - fy) + c10 * fy;
        let c1 = c01 * (1.0 - fy) + c11 * fy;

        c0 * (1.0 - fz) + c1 * fz
    }

    /// Finite-difference derivative of `data` along `axis` at a node: central in
    /// the interior, one-sided on the border.
    fn node_derivative<T>(&self, data: &[T], node: [usize; 3], axis: usize) -> T
    where
        T: Copy + Add<Output = T> + Mul<f64, Output = T>,
    {
        let step = |offset: isize| {
            let mut n = node;
            n[axis] = (n[axis] as isize + offset) as usize;
            data[self.index(n[0], n[1], n[2])]
        };
        let h = self.spacing[axis];
        let at = node[axis];
        if at == 0 {
            step(1) * (1.0 / h) + step(0) * (-1.0 / h)
        } else if at == self.dims[axis] - 1 {
            step(0) * (1.0 / h) + step(-1) * (-1.0 / h)
        } else {
            step(1) * (0.5 / h) + step(-1) * (-0.5 / h)
        }
    }

    fn compute_gradients(&self) -> Vec<Vector3<f64>> {
        let mut gradients = Vec::with_capacity(self.values.len());
        for idx in 0..self.values.len() {
            let node = self.node_coords(idx);
            gradients.push(Vector3::new(
                self.node_derivative(&self.values, node, 0),
                self.node_derivative(&self.values, node, 1),
                self.node_derivative(&self.values, node, 2),
            ));
        }
        gradients
    }

    /// Mean curvature `½ ∇·(∇φ/|∇φ|)` of the level sets.
    fn compute_curvatures(&self) -> Vec<f64> {
        let normals: Vec<Vector3<f64>> = self
            .gradients
            .iter()
            .map(|g| {
                let norm = g.norm();
                if norm > f64::EPSILON {
                    g / norm
                } else {
                    Vector3::zeros()
                }
            })
            .collect();

        (0..self.values.len())
            .map(|idx| {
                let node = self.node_coords(idx);
                let divergence: f64 = (0..3)
                    .map(|axis| self.node_derivative(&normals, node, axis)[axis])
                    .sum();
                0.5 * divergence
            })
            .collect()
    }
}
