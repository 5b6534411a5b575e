use super::evaluation::EvaluationError;
use crate::core::models::system::ParticleSystem;
use nalgebra::{DMatrix, DVector, Point3, SymmetricEigen};

/// Eigenvalues below this fraction of the largest are treated as zero.
const RELATIVE_EIGEN_FLOOR: f64 = 1e-12;

/// Global correspondence coordinates of a population, one row per shape and
/// `3·N` columns laid out as `x0 y0 z0 x1 y1 z1 …`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeModel {
    matrix: DMatrix<f64>,
}

impl ShapeModel {
    pub fn from_matrix(matrix: DMatrix<f64>) -> Result<Self, EvaluationError> {
        if matrix.ncols() == 0 || matrix.ncols() % 3 != 0 {
            return Err(EvaluationError::EmptyShapes);
        }
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(EvaluationError::NonFinite);
        }
        Ok(Self { matrix })
    }

    /// Stacks ordered point sets, which must all hold the same number of points.
    pub fn from_point_sets(shapes: &[Vec<Point3<f64>>]) -> Result<Self, EvaluationError> {
        let expected = shapes.first().map_or(0, Vec::len);
        if expected == 0 {
            return Err(EvaluationError::EmptyShapes);
        }
        if let Some((index, shape)) = shapes.iter().enumerate().find(|(_, s)| s.len() != expected) {
            return Err(EvaluationError::InconsistentShape {
                index,
                expected,
                found: shape.len(),
            });
        }
        let matrix = DMatrix::from_fn(shapes.len(), 3 * expected, |r, c| shapes[r][c / 3][c % 3]);
        Self::from_matrix(matrix)
    }

    /// Stacks the global positions of every domain.
    pub fn from_system(system: &ParticleSystem) -> Result<Self, EvaluationError> {
        let shapes: Vec<Vec<Point3<f64>>> = (0..system.num_domains())
            .map(|d| system.global_positions(d))
            .collect();
        Self::from_point_sets(&shapes)
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn num_shapes(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn num_points(&self) -> usize {
        self.matrix.ncols() / 3
    }

    pub fn shape(&self, index: usize) -> DVector<f64> {
        self.matrix.row(index).transpose()
    }

    /// The model with shape `index` removed.
    pub fn without(&self, index: usize) -> DMatrix<f64> {
        self.matrix.clone().remove_row(index)
    }
}

/// PCA of a set of row vectors.
#[derive(Debug, Clone)]
pub struct PrincipalComponents {
    pub mean: DVector<f64>,
    /// Unit mode vectors as columns, ordered by decreasing variance. Modes with
    /// zero variance are omitted.
    pub modes: DMatrix<f64>,
    /// Squared singular values of the centred data, descending, one per sample.
    pub squared_singular_values: Vec<f64>,
    pub num_samples: usize,
}

impl PrincipalComponents {
    /// Decomposes the `S×S` Gram matrix of the centred rows.
    pub fn fit(rows: &DMatrix<f64>) -> Result<Self, EvaluationError> {
        let num_samples = rows.nrows();
        if num_samples == 0 {
            return Err(EvaluationError::TooFewShapes {
                required: 1,
                found: 0,
            });
        }
        let mean: DVector<f64> = rows.row_mean().transpose();
        let centred = DMatrix::from_fn(num_samples, rows.ncols(), |r, c| rows[(r, c)] - mean[c]);

        let gram = &centred * centred.transpose();
        let eigen = SymmetricEigen::new(gram);
        if eigen.eigenvalues.iter().any(|v| !v.is_finite()) {
            return Err(EvaluationError::NonFinite);
        }

        let mut order: Vec<usize> = (0..num_samples).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

        let largest = eigen.eigenvalues[order[0]].max(0.0);
        let floor = largest * RELATIVE_EIGEN_FLOOR;

        let mut squared_singular_values = Vec::with_capacity(num_samples);
        let mut columns = Vec::new();
        for &k in &order {
            let value = eigen.eigenvalues[k];
            if value > floor && value > 0.0 {
                let v = eigen.eigenvectors.column(k);
                let u = centred.transpose() * v / value.sqrt();
                columns.push(u);
                squared_singular_values.push(value);
            } else {
                squared_singular_values.push(0.0);
            }
        }

        let dimension = rows.ncols();
        let modes = if columns.is_empty() {
            DMatrix::zeros(dimension, 0)
        } else {
            DMatrix::from_columns(&columns)
        };

        Ok(Self {
            mean,
            modes,
            squared_singular_values,
            num_samples,
        })
    }

    pub fn num_modes(&self) -> usize {
        self.modes.ncols()
    }

    /// Per-mode sample variances `s²/(S-1)`.
    pub fn variances(&self) -> Vec<f64> {
        let denom = (self.num_samples.max(2) - 1) as f64;
        self.squared_singular_values
            .iter()
            .take(self.num_modes())
            .map(|s2| s2 / denom)
            .collect()
    }

    /// Projects `shape` onto the first `n` modes and maps it back.
    pub fn reconstruct(&self, shape: &DVector<f64>, n: usize) -> DVector<f64> {
        let n = n.min(self.num_modes());
        let basis = self.modes.columns(0, n);
        let coefficients = basis.transpose() * (shape - &self.mean);
        &self.mean + basis * coefficients
    }

    /// Shape at the given mode coefficients.
    pub fn synthesize(&self, coefficients: &DVector<f64>) -> DVector<f64> {
        let n = coefficients.len().min(self.num_modes());
        &self.mean + self.modes.columns(0, n) * coefficients.rows(0, n)
    }
}

/// Unflattens an `x0 y0 z0 x1 …` shape vector into its points.
pub fn shape_points(shape: &DVector<f64>) -> Vec<Point3<f64>> {
    (0..shape.len() / 3)
        .map(|i| Point3::new(shape[3 * i], shape[3 * i + 1], shape[3 * i + 2]))
        .collect()
}

/// Mean Euclidean distance between corresponding points of two flattened shapes.
pub fn mean_point_distance(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    let points = a.len() / 3;
    if points == 0 {
        return 0.0;
    }
    let total: f64 = (0..points)
        .map(|i| (a.fixed_rows::<3>(3 * i) - b.fixed_rows::<3>(3 * i)).norm())
        .sum();
    total / points as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_population() -> DMatrix<f64> {
        // Three two-point shapes that differ only along x of the first point.
        DMatrix::from_row_slice(
            3,
            6,
            &[
                0.0, 0.0, 0.0, 1.0, 1.0, 1.0, //
                1.0, 0.0, 0.0, 1.0, 1.0, 1.0, //
                2.0, 0.0, 0.0, 1.0, 1.0, 1.0,
            ],
        )
    }

    #[test]
    fn from_point_sets_flattens_in_xyz_order() {
        let model = ShapeModel::from_point_sets(&[
            vec![Point3::new(1.0, 2.0, 3.0), Point3::new(4.0, 5.0, 6.0)],
            vec![Point3::new(7.0, 8.0, 9.0), Point3::new(10.0, 11.0, 12.0)],
        ])
        .unwrap();
        assert_eq!(model.num_shapes(), 2);
        assert_eq!(model.num_points(), 2);
        assert_eq!(model.matrix()[(1, 4)], 11.0);
    }

    #[test]
    fn from_point_sets_rejects_ragged_input() {
        let err = ShapeModel::from_point_sets(&[
            vec![Point3::origin(), Point3::origin()],
            vec![Point3::origin()],
        ])
        .unwrap_err();
        assert_eq!(
            err,
            EvaluationError::InconsistentShape {
                index: 1,
                expected: 2,
                found: 1
            }
        );
        assert_eq!(
            ShapeModel::from_point_sets(&[]).unwrap_err(),
            EvaluationError::EmptyShapes
        );
    }

    #[test]
    fn pca_finds_the_single_direction_of_variation() {
        let pca = PrincipalComponents::fit(&line_population()).unwrap();
        assert_eq!(pca.num_modes(), 1);
        assert!((pca.modes[(0, 0)].abs() - 1.0).abs() < 1e-12);
        assert!((pca.squared_singular_values[0] - 2.0).abs() < 1e-12);
        assert!((pca.variances()[0] - 1.0).abs() < 1e-12);
        assert_eq!(pca.squared_singular_values[1], 0.0);
    }

    #[test]
    fn reconstruct_is_exact_inside_the_span() {
        let data = line_population();
        let pca = PrincipalComponents::fit(&data).unwrap();
        let shape = DVector::from_vec(vec![5.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let rebuilt = pca.reconstruct(&shape, 1);
        assert!((rebuilt - shape).norm() < 1e-9);
    }

    #[test]
    fn mean_point_distance_averages_per_point() {
        let a = DVector::from_vec(vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let b = DVector::from_vec(vec![3.0, 4.0, 0.0, 0.0, 0.0, 1.0]);
        assert!((mean_point_distance(&a, &b) - 3.0).abs() < 1e-12);
    }
}
