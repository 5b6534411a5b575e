use nalgebra::{Point3, Unit, Vector3};

/// Relative threshold on `|(b-a)×(c-a)|` below which three points are treated as collinear.
pub const COLLINEAR_EPSILON: f64 = 1e-10;

/// An oriented plane through `point` with unit `normal`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CuttingPlane {
    point: Point3<f64>,
    normal: Unit<Vector3<f64>>,
}

impl CuttingPlane {
    /// Plane through `a`, `b`, `c`, oriented by `(b-a)×(c-a)`.
    ///
    /// Returns `None` for coincident or near-collinear input.
    pub fn from_points(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Option<Self> {
        let ab = b - a;
        let ac = c - a;
        let q = ab.cross(&ac);
        let magnitude = q.norm();
        let scale = ab.norm() * ac.norm();

        if magnitude == 0.0 || magnitude <= COLLINEAR_EPSILON * scale {
            return None;
        }

        Some(Self {
            point: *a,
            normal: Unit::new_unchecked(q / magnitude),
        })
    }

    pub fn point(&self) -> &Point3<f64> {
        &self.point
    }

    pub fn normal(&self) -> &Unit<Vector3<f64>> {
        &self.normal
    }

    /// Signed distance of `p` from the plane, positive on the normal side.
    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&(p - self.point))
    }

    pub fn distance(&self, p: &Point3<f64>) -> f64 {
        self.signed_distance(p).abs()
    }
}
