use nalgebra::{Matrix3, Point3, Rotation3, Similarity3, Translation3, UnitQuaternion, Vector3};

/// Local-to-global mapping of one domain: `x_global = s · R · x_local + t`.
///
/// Rigid transforms are the special case `s = 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform(Similarity3<f64>);

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self(Similarity3::identity())
    }

    /// # Panics
    ///
    /// Panics if `scale` is zero.
    pub fn from_parts(rotation: Rotation3<f64>, translation: Vector3<f64>, scale: f64) -> Self {
        Self(Similarity3::from_parts(
            Translation3::from(translation),
            UnitQuaternion::from_rotation_matrix(&rotation),
            scale,
        ))
    }

    pub fn rigid(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self::from_parts(rotation, translation, 1.0)
    }

    pub fn scale(&self) -> f64 {
        self.0.scaling()
    }

    pub fn rotation(&self) -> Rotation3<f64> {
        self.0.isometry.rotation.to_rotation_matrix()
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.0.isometry.translation.vector
    }

    pub fn apply(&self, local: &Point3<f64>) -> Point3<f64> {
        self.0.transform_point(local)
    }

    pub fn apply_inverse(&self, global: &Point3<f64>) -> Point3<f64> {
        self.0.inverse_transform_point(global)
    }

    /// Pulls a gradient taken with respect to global coordinates back to local
    /// coordinates (`s · Rᵀ · g`).
    pub fn gradient_to_local(&self, global_gradient: &Vector3<f64>) -> Vector3<f64> {
        self.0.isometry.rotation.inverse_transform_vector(global_gradient) * self.scale()
    }

    /// The transform that applies `self` first and `next` afterwards.
    pub fn then(&self, next: &Transform) -> Transform {
        Transform(next.0 * self.0)
    }

    pub fn is_identity(&self, tolerance: f64) -> bool {
        (self.scale() - 1.0).abs() <= tolerance
            && self.translation().norm() <= tolerance
            && (self.rotation().into_inner() - Matrix3::identity()).norm() <= tolerance
    }
}
