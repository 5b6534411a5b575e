use crate::core::models::transform::Transform;
use nalgebra::{Matrix3, Point3, Rotation3, Vector3};

pub fn centroid(points: &[Point3<f64>]) -> Option<Point3<f64>> {
    if points.is_empty() {
        return None;
    }
    let sum: Vector3<f64> = points.iter().map(|p| p.coords).sum();
    Some(Point3::from(sum / points.len() as f64))
}

/// Root of the summed squared distances to the centroid.
pub fn centroid_size(points: &[Point3<f64>]) -> f64 {
    let Some(c) = centroid(points) else {
        return 0.0;
    };
    points
        .iter()
        .map(|p| (p - c).norm_squared())
        .sum::<f64>()
        .sqrt()
}

/// `true` when the points span less than a plane: all coincident or all on
/// one line, judged by the second principal extent relative to the first.
pub fn is_collinear(points: &[Point3<f64>], relative_epsilon: f64) -> bool {
    let Some(c) = centroid(points) else {
        return true;
    };
    let scatter = points.iter().fold(Matrix3::zeros(), |acc, p| {
        let d = p - c;
        acc + d * d.transpose()
    });
    let mut extents: Vec<f64> = scatter
        .symmetric_eigenvalues()
        .iter()
        .map(|v| v.max(0.0))
        .collect();
    extents.sort_by(|a, b| b.total_cmp(a));
    extents[0] <= f64::MIN_POSITIVE || extents[1] <= relative_epsilon * extents[0]
}

/// Least-squares transform mapping `from_points` onto `to_points`.
///
/// The rotation is the SVD solution of the cross-covariance with reflection
/// correction; with `allow_scaling` an isotropic scale is fitted as well.
/// Returns `None` for empty or mismatched inputs, or when `from_points` has no
/// spread.
pub fn optimal_alignment(
    from_points: &[Point3<f64>],
    to_points: &[Point3<f64>],
    allow_scaling: bool,
) -> Option<Transform> {
    if from_points.len() != to_points.len() {
        return None;
    }
    let from_centroid = centroid(from_points)?;
    let to_centroid = centroid(to_points)?;

    let centered_from: Vec<_> = from_points.iter().map(|p| p - from_centroid).collect();
    let centered_to: Vec<_> = to_points.iter().map(|p| p - to_centroid).collect();

    let from_spread: f64 = centered_from.iter().map(|v| v.norm_squared()).sum();
    if from_spread <= f64::MIN_POSITIVE {
        return None;
    }

    let h = centered_from
        .iter()
        .zip(centered_to.iter())
        .fold(Matrix3::zeros(), |acc, (f, t)| acc + t * f.transpose());

    let svd = h.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;

    let d = (u * v_t).determinant();
    let mut correction = Matrix3::identity();
    if d < 0.0 {
        correction[(2, 2)] = -1.0;
    }

    let rotation_matrix = u * correction * v_t;
    let rotation = Rotation3::from_matrix_unchecked(rotation_matrix);

    let scale = if allow_scaling {
        let trace: f64 = (0..3).map(|i| svd.singular_values[i] * correction[(i, i)]).sum();
        let s = trace / from_spread;
        if s > 0.0 { s } else { 1.0 }
    } else {
        1.0
    };

    let translation = to_centroid.coords - rotation * from_centroid.coords * scale;
    Some(Transform::from_parts(rotation, translation, scale))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetrahedron() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(0.0, 0.0, 3.0),
        ]
    }

    #[test]
    fn centroid_and_size() {
        let pts = vec![Point3::new(-1.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        assert_eq!(centroid(&pts), Some(Point3::origin()));
        assert!((centroid_size(&pts) - 2f64.sqrt()).abs() < 1e-12);
        assert!(centroid(&[]).is_none());
    }

    #[test]
    fn collinear_detection() {
        let line: Vec<_> = (0..5).map(|i| Point3::new(i as f64, 2.0 * i as f64, 0.0)).collect();
        assert!(is_collinear(&line, 1e-10));
        assert!(is_collinear(&[Point3::origin(); 4], 1e-10));
        assert!(!is_collinear(&tetrahedron(), 1e-10));
    }

    #[test]
    fn optimal_alignment_recovers_rigid_motion() {
        let from = tetrahedron();
        let truth = Transform::rigid(
            Rotation3::from_euler_angles(0.3, -0.7, 1.1),
            Vector3::new(4.0, -2.0, 0.5),
        );
        let to: Vec<_> = from.iter().map(|p| truth.apply(p)).collect();

        let fitted = optimal_alignment(&from, &to, false).unwrap();
        for (p, q) in from.iter().zip(&to) {
            assert!((fitted.apply(p) - q).norm() < 1e-9);
        }
        assert!((fitted.scale() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn optimal_alignment_recovers_scale_when_allowed() {
        let from = tetrahedron();
        let truth = Transform::from_parts(
            Rotation3::from_euler_angles(-0.2, 0.4, 0.9),
            Vector3::new(1.0, 1.0, 1.0),
            2.5,
        );
        let to: Vec<_> = from.iter().map(|p| truth.apply(p)).collect();
        let fitted = optimal_alignment(&from, &to, true).unwrap();
        assert!((fitted.scale() - 2.5).abs() < 1e-9);
        for (p, q) in from.iter().zip(&to) {
            assert!((fitted.apply(p) - q).norm() < 1e-9);
        }
    }

    #[test]
    fn optimal_alignment_never_reflects() {
        let from = tetrahedron();
        let mirrored: Vec<_> = from.iter().map(|p| Point3::new(-p.x, p.y, p.z)).collect();
        let fitted = optimal_alignment(&from, &mirrored, false).unwrap();
        assert!((fitted.rotation().into_inner().determinant() - 1.0).abs() < 1e-9);
    }
}
