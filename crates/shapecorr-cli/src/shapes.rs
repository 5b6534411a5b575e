use crate::error::{CliError, Result};
use nalgebra::{Point3, Vector3};
use serde::Deserialize;
use shapecorr::core::domain::ImplicitSurfaceDomain;
use shapecorr::core::domain::field::ScalarField;
use tracing::debug;

const MIN_GRID_RESOLUTION: usize = 4;

/// Analytic implicit shape, centred at the origin of its own frame.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum ShapeKind {
    Sphere {
        radius: f64,
    },
    Ellipsoid {
        radii: [f64; 3],
    },
    #[serde(rename = "box")]
    Cuboid {
        #[serde(rename = "half-extents")]
        half_extents: [f64; 3],
    },
}

impl ShapeKind {
    fn half_extents(&self) -> Vector3<f64> {
        match self {
            ShapeKind::Sphere { radius } => Vector3::repeat(*radius),
            ShapeKind::Ellipsoid { radii } => Vector3::from(*radii),
            ShapeKind::Cuboid { half_extents } => Vector3::from(*half_extents),
        }
    }

    /// Signed distance (negative inside) at offset `q` from the centre.
    ///
    /// Exact for spheres and boxes; for ellipsoids the zero set is exact and
    /// the magnitude is scaled by the smallest radius.
    pub fn signed_distance(&self, q: &Vector3<f64>) -> f64 {
        match self {
            ShapeKind::Sphere { radius } => q.norm() - radius,
            ShapeKind::Ellipsoid { radii } => {
                let r = Vector3::from(*radii);
                (q.component_div(&r).norm() - 1.0) * r.min()
            }
            ShapeKind::Cuboid { half_extents } => {
                let d = q.abs() - Vector3::from(*half_extents);
                let outside = d.map(|v| v.max(0.0)).norm();
                let inside = d.max().min(0.0);
                outside + inside
            }
        }
    }
}

/// One `[[shapes]]` entry of the configuration file.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ShapeSpec {
    pub name: String,
    pub shape: ShapeKind,
    #[serde(default)]
    pub center: [f64; 3],
    pub tolerance: Option<f64>,
    pub cutting_plane: Option<[[f64; 3]; 3]>,
}

/// Sampling grid shared by every shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSettings {
    /// Nodes along each axis.
    pub resolution: usize,
    /// Margin around the shape's bounding box, relative to its half extents.
    pub padding: f64,
    /// Surface projection tolerance for shapes that do not set their own.
    pub surface_tolerance: f64,
}

/// Samples `spec` onto a regular grid and wraps it as a surface domain.
///
/// # Errors
///
/// Returns [`CliError::Shape`] for non-positive extents, a grid too coarse to
/// resolve the surface, or an invalid tolerance.
pub fn build_domain(spec: &ShapeSpec, grid: &GridSettings) -> Result<ImplicitSurfaceDomain> {
    let shape_error = |source: anyhow::Error| CliError::Shape {
        name: spec.name.clone(),
        source,
    };

    let half = spec.shape.half_extents();
    if half.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
        return Err(shape_error(anyhow::anyhow!(
            "extents must be positive and finite, got {:?}",
            half.as_slice()
        )));
    }
    if grid.resolution < MIN_GRID_RESOLUTION {
        return Err(shape_error(anyhow::anyhow!(
            "grid resolution must be at least {MIN_GRID_RESOLUTION}, got {}",
            grid.resolution
        )));
    }
    if !(grid.padding.is_finite() && grid.padding > 0.0) {
        return Err(shape_error(anyhow::anyhow!(
            "grid padding must be positive, got {}",
            grid.padding
        )));
    }

    let center = Point3::from(spec.center);
    let reach = half * (1.0 + grid.padding);
    let origin = center - reach;
    let spacing = reach * 2.0 / (grid.resolution - 1) as f64;
    let shape = &spec.shape;
    let field = ScalarField::from_fn([grid.resolution; 3], origin, spacing, |p| {
        shape.signed_distance(&(p - center))
    })
    .map_err(|e| shape_error(e.into()))?;

    let tolerance = spec.tolerance.unwrap_or(grid.surface_tolerance);
    let domain = ImplicitSurfaceDomain::new(field)
        .with_tolerance(tolerance)
        .map_err(|e| shape_error(e.into()))?;
    debug!(name = %spec.name, resolution = grid.resolution, "Built shape domain");
    Ok(domain)
}
