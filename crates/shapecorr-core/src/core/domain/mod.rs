//! Per-shape geometric oracles.
//!
//! A [`Domain`] answers field, gradient and curvature queries for one shape and
//! owns the constraint projection that keeps particles on (or inside) it. The set
//! of domain kinds is closed; behaviour that differs between them is expressed by
//! matching on the variant and advertised through [`Capabilities`].

pub mod field;
pub mod plane;

use field::ScalarField;
use nalgebra::{Point3, Vector3};
use plane::CuttingPlane;
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Gradient returned for queries outside a field's buffer.
pub const FALLBACK_GRADIENT: Vector3<f64> = Vector3::new(1e-5, 1e-5, 1e-5);

/// Surface projection tolerance used when none is given explicitly.
pub const DEFAULT_SURFACE_TOLERANCE: f64 = 1e-4;

/// Non-converging projection steps allowed before the tolerance is doubled.
pub const PROJECTION_ITERATIONS_PER_DOUBLING: usize = 10_000;

/// Tolerance doublings allowed before a projection reports failure to converge.
pub const MAX_TOLERANCE_DOUBLINGS: u32 = 16;

#[derive(Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("Invalid bounding region: lower corner {lower:?} exceeds upper corner {upper:?}")]
    InvalidBounds { lower: [f64; 3], upper: [f64; 3] },
    #[error("Surface tolerance must be positive and finite, got {0}")]
    InvalidTolerance(f64),
    #[error("{kind} domains do not support cutting planes")]
    CuttingPlaneUnsupported { kind: DomainKind },
    #[error("Cannot build a bounding region from an empty point set")]
    EmptyPointSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainKind {
    Region,
    Image,
    ImplicitSurface,
}

impl fmt::Display for DomainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DomainKind::Region => "Region",
            DomainKind::Image => "Image",
            DomainKind::ImplicitSurface => "Implicit surface",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub has_gradient: bool,
    pub has_curvature: bool,
    pub has_cutting_plane: bool,
}

/// Outcome of [`Domain::apply_constraints`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub point: Point3<f64>,
    pub modified: bool,
    /// `false` when the tolerance budget ran out before reaching the surface.
    pub converged: bool,
    /// Factor the surface tolerance had been relaxed by when the walk stopped.
    /// `1.0` means the point met the configured tolerance.
    pub tolerance_multiplier: f64,
}

impl Projection {
    /// `true` when the point reached the surface only after the tolerance was relaxed.
    pub fn is_loosened(&self) -> bool {
        self.converged && self.tolerance_multiplier > 1.0
    }
}

/// Outcome of [`Domain::apply_vector_constraints`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorConstraint {
    pub update: Vector3<f64>,
    pub max_step: f64,
    pub modified: bool,
}

/// Axis-aligned box with no field. Used for point sets supplied from outside.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionDomain {
    lower: Point3<f64>,
    upper: Point3<f64>,
}

impl RegionDomain {
    pub fn new(lower: Point3<f64>, upper: Point3<f64>) -> Result<Self, DomainError> {
        if (0..3).any(|a| !(lower[a] <= upper[a])) {
            return Err(DomainError::InvalidBounds {
                lower: [lower.x, lower.y, lower.z],
                upper: [upper.x, upper.y, upper.z],
            });
        }
        Ok(Self { lower, upper })
    }

    /// Smallest box holding every point, grown by `padding` on each side.
    pub fn enclosing(points: &[Point3<f64>], padding: f64) -> Result<Self, DomainError> {
        let first = points.first().ok_or(DomainError::EmptyPointSet)?;
        let (lower, upper) = points.iter().fold((*first, *first), |(lo, hi), p| {
            (lo.inf(p), hi.sup(p))
        });
        let pad = Vector3::repeat(padding.max(0.0));
        Self::new(lower - pad, upper + pad)
    }
}

/// Scalar field with gradient; particles move freely inside the buffer.
#[derive(Debug, Clone)]
pub struct ImageDomain {
    field: ScalarField,
}

impl ImageDomain {
    pub fn new(field: ScalarField) -> Self {
        Self { field }
    }

    pub fn field(&self) -> &ScalarField {
        &self.field
    }
}

/// Zero level set of a scalar field; particles are projected onto it.
#[derive(Debug, Clone)]
pub struct ImplicitSurfaceDomain {
    field: ScalarField,
    tolerance: f64,
    cutting_plane: Option<CuttingPlane>,
}

impl ImplicitSurfaceDomain {
    pub fn new(field: ScalarField) -> Self {
        Self {
            field,
            tolerance: DEFAULT_SURFACE_TOLERANCE,
            cutting_plane: None,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Result<Self, DomainError> {
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(DomainError::InvalidTolerance(tolerance));
        }
        self.tolerance = tolerance;
        Ok(self)
    }

    pub fn field(&self) -> &ScalarField {
        &self.field
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn cutting_plane(&self) -> Option<&CuttingPlane> {
        self.cutting_plane.as_ref()
    }
}

#[derive(Debug, Clone)]
pub enum Domain {
    Region(RegionDomain),
    Image(ImageDomain),
    ImplicitSurface(ImplicitSurfaceDomain),
}

impl From<RegionDomain> for Domain {
    fn from(d: RegionDomain) -> Self {
        Domain::Region(d)
    }
}

impl From<ImageDomain> for Domain {
    fn from(d: ImageDomain) -> Self {
        Domain::Image(d)
    }
}

impl From<ImplicitSurfaceDomain> for Domain {
    fn from(d: ImplicitSurfaceDomain) -> Self {
        Domain::ImplicitSurface(d)
    }
}

impl Domain {
    pub fn kind(&self) -> DomainKind {
        match self {
            Domain::Region(_) => DomainKind::Region,
            Domain::Image(_) => DomainKind::Image,
            Domain::ImplicitSurface(_) => DomainKind::ImplicitSurface,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            Domain::Region(_) => Capabilities {
                has_gradient: false,
                has_curvature: false,
                has_cutting_plane: false,
            },
            Domain::Image(_) => Capabilities {
                has_gradient: true,
                has_curvature: false,
                has_cutting_plane: false,
            },
            Domain::ImplicitSurface(d) => Capabilities {
                has_gradient: true,
                has_curvature: true,
                has_cutting_plane: d.cutting_plane.is_some(),
            },
        }
    }

    pub fn is_surface_constrained(&self) -> bool {
        matches!(self, Domain::ImplicitSurface(_))
    }

    fn field(&self) -> Option<&ScalarField> {
        match self {
            Domain::Region(_) => None,
            Domain::Image(d) => Some(&d.field),
            Domain::ImplicitSurface(d) => Some(&d.field),
        }
    }

    pub fn lower_bound(&self) -> Point3<f64> {
        match self {
            Domain::Region(d) => d.lower,
            Domain::Image(d) => d.field.lower_bound(),
            Domain::ImplicitSurface(d) => d.field.lower_bound(),
        }
    }

    pub fn upper_bound(&self) -> Point3<f64> {
        match self {
            Domain::Region(d) => d.upper,
            Domain::Image(d) => d.field.upper_bound(),
            Domain::ImplicitSurface(d) => d.field.upper_bound(),
        }
    }

    pub fn contains(&self, p: &Point3<f64>) -> bool {
        let lower = self.lower_bound();
        let upper = self.upper_bound();
        (0..3).all(|a| p[a] >= lower[a] && p[a] <= upper[a])
    }

    pub fn clamp(&self, p: &Point3<f64>) -> Point3<f64> {
        p.sup(&self.lower_bound()).inf(&self.upper_bound())
    }

    /// Field value at `p`; zero for domains without a field.
    pub fn sample(&self, p: &Point3<f64>) -> f64 {
        self.field().map_or(0.0, |f| f.sample(p))
    }

    /// Field gradient at `p`, or [`FALLBACK_GRADIENT`] outside the buffer.
    pub fn sample_gradient(&self, p: &Point3<f64>) -> Vector3<f64> {
        match self.field() {
            Some(f) => f.sample_gradient(p).unwrap_or(FALLBACK_GRADIENT),
            None => Vector3::zeros(),
        }
    }

    pub fn sample_normal(&self, p: &Point3<f64>) -> Vector3<f64> {
        let g = self.sample_gradient(p);
        let norm = g.norm();
        if norm > f64::EPSILON {
            g / norm
        } else {
            FALLBACK_GRADIENT.normalize()
        }
    }

    pub fn sample_curvature(&self, p: &Point3<f64>) -> f64 {
        match self {
            Domain::ImplicitSurface(d) => d.field.sample_curvature(p),
            _ => 0.0,
        }
    }

    pub fn distance(&self, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
        (a - b).norm()
    }

    /// Clamps `p` into the bounding region and, for surface domains, walks it
    /// onto the zero level set.
    pub fn apply_constraints(&self, p: &Point3<f64>) -> Projection {
        let clamped = self.clamp(p);
        let mut projection = Projection {
            point: clamped,
            modified: clamped != *p,
            converged: true,
            tolerance_multiplier: 1.0,
        };

        let Domain::ImplicitSurface(surface) = self else {
            return projection;
        };

        let tolerance = surface.tolerance;
        let epsilon = tolerance * 1e-3;
        let mut multiplier = 1.0;
        let mut steps = 0usize;
        let mut doublings = 0u32;
        let mut point = projection.point;

        loop {
            let value = surface.field.sample(&point);
            let gradient = surface.field.sample_gradient(&point).unwrap_or(FALLBACK_GRADIENT);
            let magnitude = gradient.norm();

            if value.abs() <= tolerance * multiplier && magnitude >= epsilon {
                break;
            }

            point = self.clamp(&(point - gradient * (value / (magnitude + epsilon))));
            projection.modified = true;

            steps += 1;
            if steps > PROJECTION_ITERATIONS_PER_DOUBLING {
                steps = 0;
                multiplier *= 2.0;
                doublings += 1;
                if doublings > MAX_TOLERANCE_DOUBLINGS {
                    warn!(
                        x = point.x,
                        y = point.y,
                        z = point.z,
                        residual = value,
                        "Surface projection did not converge"
                    );
                    projection.converged = false;
                    break;
                }
            }
        }

        projection.point = point;
        projection.tolerance_multiplier = multiplier;
        projection
    }

    /// Restricts an update vector to what the domain allows at `p`.
    pub fn apply_vector_constraints(
        &self,
        update: &Vector3<f64>,
        p: &Point3<f64>,
        max_step: f64,
    ) -> VectorConstraint {
        let mut result = VectorConstraint {
            update: *update,
            max_step,
            modified: false,
        };

        let Domain::ImplicitSurface(surface) = self else {
            return result;
        };

        let normal = self.sample_normal(p);
        result.update = update - normal * normal.dot(update);
        result.modified = true;

        if let Some(plane) = &surface.cutting_plane {
            let distance = plane.distance(p);
            if distance < result.max_step {
                result.max_step = distance;
            }
        }

        result
    }

    /// Installs the plane through `a`, `b`, `c`.
    ///
    /// Near-collinear input leaves any existing plane untouched and returns `Ok(false)`.
    pub fn set_cutting_plane(
        &mut self,
        a: &Point3<f64>,
        b: &Point3<f64>,
        c: &Point3<f64>,
    ) -> Result<bool, DomainError> {
        let kind = self.kind();
        let Domain::ImplicitSurface(surface) = self else {
            return Err(DomainError::CuttingPlaneUnsupported { kind });
        };
        match CuttingPlane::from_points(a, b, c) {
            Some(plane) => {
                surface.cutting_plane = Some(plane);
                Ok(true)
            }
            None => {
                warn!("Ignoring cutting plane defined by near-collinear points");
                Ok(false)
            }
        }
    }

    pub fn cutting_plane(&self) -> Option<&CuttingPlane> {
        match self {
            Domain::ImplicitSurface(d) => d.cutting_plane.as_ref(),
            _ => None,
        }
    }

    /// A valid starting location for the first particle.
    pub fn surface_seed(&self) -> Point3<f64> {
        match self {
            Domain::Region(d) => Point3::from((d.lower.coords + d.upper.coords) * 0.5),
            Domain::Image(d) => d.field.node_nearest_zero(),
            Domain::ImplicitSurface(d) => {
                self.apply_constraints(&d.field.node_nearest_zero()).point
            }
        }
    }
}
