use crate::core::models::system::ParticleSystem;
use crate::core::models::transform::Transform;
use crate::core::utils::geometry::{centroid, centroid_size, is_collinear, optimal_alignment};
use nalgebra::{Point3, Rotation3, Vector3};
use thiserror::Error;
use tracing::{debug, instrument};

pub const DEFAULT_CONVERGENCE_TOLERANCE: f64 = 1e-10;
pub const DEFAULT_MAX_ROUNDS: usize = 100;

const COLLINEAR_EPSILON: f64 = 1e-10;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ProcrustesError {
    #[error("The particle system has no domains")]
    NoDomains,
    #[error("The particle system has no particles")]
    NoParticles,
    #[error("At least 3 particles are required, found {found}")]
    TooFewParticles { found: usize },
    #[error("Particles of domain {domain} are collinear")]
    Collinear { domain: usize },
    #[error("Domains hold different particle counts")]
    Unbalanced,
}

/// Generalized Procrustes alignment of every domain to the population mean.
#[derive(Debug, Clone)]
pub struct ProcrustesRegistrar {
    scaling: bool,
    tolerance: f64,
    max_rounds: usize,
}

impl Default for ProcrustesRegistrar {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ProcrustesRegistrar {
    pub fn new(scaling: bool) -> Self {
        Self {
            scaling,
            tolerance: DEFAULT_CONVERGENCE_TOLERANCE,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_convergence(mut self, tolerance: f64, max_rounds: usize) -> Self {
        self.tolerance = tolerance;
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn scaling(&self) -> bool {
        self.scaling
    }

    /// Aligns every domain's global configuration to the mean and composes the
    /// result into the domain transforms in one update.
    ///
    /// # Return
    ///
    /// The update applied to each domain, in domain order.
    ///
    /// # Errors
    ///
    /// Fails without touching any transform when the system has no domains, no
    /// particles, fewer than three particles, or a collinear configuration.
    #[instrument(skip_all, name = "procrustes_registration")]
    pub fn run(&self, system: &mut ParticleSystem) -> Result<Vec<Transform>, ProcrustesError> {
        let shapes = self.validated_shapes(system)?;
        let updates = self.align(&shapes)?;

        let transforms = system
            .transforms()
            .iter()
            .zip(&updates)
            .map(|(current, update)| current.then(update))
            .collect();
        system
            .set_transforms(transforms)
            .map_err(|_| ProcrustesError::Unbalanced)?;
        Ok(updates)
    }

    fn validated_shapes(
        &self,
        system: &ParticleSystem,
    ) -> Result<Vec<Vec<Point3<f64>>>, ProcrustesError> {
        if system.num_domains() == 0 {
            return Err(ProcrustesError::NoDomains);
        }
        if !system.is_balanced() {
            return Err(ProcrustesError::Unbalanced);
        }
        let count = system.num_particles();
        if count == 0 {
            return Err(ProcrustesError::NoParticles);
        }
        if count < 3 {
            return Err(ProcrustesError::TooFewParticles { found: count });
        }

        let shapes: Vec<Vec<Point3<f64>>> = (0..system.num_domains())
            .map(|d| system.global_positions(d))
            .collect();
        if let Some(domain) = shapes.iter().position(|s| is_collinear(s, COLLINEAR_EPSILON)) {
            return Err(ProcrustesError::Collinear { domain });
        }
        Ok(shapes)
    }

    /// Iterates mean estimation and per-shape alignment until the mean settles.
    fn align(&self, shapes: &[Vec<Point3<f64>>]) -> Result<Vec<Transform>, ProcrustesError> {
        let target_size =
            shapes.iter().map(|s| centroid_size(s)).sum::<f64>() / shapes.len() as f64;
        let mut working: Vec<Vec<Point3<f64>>> = shapes.to_vec();
        let mut updates = vec![Transform::identity(); shapes.len()];
        let mut mean = mean_shape(&working);
        let threshold = self.tolerance * target_size.max(1.0);

        for round in 0..self.max_rounds {
            for (d, shape) in working.iter_mut().enumerate() {
                let fit = optimal_alignment(shape, &mean, self.scaling)
                    .ok_or(ProcrustesError::Collinear { domain: d })?;
                apply_in_place(shape, &fit);
                updates[d] = updates[d].then(&fit);
            }

            if self.scaling {
                let size =
                    working.iter().map(|s| centroid_size(s)).sum::<f64>() / working.len() as f64;
                if size > 0.0 {
                    let pivot = centroid(&mean).unwrap_or_else(Point3::origin);
                    let k = target_size / size;
                    let rescale =
                        Transform::from_parts(Rotation3::identity(), pivot.coords * (1.0 - k), k);
                    for (d, shape) in working.iter_mut().enumerate() {
                        apply_in_place(shape, &rescale);
                        updates[d] = updates[d].then(&rescale);
                    }
                }
            }

            let next = mean_shape(&working);
            let change = next
                .iter()
                .zip(&mean)
                .map(|(a, b)| (a - b).norm())
                .fold(0.0, f64::max);
            mean = next;
            if change <= threshold {
                debug!(rounds = round + 1, change, "Procrustes mean converged");
                break;
            }
        }
        Ok(updates)
    }
}

fn mean_shape(shapes: &[Vec<Point3<f64>>]) -> Vec<Point3<f64>> {
    let n = shapes.len() as f64;
    (0..shapes[0].len())
        .map(|i| {
            let sum: Vector3<f64> = shapes.iter().map(|s| s[i].coords).sum();
            Point3::from(sum / n)
        })
        .collect()
}

fn apply_in_place(shape: &mut [Point3<f64>], transform: &Transform) {
    for p in shape.iter_mut() {
        *p = transform.apply(p);
    }
}
