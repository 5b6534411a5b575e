use super::{EnergyTerm, MAX_MOVE_FACTOR, TermEvaluation, fallback_sigma};
use crate::core::models::attribute::MeanCurvatureAttribute;
use crate::core::models::system::ParticleSystem;
use crate::engine::error::EngineError;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector3;
use tracing::trace;

/// Neighbours averaged when estimating a particle's kernel width.
pub const SIGMA_NEIGHBOURS: usize = 6;

/// Neighbour search radius in kernel widths.
pub const CUTOFF_SIGMAS: f64 = 3.0;

const MIN_SIGMA: f64 = 1e-8;

/// Per-domain neighbour structure built once per sweep.
///
/// The tree holds the positions seen by `prepare`. Particles moved later in
/// the same sweep travel at most `MAX_MOVE_FACTOR` kernel widths, so queries
/// widen the radius by twice that drift and then filter on live positions.
struct DomainCache {
    tree: KdTree<f64, 3>,
    sigmas: Vec<f64>,
    drift: f64,
}

/// Entropy of the particle distribution on each surface, estimated with an
/// adaptive Gaussian Parzen window. Descending it spreads particles apart.
pub struct SamplingTerm {
    curvature_adaptivity: f64,
    caches: Vec<DomainCache>,
}

impl SamplingTerm {
    pub fn new(curvature_adaptivity: f64) -> Self {
        Self {
            curvature_adaptivity,
            caches: Vec::new(),
        }
    }

    /// Kernel width of particle `(domain, index)` as of the last `prepare`.
    pub fn sigma(&self, domain: usize, index: usize) -> Option<f64> {
        self.caches.get(domain)?.sigmas.get(index).copied()
    }

    fn build_cache(&self, system: &ParticleSystem, domain: usize) -> DomainCache {
        let positions: Vec<[f64; 3]> = system
            .local_positions(domain)
            .iter()
            .map(|p| [p.x, p.y, p.z])
            .collect();
        let tree: KdTree<f64, 3> = (&positions).into();
        let fallback = fallback_sigma(system, domain);

        let curvature = system
            .find_attribute(MeanCurvatureAttribute::NAME)
            .map(|id| system.attribute(id))
            .filter(|_| self.curvature_adaptivity > 0.0);
        let summary = curvature.and_then(|a| a.summary(domain));

        let sigmas = positions
            .iter()
            .enumerate()
            .map(|(i, query)| {
                let neighbours: Vec<f64> = tree
                    .nearest_n::<SquaredEuclidean>(query, SIGMA_NEIGHBOURS + 1)
                    .into_iter()
                    .filter(|n| n.item as usize != i)
                    .take(SIGMA_NEIGHBOURS)
                    .map(|n| n.distance.sqrt())
                    .collect();
                let mut sigma = if neighbours.is_empty() {
                    fallback
                } else {
                    neighbours.iter().sum::<f64>() / neighbours.len() as f64
                };

                if let (Some(attribute), Some(summary)) = (curvature, summary) {
                    if summary.std_dev > 0.0 {
                        if let Some(kappa) = attribute.value(domain, i) {
                            let deviation = (kappa - summary.mean).abs() / summary.std_dev;
                            sigma /= 1.0 + self.curvature_adaptivity * deviation;
                        }
                    }
                }
                sigma.max(MIN_SIGMA)
            })
            .collect::<Vec<f64>>();
        let drift = 2.0 * MAX_MOVE_FACTOR * sigmas.iter().copied().fold(0.0, f64::max);

        DomainCache {
            tree,
            sigmas,
            drift,
        }
    }
}

impl EnergyTerm for SamplingTerm {
    fn name(&self) -> &'static str {
        "sampling"
    }

    fn prepare(
        &mut self,
        system: &ParticleSystem,
        _regularization: f64,
    ) -> Result<(), EngineError> {
        let caches = (0..system.num_domains())
            .map(|d| self.build_cache(system, d))
            .collect();
        self.caches = caches;
        trace!(domains = self.caches.len(), "Sampling caches rebuilt");
        Ok(())
    }

    fn evaluate(&self, system: &ParticleSystem, domain: usize, index: usize) -> TermEvaluation {
        let Some(cache) = self.caches.get(domain) else {
            return TermEvaluation::default();
        };
        let Some(&sigma) = cache.sigmas.get(index) else {
            return TermEvaluation::default();
        };

        let here = system.position(domain, index);
        let positions = system.local_positions(domain);
        let radius = CUTOFF_SIGMAS * sigma;
        let search = radius + cache.drift;
        let query = [here.x, here.y, here.z];

        let two_sigma_sq = 2.0 * sigma * sigma;
        let mut weighted = Vector3::zeros();
        let mut total = 0.0;
        for neighbour in cache.tree.within::<SquaredEuclidean>(&query, search * search) {
            let j = neighbour.item as usize;
            if j == index {
                continue;
            }
            let Some(other) = positions.get(j) else {
                continue;
            };
            let r: Vector3<f64> = here - other;
            if r.norm_squared() > radius * radius {
                continue;
            }
            let q = (-r.norm_squared() / two_sigma_sq).exp();
            weighted += r * q;
            total += q;
        }

        let gradient = if total > 0.0 {
            -weighted / (sigma * sigma * total)
        } else {
            Vector3::zeros()
        };
        TermEvaluation {
            gradient,
            sigma: Some(sigma),
        }
    }
}
