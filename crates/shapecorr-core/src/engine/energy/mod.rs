//! Energy terms driving particle motion and the weighted model combining them.

pub mod correspondence;
pub mod sampling;

use super::error::EngineError;
use crate::core::models::system::ParticleSystem;
use nalgebra::Vector3;

pub use correspondence::CorrespondenceTerm;
pub use sampling::SamplingTerm;

/// Largest step a particle may take, as a multiple of its kernel width.
pub const MAX_MOVE_FACTOR: f64 = 0.5;

/// Kernel width used when no term supplies one, as a fraction of the domain diagonal.
pub const FALLBACK_SIGMA_FRACTION: f64 = 0.05;

/// Gradient contribution of one term at one particle, in the domain's local frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TermEvaluation {
    pub gradient: Vector3<f64>,
    /// Local kernel width, when the term defines one.
    pub sigma: Option<f64>,
}

pub trait EnergyTerm: Send + Sync {
    fn name(&self) -> &'static str;

    /// Rebuilds per-sweep caches from the current positions.
    fn prepare(&mut self, system: &ParticleSystem, regularization: f64) -> Result<(), EngineError>;

    fn evaluate(&self, system: &ParticleSystem, domain: usize, index: usize) -> TermEvaluation;

    /// Per-mode variances of the population, descending, for terms that model one.
    fn mode_variances(&self) -> Option<&[f64]> {
        None
    }
}

struct WeightedTerm {
    weight: f64,
    term: Box<dyn EnergyTerm>,
}

/// Weighted sum of energy terms.
#[derive(Default)]
pub struct EnergyModel {
    terms: Vec<WeightedTerm>,
}

impl EnergyModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// The model used by the optimizer: surface sampling plus the
    /// correspondence entropy weighted by `correspondence_weight`.
    pub fn standard(correspondence_weight: f64, curvature_adaptivity: f64) -> Self {
        Self::new()
            .with_term(Box::new(SamplingTerm::new(curvature_adaptivity)), 1.0)
            .with_term(Box::new(CorrespondenceTerm::new()), correspondence_weight)
    }

    pub fn with_term(mut self, term: Box<dyn EnergyTerm>, weight: f64) -> Self {
        self.terms.push(WeightedTerm { weight, term });
        self
    }

    pub fn term_names(&self) -> Vec<&'static str> {
        self.terms.iter().map(|t| t.term.name()).collect()
    }

    pub fn prepare(
        &mut self,
        system: &ParticleSystem,
        regularization: f64,
    ) -> Result<(), EngineError> {
        for weighted in &mut self.terms {
            if weighted.weight != 0.0 {
                weighted.term.prepare(system, regularization)?;
            }
        }
        Ok(())
    }

    /// Variances reported by the first term that models the population.
    pub fn mode_variances(&self) -> Vec<f64> {
        self.terms
            .iter()
            .find_map(|t| t.term.mode_variances())
            .map(<[f64]>::to_vec)
            .unwrap_or_default()
    }

    /// Combined gradient and kernel width at particle `(domain, index)`.
    pub fn evaluate(&self, system: &ParticleSystem, domain: usize, index: usize) -> TermEvaluation {
        let mut total = TermEvaluation::default();
        for weighted in self.terms.iter().filter(|t| t.weight != 0.0) {
            let eval = weighted.term.evaluate(system, domain, index);
            total.gradient += eval.gradient * weighted.weight;
            total.sigma = match (total.sigma, eval.sigma) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }
        total
    }

    /// Gradient-descent step for one particle, restricted by its domain.
    ///
    /// The raw step is `-sigma^2 * gradient`. It is projected onto what the
    /// domain allows at the particle and then shortened to at most
    /// `sigma * MAX_MOVE_FACTOR` or the domain's own limit, whichever is smaller.
    pub fn step(&self, system: &ParticleSystem, domain: usize, index: usize) -> Vector3<f64> {
        self.scaled_step(system, domain, index, 1.0)
    }

    /// Like [`EnergyModel::step`] with the raw step multiplied by `multiplier`
    /// before the domain restrictions apply.
    pub fn scaled_step(
        &self,
        system: &ParticleSystem,
        domain: usize,
        index: usize,
        multiplier: f64,
    ) -> Vector3<f64> {
        let eval = self.evaluate(system, domain, index);
        let sigma = eval
            .sigma
            .unwrap_or_else(|| fallback_sigma(system, domain));
        let position = system.position(domain, index);
        let raw = -eval.gradient * (sigma * sigma * multiplier);

        let constrained =
            system
                .domain(domain)
                .apply_vector_constraints(&raw, &position, sigma * MAX_MOVE_FACTOR);
        let length = constrained.update.norm();
        if !length.is_finite() {
            return Vector3::zeros();
        }
        if length > constrained.max_step {
            constrained.update * (constrained.max_step / length)
        } else {
            constrained.update
        }
    }
}

pub(crate) fn fallback_sigma(system: &ParticleSystem, domain: usize) -> f64 {
    let d = system.domain(domain);
    (d.upper_bound() - d.lower_bound()).norm() * FALLBACK_SIGMA_FRACTION
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{Domain, RegionDomain};
    use nalgebra::Point3;

    struct Constant {
        gradient: Vector3<f64>,
        sigma: Option<f64>,
    }

    impl EnergyTerm for Constant {
        fn name(&self) -> &'static str {
            "constant"
        }
        fn prepare(&mut self, _: &ParticleSystem, _: f64) -> Result<(), EngineError> {
            Ok(())
        }
        fn evaluate(&self, _: &ParticleSystem, _: usize, _: usize) -> TermEvaluation {
            TermEvaluation {
                gradient: self.gradient,
                sigma: self.sigma,
            }
        }
    }

    fn single_particle() -> ParticleSystem {
        let mut system = ParticleSystem::new();
        let region: Domain =
            RegionDomain::new(Point3::new(-10.0, -10.0, -10.0), Point3::new(10.0, 10.0, 10.0))
                .unwrap()
                .into();
        system.add_domain_with_particles(region, &[Point3::origin()]).unwrap();
        system
    }

    #[test]
    fn evaluate_sums_weighted_gradients_and_keeps_smallest_sigma() {
        let system = single_particle();
        let model = EnergyModel::new()
            .with_term(
                Box::new(Constant {
                    gradient: Vector3::new(1.0, 0.0, 0.0),
                    sigma: Some(2.0),
                }),
                1.0,
            )
            .with_term(
                Box::new(Constant {
                    gradient: Vector3::new(0.0, 1.0, 0.0),
                    sigma: Some(0.5),
                }),
                3.0,
            );
        let eval = model.evaluate(&system, 0, 0);
        assert_eq!(eval.gradient, Vector3::new(1.0, 3.0, 0.0));
        assert_eq!(eval.sigma, Some(0.5));
    }

    #[test]
    fn zero_weight_terms_are_skipped() {
        let system = single_particle();
        let model = EnergyModel::new().with_term(
            Box::new(Constant {
                gradient: Vector3::new(5.0, 5.0, 5.0),
                sigma: Some(1.0),
            }),
            0.0,
        );
        assert_eq!(model.evaluate(&system, 0, 0), TermEvaluation::default());
    }

    #[test]
    fn step_descends_and_is_capped() {
        let system = single_particle();
        let small = EnergyModel::new().with_term(
            Box::new(Constant {
                gradient: Vector3::new(0.1, 0.0, 0.0),
                sigma: Some(1.0),
            }),
            1.0,
        );
        let step = small.step(&system, 0, 0);
        assert!((step - Vector3::new(-0.1, 0.0, 0.0)).norm() < 1e-12);

        let large = EnergyModel::new().with_term(
            Box::new(Constant {
                gradient: Vector3::new(0.0, 100.0, 0.0),
                sigma: Some(1.0),
            }),
            1.0,
        );
        let step = large.step(&system, 0, 0);
        assert!((step.norm() - MAX_MOVE_FACTOR).abs() < 1e-12);
        assert!(step.y < 0.0);
    }

    #[test]
    fn step_without_sigma_uses_domain_scale() {
        let system = single_particle();
        let model = EnergyModel::new().with_term(
            Box::new(Constant {
                gradient: Vector3::new(0.0, 0.0, 1e-6),
                sigma: None,
            }),
            1.0,
        );
        let sigma = fallback_sigma(&system, 0);
        let step = model.step(&system, 0, 0);
        assert!((step.z + 1e-6 * sigma * sigma).abs() < 1e-15);
    }
}
