use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_REGULARIZATION_INITIAL: f64 = 1000.0;
pub const DEFAULT_REGULARIZATION_FINAL: f64 = 10.0;
pub const DEFAULT_DECAY_SPAN: usize = 1000;
pub const DEFAULT_PROCRUSTES_INTERVAL: usize = 3;
pub const DEFAULT_TOLERANCE: f64 = 0.01;
pub const DEFAULT_SHAPE_ENTROPY_WEIGHTING: f64 = 1.0;
pub const DEFAULT_PROCRUSTES_MIN_PARTICLES: usize = 64;
/// Fewest particles a Procrustes fit can work with.
pub const PROCRUSTES_FLOOR: usize = 3;
pub const DEFAULT_SPLIT_EPSILON: f64 = 0.05;
pub const DEFAULT_REPORT_INTERVAL: usize = 10;
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Schedule '{name}' has {found} entries, expected one per scale ({expected})")]
    ScheduleLength {
        name: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Invalid value for '{name}': {reason}")]
    InvalidValue { name: &'static str, reason: String },
    #[error("Expected one cutting plane per domain ({expected}), found {found}")]
    CuttingPlaneCount { expected: usize, found: usize },
    #[error("The particle system has no domains")]
    NoDomains,
    #[error("Domains hold different particle counts")]
    UnbalancedSystem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateMode {
    /// Every particle is moved from one snapshot taken at the start of the sweep.
    Simultaneous,
    /// Particles are moved one at a time in domain-major order.
    #[default]
    Sequential,
    /// Sequential order with per-particle step multipliers.
    AdaptiveSequential,
}

/// Three points defining a plane.
pub type PlanePoints = [Point3<f64>; 3];

#[derive(Debug, Clone, PartialEq, Default)]
pub enum CuttingPlanes {
    #[default]
    None,
    /// The same plane for every domain.
    One(PlanePoints),
    /// One plane per domain, in domain order.
    PerDomain(Vec<PlanePoints>),
}

impl CuttingPlanes {
    /// The plane for `domain`, if any.
    pub fn for_domain(&self, domain: usize) -> Option<&PlanePoints> {
        match self {
            CuttingPlanes::None => None,
            CuttingPlanes::One(plane) => Some(plane),
            CuttingPlanes::PerDomain(planes) => planes.get(domain),
        }
    }

    pub fn check_domain_count(&self, num_domains: usize) -> Result<(), ConfigError> {
        match self {
            CuttingPlanes::PerDomain(planes) if planes.len() != num_domains => {
                Err(ConfigError::CuttingPlaneCount {
                    expected: num_domains,
                    found: planes.len(),
                })
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationConfig {
    pub num_scales: usize,
    pub regularization_initial: Vec<f64>,
    pub regularization_final: Vec<f64>,
    pub decay_span: Vec<usize>,
    pub max_iterations: Vec<usize>,
    pub procrustes_interval: Vec<usize>,
    pub tolerance: Vec<f64>,
    pub shape_entropy_weighting: f64,
    pub cutting_planes: CuttingPlanes,
    pub update_mode: UpdateMode,
    pub procrustes_scaling: bool,
    pub procrustes_min_particles: usize,
    pub split_epsilon: f64,
    pub curvature_adaptivity: f64,
    pub report_interval: usize,
    pub seed: u64,
}

impl OptimizationConfig {
    /// Annealed regularization after `iteration` sweeps of `scale`.
    pub fn regularization_at(&self, scale: usize, iteration: usize) -> f64 {
        let initial = self.regularization_initial[scale];
        let last = self.regularization_final[scale];
        let span = self.decay_span[scale];
        if span == 0 || iteration >= span {
            return last;
        }
        let t = iteration as f64 / span as f64;
        initial * (last / initial).powf(t)
    }
}

#[derive(Default)]
pub struct OptimizationConfigBuilder {
    num_scales: Option<usize>,
    regularization_initial: Option<Vec<f64>>,
    regularization_final: Option<Vec<f64>>,
    decay_span: Option<Vec<usize>>,
    max_iterations: Option<Vec<usize>>,
    procrustes_interval: Option<Vec<usize>>,
    tolerance: Option<Vec<f64>>,
    shape_entropy_weighting: Option<f64>,
    cutting_planes: Option<CuttingPlanes>,
    update_mode: Option<UpdateMode>,
    procrustes_scaling: Option<bool>,
    procrustes_min_particles: Option<usize>,
    split_epsilon: Option<f64>,
    curvature_adaptivity: Option<f64>,
    report_interval: Option<usize>,
    seed: Option<u64>,
}

impl OptimizationConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_scales(mut self, n: usize) -> Self {
        self.num_scales = Some(n);
        self
    }
    pub fn regularization_initial(mut self, values: Vec<f64>) -> Self {
        self.regularization_initial = Some(values);
        self
    }
    pub fn regularization_final(mut self, values: Vec<f64>) -> Self {
        self.regularization_final = Some(values);
        self
    }
    pub fn decay_span(mut self, values: Vec<usize>) -> Self {
        self.decay_span = Some(values);
        self
    }
    pub fn max_iterations(mut self, values: Vec<usize>) -> Self {
        self.max_iterations = Some(values);
        self
    }
    pub fn procrustes_interval(mut self, values: Vec<usize>) -> Self {
        self.procrustes_interval = Some(values);
        self
    }
    pub fn tolerance(mut self, values: Vec<f64>) -> Self {
        self.tolerance = Some(values);
        self
    }
    pub fn shape_entropy_weighting(mut self, weight: f64) -> Self {
        self.shape_entropy_weighting = Some(weight);
        self
    }
    pub fn cutting_planes(mut self, planes: CuttingPlanes) -> Self {
        self.cutting_planes = Some(planes);
        self
    }
    pub fn update_mode(mut self, mode: UpdateMode) -> Self {
        self.update_mode = Some(mode);
        self
    }
    pub fn procrustes_scaling(mut self, enabled: bool) -> Self {
        self.procrustes_scaling = Some(enabled);
        self
    }
    pub fn procrustes_min_particles(mut self, count: usize) -> Self {
        self.procrustes_min_particles = Some(count);
        self
    }
    pub fn split_epsilon(mut self, epsilon: f64) -> Self {
        self.split_epsilon = Some(epsilon);
        self
    }
    pub fn curvature_adaptivity(mut self, rho: f64) -> Self {
        self.curvature_adaptivity = Some(rho);
        self
    }
    pub fn report_interval(mut self, interval: usize) -> Self {
        self.report_interval = Some(interval);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<OptimizationConfig, ConfigError> {
        let num_scales = self
            .num_scales
            .ok_or(ConfigError::MissingParameter("num_scales"))?;
        if num_scales == 0 {
            return Err(invalid("num_scales", "at least one scale is required"));
        }

        let max_iterations = schedule(
            "max_iterations",
            num_scales,
            Some(
                self.max_iterations
                    .ok_or(ConfigError::MissingParameter("max_iterations"))?,
            ),
            0,
        )?;
        let regularization_initial = schedule(
            "regularization_initial",
            num_scales,
            self.regularization_initial,
            DEFAULT_REGULARIZATION_INITIAL,
        )?;
        let regularization_final = schedule(
            "regularization_final",
            num_scales,
            self.regularization_final,
            DEFAULT_REGULARIZATION_FINAL,
        )?;
        let decay_span = schedule("decay_span", num_scales, self.decay_span, DEFAULT_DECAY_SPAN)?;
        let procrustes_interval = schedule(
            "procrustes_interval",
            num_scales,
            self.procrustes_interval,
            DEFAULT_PROCRUSTES_INTERVAL,
        )?;
        let tolerance = schedule("tolerance", num_scales, self.tolerance, DEFAULT_TOLERANCE)?;

        for (name, values) in [
            ("regularization_initial", &regularization_initial),
            ("regularization_final", &regularization_final),
        ] {
            if values.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
                return Err(invalid(name, "values must be positive and finite"));
            }
        }
        if tolerance.iter().any(|v| !(v.is_finite() && *v >= 0.0)) {
            return Err(invalid("tolerance", "values must be non-negative and finite"));
        }

        let shape_entropy_weighting = self
            .shape_entropy_weighting
            .unwrap_or(DEFAULT_SHAPE_ENTROPY_WEIGHTING);
        if !(shape_entropy_weighting.is_finite() && shape_entropy_weighting >= 0.0) {
            return Err(invalid("shape_entropy_weighting", "must be non-negative and finite"));
        }

        let split_epsilon = self.split_epsilon.unwrap_or(DEFAULT_SPLIT_EPSILON);
        if !(split_epsilon.is_finite() && split_epsilon > 0.0) {
            return Err(invalid("split_epsilon", "must be positive and finite"));
        }

        let curvature_adaptivity = self.curvature_adaptivity.unwrap_or(0.0);
        if !(curvature_adaptivity.is_finite() && curvature_adaptivity >= 0.0) {
            return Err(invalid("curvature_adaptivity", "must be non-negative and finite"));
        }

        let procrustes_min_particles = self
            .procrustes_min_particles
            .unwrap_or(DEFAULT_PROCRUSTES_MIN_PARTICLES);
        if procrustes_min_particles < PROCRUSTES_FLOOR {
            return Err(invalid(
                "procrustes_min_particles",
                "Procrustes registration needs at least 3 particles",
            ));
        }

        let report_interval = self.report_interval.unwrap_or(DEFAULT_REPORT_INTERVAL);
        if report_interval == 0 {
            return Err(invalid("report_interval", "must be at least 1"));
        }

        Ok(OptimizationConfig {
            num_scales,
            regularization_initial,
            regularization_final,
            decay_span,
            max_iterations,
            procrustes_interval,
            tolerance,
            shape_entropy_weighting,
            cutting_planes: self.cutting_planes.unwrap_or_default(),
            update_mode: self.update_mode.unwrap_or_default(),
            procrustes_scaling: self.procrustes_scaling.unwrap_or(false),
            procrustes_min_particles,
            split_epsilon,
            curvature_adaptivity,
            report_interval,
            seed: self.seed.unwrap_or(DEFAULT_SEED),
        })
    }
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        reason: reason.to_string(),
    }
}

fn schedule<T: Clone>(
    name: &'static str,
    num_scales: usize,
    values: Option<Vec<T>>,
    default: T,
) -> Result<Vec<T>, ConfigError> {
    match values {
        None => Ok(vec![default; num_scales]),
        Some(values) if values.len() == num_scales => Ok(values),
        Some(values) => Err(ConfigError::ScheduleLength {
            name,
            expected: num_scales,
            found: values.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> OptimizationConfigBuilder {
        OptimizationConfigBuilder::new()
            .num_scales(3)
            .max_iterations(vec![10, 20, 30])
    }

    #[test]
    fn build_fills_defaults_per_scale() {
        let config = minimal().build().unwrap();
        assert_eq!(config.regularization_initial, vec![DEFAULT_REGULARIZATION_INITIAL; 3]);
        assert_eq!(config.tolerance, vec![DEFAULT_TOLERANCE; 3]);
        assert_eq!(config.procrustes_interval, vec![DEFAULT_PROCRUSTES_INTERVAL; 3]);
        assert_eq!(config.update_mode, UpdateMode::Sequential);
        assert_eq!(config.cutting_planes, CuttingPlanes::None);
        assert!(!config.procrustes_scaling);
    }

    #[test]
    fn build_requires_scales_and_iterations() {
        let err = OptimizationConfigBuilder::new().build().unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("num_scales"));
        let err = OptimizationConfigBuilder::new().num_scales(2).build().unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("max_iterations"));
    }

    #[test]
    fn build_rejects_mismatched_schedules() {
        let err = minimal().decay_span(vec![5, 5]).build().unwrap_err();
        assert_eq!(
            err,
            ConfigError::ScheduleLength {
                name: "decay_span",
                expected: 3,
                found: 2
            }
        );
        let err = OptimizationConfigBuilder::new()
            .num_scales(2)
            .max_iterations(vec![1])
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ScheduleLength { name: "max_iterations", .. }));
    }

    #[test]
    fn build_rejects_invalid_values() {
        assert!(matches!(
            minimal().regularization_final(vec![1.0, 0.0, 1.0]).build(),
            Err(ConfigError::InvalidValue { name: "regularization_final", .. })
        ));
        assert!(matches!(
            minimal().report_interval(0).build(),
            Err(ConfigError::InvalidValue { name: "report_interval", .. })
        ));
        assert!(matches!(
            OptimizationConfigBuilder::new().num_scales(0).max_iterations(vec![]).build(),
            Err(ConfigError::InvalidValue { name: "num_scales", .. })
        ));
    }

    #[test]
    fn regularization_anneals_between_endpoints() {
        let config = minimal()
            .regularization_initial(vec![100.0; 3])
            .regularization_final(vec![1.0; 3])
            .decay_span(vec![10, 10, 0])
            .build()
            .unwrap();
        assert!((config.regularization_at(0, 0) - 100.0).abs() < 1e-9);
        assert!((config.regularization_at(0, 5) - 10.0).abs() < 1e-9);
        assert_eq!(config.regularization_at(0, 10), 1.0);
        assert_eq!(config.regularization_at(0, 500), 1.0);
        assert_eq!(config.regularization_at(2, 0), 1.0);
    }

    #[test]
    fn per_domain_planes_must_match_domain_count() {
        let plane = [Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)];
        let planes = CuttingPlanes::PerDomain(vec![plane; 2]);
        assert!(planes.check_domain_count(2).is_ok());
        assert_eq!(
            planes.check_domain_count(3),
            Err(ConfigError::CuttingPlaneCount {
                expected: 3,
                found: 2
            })
        );
        assert_eq!(CuttingPlanes::One(plane).for_domain(7), Some(&plane));
        assert!(CuttingPlanes::None.for_domain(0).is_none());
    }

    #[test]
    fn procrustes_threshold_below_three_particles_is_rejected() {
        for count in [0, 1, 2] {
            assert!(matches!(
                minimal().procrustes_min_particles(count).build(),
                Err(ConfigError::InvalidValue { name: "procrustes_min_particles", .. })
            ));
        }
        let config = minimal().procrustes_min_particles(3).build().unwrap();
        assert_eq!(config.procrustes_min_particles, 3);
    }
}
