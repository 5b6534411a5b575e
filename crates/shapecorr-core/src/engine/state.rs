use crate::core::models::system::ParticleSystem;
use serde::Serialize;

/// Read-only snapshot of the optimizer taken after a sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizerStatus {
    /// Sweeps completed over all scales.
    pub iteration: usize,
    /// Sweeps completed in the current scale.
    pub scale_iteration: usize,
    pub scale: usize,
    pub num_scales: usize,
    pub regularization: f64,
    /// Per-mode variances of the correspondence model, descending.
    pub pca_variances: Vec<f64>,
    pub max_displacement: f64,
    pub particles: usize,
    pub finished: bool,
}

/// What one finished scale left behind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleDiagnostics {
    pub scale: usize,
    pub particles: usize,
    pub iterations: usize,
    /// `true` when the scale stopped on the displacement tolerance rather than
    /// the iteration budget.
    pub converged: bool,
    pub pca_variances: Vec<f64>,
}

#[derive(Debug)]
pub struct OptimizationResult {
    pub system: ParticleSystem,
    pub scale_diagnostics: Vec<ScaleDiagnostics>,
}

/// Mutable bookkeeping of the scale state machine.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScheduleState {
    pub scale: usize,
    pub scale_started: bool,
    pub scale_iteration: usize,
    pub total_iterations: usize,
    pub procrustes_counter: usize,
    pub regularization: f64,
    pub max_displacement: f64,
    pub pca_variances: Vec<f64>,
    pub finished: bool,
}
