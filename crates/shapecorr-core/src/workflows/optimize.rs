use crate::core::io::points::ParticlesFile;
use crate::core::io::traits::PointSetFile;
use crate::core::models::system::ParticleSystem;
use crate::engine::config::OptimizationConfig;
use crate::engine::error::EngineError;
use crate::engine::optimizer::Optimizer;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::state::OptimizationResult;
use nalgebra::Point3;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Paths written by [`save_particles`] for one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticleOutput {
    pub local: PathBuf,
    pub world: PathBuf,
}

/// Optimizes correspondence particles on every domain of `system`.
///
/// # Arguments
///
/// * `system` - Domains to sample, optionally with initial particles.
/// * `config` - Validated optimization settings.
/// * `reporter` - Receives scale, iteration and registration events.
///
/// # Return
///
/// The optimized system with per-scale diagnostics.
///
/// # Errors
///
/// Returns [`EngineError`] if the system fails validation or any sweep fails.
#[instrument(skip_all, name = "optimize_workflow")]
pub fn run(
    system: ParticleSystem,
    config: OptimizationConfig,
    reporter: &ProgressReporter,
) -> Result<OptimizationResult, EngineError> {
    reporter.report(Progress::Message(format!(
        "Optimizing {} domain(s) over {} scale(s)",
        system.num_domains(),
        config.num_scales
    )));
    let mut optimizer = Optimizer::new(system, config, reporter)?;
    optimizer.run()?;
    let result = optimizer.into_result();
    info!(
        particles = result.system.num_particles(),
        scales = result.scale_diagnostics.len(),
        "Optimization workflow complete"
    );
    Ok(result)
}

/// Writes every domain's particles twice: in the domain's local frame and
/// mapped into the shared world frame.
///
/// Files are named `<name>_local.particles` and `<name>_world.particles`
/// inside `directory`, one pair per entry of `names`.
///
/// # Errors
///
/// Returns [`EngineError::PointFile`] for the first file that cannot be written.
///
/// # Panics
///
/// Panics if `names` has fewer entries than the system has domains.
pub fn save_particles(
    system: &ParticleSystem,
    names: &[String],
    directory: &Path,
) -> Result<Vec<ParticleOutput>, EngineError> {
    let mut outputs = Vec::with_capacity(system.num_domains());
    for d in 0..system.num_domains() {
        let output = ParticleOutput {
            local: directory.join(format!("{}_local.particles", names[d])),
            world: directory.join(format!("{}_world.particles", names[d])),
        };
        write(system.local_positions(d), &output.local)?;
        write(&system.global_positions(d), &output.world)?;
        outputs.push(output);
    }
    Ok(outputs)
}

fn write(points: &[Point3<f64>], path: &Path) -> Result<(), EngineError> {
    ParticlesFile::write_to_path(points, path).map_err(|source| EngineError::PointFile {
        path: path.to_path_buf(),
        source,
    })
}
