use crate::cli::OptimizeArgs;
use crate::config::PartialRunConfig;
use crate::config::models::AppConfig;
use crate::error::Result;
use crate::shapes;
use crate::utils::progress::CliProgressHandler;
use shapecorr::{
    core::models::system::ParticleSystem,
    engine::{progress::ProgressReporter, state::OptimizationResult},
    workflows,
};
use std::path::Path;
use tracing::info;

pub fn run(args: OptimizeArgs) -> Result<()> {
    let partial_config = PartialRunConfig::from_file(&args.config)?;
    info!("Merging configuration from file and CLI arguments...");
    let app_config = partial_config.merge_with_cli(&args)?;

    let handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(handler.get_callback());

    println!(
        "Optimizing correspondence on {} shape(s) over {} scale(s)...",
        app_config.shapes.len(),
        app_config.optimization.num_scales
    );
    let result = optimize(app_config, &args.output, &reporter)?;

    for diagnostics in &result.scale_diagnostics {
        let outcome = if diagnostics.converged {
            "converged"
        } else {
            "iteration budget spent"
        };
        println!(
            "  Scale {}: {} particles, {} iterations, {}",
            diagnostics.scale + 1,
            diagnostics.particles,
            diagnostics.iterations,
            outcome
        );
    }
    println!(
        "✓ Wrote {} particle file pair(s) to {}",
        result.system.num_domains(),
        args.output.display()
    );
    Ok(())
}

/// Builds a domain per shape, optimizes, and writes every domain's particles
/// into `output`.
pub fn optimize(
    app_config: AppConfig,
    output: &Path,
    reporter: &ProgressReporter,
) -> Result<OptimizationResult> {
    let mut system = ParticleSystem::new();
    for spec in &app_config.shapes {
        info!(shape = %spec.name, "Sampling shape onto grid");
        let domain = shapes::build_domain(spec, &app_config.grid)?;
        system.add_domain(domain.into());
    }

    std::fs::create_dir_all(output)?;
    let result = workflows::optimize::run(system, app_config.optimization, reporter)?;

    let names: Vec<String> = app_config.shapes.iter().map(|s| s.name.clone()).collect();
    let outputs = workflows::optimize::save_particles(&result.system, &names, output)?;
    info!(files = outputs.len() * 2, "Particle files written");
    Ok(result)
}
