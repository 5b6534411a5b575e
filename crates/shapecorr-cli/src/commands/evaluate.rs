use crate::cli::EvaluateArgs;
use crate::config::defaults::DefaultsConfig;
use crate::error::{CliError, Result};
use shapecorr::{
    core::{io::scree, statistics::evaluation::EvaluationReport},
    engine::progress::{Progress, ProgressReporter},
    workflows::{self, evaluate::EvaluationSettings},
};
use std::path::Path;
use tracing::info;

pub fn run(args: EvaluateArgs) -> Result<()> {
    let settings = settings_from_args(&args)?;
    let reporter = ProgressReporter::with_callback(Box::new(|progress: Progress| {
        if let Progress::Message(msg) = progress {
            info!("{}", msg);
        }
    }));

    if let Some(dir) = &settings.reconstruction_dir {
        std::fs::create_dir_all(dir)?;
    }

    println!("Evaluating {} shape(s)...", args.inputs.len());
    let report = workflows::evaluate::run(&args.inputs, &settings, &reporter)?;
    print_report(&report);

    if let Some(path) = &args.scree {
        scree::write_scree(path, &report.compactness_curve).map_err(|e| CliError::Output {
            path: path.clone(),
            source: e.into(),
        })?;
        println!("✓ Compactness curve written to: {}", path.display());
    }
    if let Some(path) = &args.report {
        write_report(&report, path)?;
        println!("✓ Report written to: {}", path.display());
    }
    if let Some(dir) = &settings.reconstruction_dir {
        println!("✓ Reconstructions written to: {}", dir.display());
    }
    Ok(())
}

fn settings_from_args(args: &EvaluateArgs) -> Result<EvaluationSettings> {
    let defaults = DefaultsConfig::default();
    let settings = EvaluationSettings {
        modes: args.modes.unwrap_or(defaults.evaluation_modes),
        specificity_samples: args.samples.unwrap_or(defaults.specificity_samples),
        seed: args.seed.unwrap_or(defaults.evaluation_seed),
        reconstruction_dir: args.reconstructions.clone(),
    };
    if settings.modes == 0 {
        return Err(CliError::Argument("--modes must be at least 1".to_string()));
    }
    if settings.specificity_samples == 0 {
        return Err(CliError::Argument("--samples must be at least 1".to_string()));
    }
    Ok(settings)
}

fn print_report(report: &EvaluationReport) {
    println!(
        "  {} shapes, {} points, {} mode(s)",
        report.num_shapes, report.num_points, report.modes
    );
    println!("  Compactness:    {:.6}", report.compactness);
    println!("  Generalization: {:.6}", report.generalization);
    println!("  Specificity:    {:.6}", report.specificity);
}

/// Serializes `report` as TOML.
pub fn write_report(report: &EvaluationReport, path: &Path) -> Result<()> {
    let text = toml::to_string_pretty(report).map_err(|e| CliError::Output {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    std::fs::write(path, text).map_err(|e| CliError::Output {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use nalgebra::Point3;
    use shapecorr::core::io::points::ParticlesFile;
    use shapecorr::core::io::traits::PointSetFile;
    use std::path::PathBuf;

    fn write_population(dir: &Path) -> Vec<PathBuf> {
        (0..4)
            .map(|i| {
                let s = 1.0 + 0.2 * i as f64;
                let points = vec![
                    Point3::new(s, 0.0, 0.0),
                    Point3::new(0.0, 1.0 + 0.1 * (i % 2) as f64, 0.0),
                    Point3::new(0.0, 0.0, 2.0),
                ];
                let path = dir.join(format!("shape_{i}.particles"));
                ParticlesFile::write_to_path(&points, &path).unwrap();
                path
            })
            .collect()
    }

    fn evaluate_args(inputs: &[PathBuf], extra: &[&str]) -> EvaluateArgs {
        let mut argv = vec!["shapecorr".to_string(), "evaluate".to_string()];
        argv.extend(inputs.iter().map(|p| p.to_str().unwrap().to_string()));
        argv.extend(extra.iter().map(|s| s.to_string()));
        match Cli::parse_from(argv).command {
            Commands::Evaluate(args) => args,
            other => panic!("Expected 'evaluate' subcommand, got {other:?}"),
        }
    }

    #[test]
    fn evaluate_writes_scree_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = write_population(dir.path());
        let scree_path = dir.path().join("scree.csv");
        let report_path = dir.path().join("report.toml");
        let args = evaluate_args(
            &inputs,
            &[
                "--samples",
                "20",
                "--scree",
                scree_path.to_str().unwrap(),
                "--report",
                report_path.to_str().unwrap(),
            ],
        );
        run(args).unwrap();

        let records = scree::read_scree(&scree_path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].mode, 1);

        let text = std::fs::read_to_string(&report_path).unwrap();
        let parsed: toml::Table = toml::from_str(&text).unwrap();
        assert_eq!(parsed["num_shapes"].as_integer(), Some(4));
        assert!(parsed["compactness"].as_float().is_some());
        assert_eq!(parsed["compactness_curve"].as_array().map(|a| a.len()), Some(3));
    }

    #[test]
    fn evaluate_exports_reconstructions() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = write_population(dir.path());
        let out = dir.path().join("nested").join("reconstructions");
        let args = evaluate_args(
            &inputs,
            &["--samples", "10", "--reconstructions", out.to_str().unwrap()],
        );
        run(args).unwrap();

        for i in 0..inputs.len() {
            for kind in ["original", "reconstruction"] {
                let path = out.join(format!("{i}_{kind}.particles"));
                assert_eq!(ParticlesFile::read_from_path(&path).unwrap().len(), 3);
            }
        }
    }

    #[test]
    fn zero_modes_is_an_argument_error() {
        let args = evaluate_args(&[PathBuf::from("a.particles")], &["--modes", "0"]);
        assert!(matches!(run(args), Err(CliError::Argument(_))));
    }

    #[test]
    fn missing_file_is_reported_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut inputs = write_population(dir.path());
        inputs.push(dir.path().join("missing.particles"));
        let err = run(evaluate_args(&inputs, &[])).unwrap_err();
        assert!(err.to_string().contains("missing.particles"));
    }
}
