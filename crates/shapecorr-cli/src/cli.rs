use clap::{Args, Parser, Subcommand, ValueEnum};
use shapecorr::engine::config::UpdateMode;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu",
    version,
    about = "shapecorr - dense point correspondence across populations of implicit surfaces, and PCA shape-model evaluation.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Optimize correspondence particles on the shapes declared in a config file.
    Optimize(OptimizeArgs),
    /// Compute compactness, generalization and specificity of a population of point files.
    Evaluate(EvaluateArgs),
}

/// Arguments for the `optimize` subcommand.
#[derive(Args, Debug)]
pub struct OptimizeArgs {
    /// Path to the configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Directory receiving one `<shape>_local.particles` and one
    /// `<shape>_world.particles` file per shape.
    #[arg(short, long, required = true, value_name = "DIR")]
    pub output: PathBuf,

    // --- Schedule Overrides ---
    /// Override the number of scales. Per-scale schedules given as a single
    /// value in the config file are broadcast to the new count.
    #[arg(short = 'n', long, value_name = "INT")]
    pub num_scales: Option<usize>,

    /// Override the particle update strategy.
    #[arg(short = 'm', long, value_enum, value_name = "MODE")]
    pub update_mode: Option<UpdateModeArg>,

    /// Override the seed used for particle splitting.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    // --- Registration Overrides ---
    /// Disable Procrustes registration, even if it is configured.
    #[arg(long, conflicts_with = "procrustes_scaling")]
    pub no_procrustes: bool,

    /// Let Procrustes registration fit a uniform scale as well as rotation and translation.
    #[arg(long)]
    pub procrustes_scaling: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S optimization.max-iterations=200,200,400
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `evaluate` subcommand.
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Correspondence point files, one per shape, all with the same point count.
    #[arg(required = true, num_args(1..), value_name = "FILES")]
    pub inputs: Vec<PathBuf>,

    /// Number of PCA modes used by the metrics.
    #[arg(short, long, value_name = "INT")]
    pub modes: Option<usize>,

    /// Number of random shapes drawn for specificity.
    #[arg(short = 'n', long, value_name = "INT")]
    pub samples: Option<usize>,

    /// Seed for specificity sampling.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Write the cumulative compactness curve as CSV.
    #[arg(long, value_name = "PATH")]
    pub scree: Option<PathBuf>,

    /// Write the full report as TOML.
    #[arg(short, long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Directory receiving each shape and its leave-one-out reconstruction.
    #[arg(long, value_name = "DIR")]
    pub reconstructions: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateModeArg {
    Simultaneous,
    Sequential,
    AdaptiveSequential,
}

impl From<UpdateModeArg> for UpdateMode {
    fn from(arg: UpdateModeArg) -> Self {
        match arg {
            UpdateModeArg::Simultaneous => UpdateMode::Simultaneous,
            UpdateModeArg::Sequential => UpdateMode::Sequential,
            UpdateModeArg::AdaptiveSequential => UpdateMode::AdaptiveSequential,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn optimize_arguments_parse() {
        let cli = Cli::parse_from([
            "shapecorr",
            "-vv",
            "optimize",
            "-c",
            "shapes.toml",
            "-o",
            "out",
            "--update-mode",
            "adaptive-sequential",
            "-S",
            "optimization.seed=9",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Optimize(args) => {
                assert_eq!(args.config, PathBuf::from("shapes.toml"));
                assert_eq!(args.update_mode, Some(UpdateModeArg::AdaptiveSequential));
                assert_eq!(args.set_values, vec!["optimization.seed=9".to_string()]);
                assert!(!args.no_procrustes);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn evaluate_takes_many_inputs() {
        let cli =
            Cli::parse_from(["shapecorr", "evaluate", "a.particles", "b.particles", "-m", "2"]);
        match cli.command {
            Commands::Evaluate(args) => {
                assert_eq!(args.inputs.len(), 2);
                assert_eq!(args.modes, Some(2));
                assert!(args.scree.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn procrustes_flags_conflict() {
        let result = Cli::try_parse_from([
            "shapecorr",
            "optimize",
            "-c",
            "a.toml",
            "-o",
            "out",
            "--no-procrustes",
            "--procrustes-scaling",
        ]);
        assert!(result.is_err());
    }
}
