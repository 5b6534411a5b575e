pub mod defaults;
pub mod models;

use crate::cli::{OptimizeArgs, UpdateModeArg};
use crate::error::{CliError, Result};
use crate::shapes::{GridSettings, ShapeSpec};
use crate::utils::parser::{self, ParseError};
use clap::ValueEnum;
use defaults::DefaultsConfig;
use models::AppConfig;
use nalgebra::Point3;
use serde::Deserialize;
use shapecorr::engine::config::{
    CuttingPlanes, OptimizationConfigBuilder, PlanePoints, UpdateMode,
};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// A per-scale value: either one entry used for every scale or one per scale.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
enum Schedule<T> {
    Uniform(T),
    PerScale(Vec<T>),
}

impl<T: Clone> Schedule<T> {
    fn from_list(mut values: Vec<T>) -> Self {
        if values.len() == 1 {
            Schedule::Uniform(values.remove(0))
        } else {
            Schedule::PerScale(values)
        }
    }

    fn expand(self, num_scales: usize) -> Vec<T> {
        match self {
            Schedule::Uniform(value) => vec![value; num_scales],
            Schedule::PerScale(values) => values,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialOptimizationConfig {
    num_scales: Option<usize>,
    max_iterations: Option<Schedule<usize>>,
    regularization_initial: Option<Schedule<f64>>,
    regularization_final: Option<Schedule<f64>>,
    decay_span: Option<Schedule<usize>>,
    procrustes_interval: Option<Schedule<usize>>,
    tolerance: Option<Schedule<f64>>,
    shape_entropy_weighting: Option<f64>,
    update_mode: Option<UpdateMode>,
    procrustes_scaling: Option<bool>,
    procrustes_min_particles: Option<usize>,
    split_epsilon: Option<f64>,
    curvature_adaptivity: Option<f64>,
    report_interval: Option<usize>,
    seed: Option<u64>,
    cutting_plane: Option<[[f64; 3]; 3]>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialGridConfig {
    resolution: Option<usize>,
    padding: Option<f64>,
    surface_tolerance: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialRunConfig {
    optimization: Option<PartialOptimizationConfig>,
    grid: Option<PartialGridConfig>,
    #[serde(default)]
    shapes: Vec<ShapeSpec>,
}

fn plane_points(raw: &[[f64; 3]; 3]) -> PlanePoints {
    (*raw).map(Point3::from)
}

impl PartialRunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn merge_with_cli(mut self, args: &OptimizeArgs) -> Result<AppConfig> {
        self.apply_set_values(&args.set_values)?;
        let defaults = DefaultsConfig::default();

        let shapes = std::mem::take(&mut self.shapes);
        Self::check_shapes(&shapes)?;
        let opt = self.optimization.take().unwrap_or_default();
        let grid_config = self.grid.take().unwrap_or_default();

        let num_scales = args
            .num_scales
            .or(opt.num_scales)
            .unwrap_or(defaults.num_scales);
        let max_iterations = opt
            .max_iterations
            .unwrap_or(Schedule::Uniform(defaults.max_iterations));

        let mut builder = OptimizationConfigBuilder::new()
            .num_scales(num_scales)
            .max_iterations(max_iterations.expand(num_scales));

        if let Some(values) = opt.regularization_initial {
            builder = builder.regularization_initial(values.expand(num_scales));
        }
        if let Some(values) = opt.regularization_final {
            builder = builder.regularization_final(values.expand(num_scales));
        }
        if let Some(values) = opt.decay_span {
            builder = builder.decay_span(values.expand(num_scales));
        }
        if let Some(values) = opt.tolerance {
            builder = builder.tolerance(values.expand(num_scales));
        }
        if args.no_procrustes {
            builder = builder.procrustes_interval(vec![0; num_scales]);
        } else if let Some(values) = opt.procrustes_interval {
            builder = builder.procrustes_interval(values.expand(num_scales));
        }
        if args.procrustes_scaling {
            builder = builder.procrustes_scaling(true);
        } else if let Some(enabled) = opt.procrustes_scaling {
            builder = builder.procrustes_scaling(enabled);
        }
        if let Some(mode) = args.update_mode.map(UpdateMode::from).or(opt.update_mode) {
            builder = builder.update_mode(mode);
        }
        if let Some(seed) = args.seed.or(opt.seed) {
            builder = builder.seed(seed);
        }
        if let Some(weight) = opt.shape_entropy_weighting {
            builder = builder.shape_entropy_weighting(weight);
        }
        if let Some(count) = opt.procrustes_min_particles {
            builder = builder.procrustes_min_particles(count);
        }
        if let Some(epsilon) = opt.split_epsilon {
            builder = builder.split_epsilon(epsilon);
        }
        if let Some(rho) = opt.curvature_adaptivity {
            builder = builder.curvature_adaptivity(rho);
        }
        if let Some(interval) = opt.report_interval {
            builder = builder.report_interval(interval);
        }
        builder = builder.cutting_planes(Self::merge_cutting_planes(
            opt.cutting_plane.as_ref(),
            &shapes,
        )?);

        let optimization = builder.build().map_err(|e| CliError::Config(e.to_string()))?;
        let grid = GridSettings {
            resolution: grid_config.resolution.unwrap_or(defaults.grid_resolution),
            padding: grid_config.padding.unwrap_or(defaults.grid_padding),
            surface_tolerance: grid_config
                .surface_tolerance
                .unwrap_or(defaults.surface_tolerance),
        };

        Ok(AppConfig {
            shapes,
            grid,
            optimization,
        })
    }

    fn check_shapes(shapes: &[ShapeSpec]) -> Result<()> {
        if shapes.is_empty() {
            return Err(CliError::Config(
                "At least one `[[shapes]]` entry is required.".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for spec in shapes {
            if spec.name.is_empty() || spec.name.contains(['/', '\\']) {
                return Err(CliError::Config(format!(
                    "Shape name '{}' cannot be used as a file name.",
                    spec.name
                )));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(CliError::Config(format!(
                    "Shape name '{}' is used more than once.",
                    spec.name
                )));
            }
        }
        Ok(())
    }

    fn merge_cutting_planes(
        shared: Option<&[[f64; 3]; 3]>,
        shapes: &[ShapeSpec],
    ) -> Result<CuttingPlanes> {
        let per_shape = shapes.iter().filter(|s| s.cutting_plane.is_some()).count();
        match (shared, per_shape) {
            (None, 0) => Ok(CuttingPlanes::None),
            (Some(plane), 0) => Ok(CuttingPlanes::One(plane_points(plane))),
            (None, n) if n == shapes.len() => Ok(CuttingPlanes::PerDomain(
                shapes
                    .iter()
                    .filter_map(|s| s.cutting_plane.as_ref())
                    .map(plane_points)
                    .collect(),
            )),
            (None, _) => Err(CliError::Config(
                "Either every shape or none of them must set `cutting-plane`.".to_string(),
            )),
            (Some(_), _) => Err(CliError::Config(
                "`optimization.cutting-plane` cannot be combined with per-shape planes."
                    .to_string(),
            )),
        }
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let (key, value) = parser::split_assignment(kv_pair).map_err(config_error)?;

            match key {
                "grid.resolution" => {
                    self.grid.get_or_insert_with(Default::default).resolution =
                        Some(parser::parse_value(key, "integer", value).map_err(config_error)?);
                }
                "grid.padding" => {
                    self.grid.get_or_insert_with(Default::default).padding =
                        Some(parser::parse_value(key, "float", value).map_err(config_error)?);
                }
                "grid.surface-tolerance" => {
                    self.grid.get_or_insert_with(Default::default).surface_tolerance =
                        Some(parser::parse_value(key, "float", value).map_err(config_error)?);
                }
                _ => {
                    let Some(field) = key.strip_prefix("optimization.") else {
                        return Err(unsupported(key));
                    };
                    let target = self.optimization.get_or_insert_with(Default::default);
                    Self::set_optimization_value(target, key, field, value)?;
                }
            }
        }
        Ok(())
    }

    fn set_optimization_value(
        target: &mut PartialOptimizationConfig,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<()> {
        let integer = |v: &str| parser::parse_value(key, "integer", v).map_err(config_error);
        let float = |v: &str| parser::parse_value::<f64>(key, "float", v).map_err(config_error);
        let int_list = |v: &str| {
            parser::parse_list(key, "integer", v)
                .map(Schedule::from_list)
                .map_err(config_error)
        };
        let float_list = |v: &str| {
            parser::parse_list(key, "float", v)
                .map(Schedule::from_list)
                .map_err(config_error)
        };

        match field {
            "num-scales" => target.num_scales = Some(integer(value)?),
            "max-iterations" => target.max_iterations = Some(int_list(value)?),
            "regularization-initial" => target.regularization_initial = Some(float_list(value)?),
            "regularization-final" => target.regularization_final = Some(float_list(value)?),
            "decay-span" => target.decay_span = Some(int_list(value)?),
            "procrustes-interval" => target.procrustes_interval = Some(int_list(value)?),
            "tolerance" => target.tolerance = Some(float_list(value)?),
            "shape-entropy-weighting" => target.shape_entropy_weighting = Some(float(value)?),
            "procrustes-min-particles" => target.procrustes_min_particles = Some(integer(value)?),
            "split-epsilon" => target.split_epsilon = Some(float(value)?),
            "curvature-adaptivity" => target.curvature_adaptivity = Some(float(value)?),
            "report-interval" => target.report_interval = Some(integer(value)?),
            "seed" => {
                let seed = parser::parse_value(key, "integer", value).map_err(config_error)?;
                target.seed = Some(seed)
            }
            "procrustes-scaling" => {
                target.procrustes_scaling =
                    Some(parser::parse_value(key, "boolean", value).map_err(config_error)?)
            }
            "update-mode" => {
                let mode = UpdateModeArg::from_str(value, true).map_err(|_| {
                    config_error(ParseError::InvalidValue {
                        key: key.to_string(),
                        kind: "update mode",
                        value: value.to_string(),
                    })
                })?;
                target.update_mode = Some(mode.into());
            }
            _ => return Err(unsupported(key)),
        }
        Ok(())
    }
}

fn config_error(e: ParseError) -> CliError {
    CliError::Config(e.to_string())
}

fn unsupported(key: &str) -> CliError {
    CliError::Config(format!("Unsupported configuration key for --set: '{}'", key))
}
