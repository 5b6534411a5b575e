use crate::core::domain::{Domain, RegionDomain};
use crate::core::io::points::ParticlesFile;
use crate::core::io::traits::PointSetFile;
use crate::core::models::system::ParticleSystem;
use crate::core::statistics::evaluation::{EvaluationReport, leave_one_out};
use crate::core::statistics::model::{ShapeModel, shape_points};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use nalgebra::Point3;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Padding of the region built around each loaded point set, relative to its diagonal.
const REGION_PADDING_FRACTION: f64 = 0.05;
const MIN_REGION_PADDING: f64 = 1e-6;

/// Settings for [`run`].
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationSettings {
    pub modes: usize,
    pub specificity_samples: usize,
    pub seed: u64,
    /// Existing directory receiving every held-out shape and its reconstruction.
    pub reconstruction_dir: Option<PathBuf>,
}

/// Files written for one held-out shape by [`save_reconstructions`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructionOutput {
    pub original: PathBuf,
    pub reconstruction: PathBuf,
}

/// Reads one point file per shape into a particle system.
///
/// Every file is parsed before anything is assembled, so a malformed or
/// mismatched file leaves no partial system behind. Each shape gets a region
/// domain enclosing its points and an identity transform.
///
/// # Errors
///
/// Returns [`EngineError::PointFile`] for the first unreadable file and
/// [`EngineError::System`] if the files hold different point counts.
#[instrument(skip_all, name = "load_particle_system", fields(files = paths.len()))]
pub fn load_particle_system<P: AsRef<Path>>(paths: &[P]) -> Result<ParticleSystem, EngineError> {
    let shapes: Vec<Vec<Point3<f64>>> = paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            ParticlesFile::read_from_path(path).map_err(|source| EngineError::PointFile {
                path: path.to_path_buf(),
                source,
            })
        })
        .collect::<Result<_, _>>()?;

    let mut system = ParticleSystem::new();
    for points in &shapes {
        let tight: Domain = RegionDomain::enclosing(points, MIN_REGION_PADDING)?.into();
        let diagonal = (tight.upper_bound() - tight.lower_bound()).norm();
        let padding = (diagonal * REGION_PADDING_FRACTION).max(MIN_REGION_PADDING);
        let domain = RegionDomain::enclosing(points, padding)?;
        system.add_domain_with_particles(domain.into(), points)?;
    }
    info!(
        shapes = system.num_domains(),
        points = system.num_particles(),
        "Loaded correspondence files"
    );
    Ok(system)
}

/// Computes compactness, generalization and specificity for a population
/// stored as point files.
///
/// # Errors
///
/// Propagates loading failures and [`EngineError::Evaluation`] when the
/// population is too small or degenerate for the requested mode count.
#[instrument(skip_all, name = "evaluate_workflow", fields(modes = settings.modes))]
pub fn run<P: AsRef<Path>>(
    paths: &[P],
    settings: &EvaluationSettings,
    reporter: &ProgressReporter,
) -> Result<EvaluationReport, EngineError> {
    let system = load_particle_system(paths)?;
    reporter.report(Progress::Message(format!(
        "Loaded {} shapes with {} points each",
        system.num_domains(),
        system.num_particles()
    )));
    evaluate_system(&system, settings)
}

/// Computes every metric over the global positions of `system`.
pub fn evaluate_system(
    system: &ParticleSystem,
    settings: &EvaluationSettings,
) -> Result<EvaluationReport, EngineError> {
    let model = ShapeModel::from_system(system)?;
    let report = EvaluationReport::compute(
        &model,
        settings.modes,
        settings.specificity_samples,
        settings.seed,
    )?;
    info!(
        compactness = report.compactness,
        generalization = report.generalization,
        specificity = report.specificity,
        "Evaluation complete"
    );
    if let Some(dir) = &settings.reconstruction_dir {
        let outputs = save_reconstructions(&model, settings.modes, dir)?;
        info!(shapes = outputs.len(), dir = %dir.display(), "Reconstructions written");
    }
    Ok(report)
}

/// Writes each shape and its leave-one-out reconstruction from `n_modes`
/// modes into `directory` as `<index>_original.particles` and
/// `<index>_reconstruction.particles`.
pub fn save_reconstructions(
    model: &ShapeModel,
    n_modes: usize,
    directory: &Path,
) -> Result<Vec<ReconstructionOutput>, EngineError> {
    let held_out = leave_one_out(model, n_modes)?;
    let mut outputs = Vec::with_capacity(held_out.len());
    for shape in &held_out {
        let output = ReconstructionOutput {
            original: directory.join(format!("{}_original.particles", shape.index)),
            reconstruction: directory.join(format!("{}_reconstruction.particles", shape.index)),
        };
        write(&shape_points(&shape.original), &output.original)?;
        write(&shape_points(&shape.reconstruction), &output.reconstruction)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::points::PointFileError;
    use crate::core::models::system::SystemError;
    use crate::core::statistics::evaluation::EvaluationError;
    use std::fs;
    use std::path::PathBuf;

    fn write_shapes(dir: &Path, shapes: &[Vec<Point3<f64>>]) -> Vec<PathBuf> {
        shapes
            .iter()
            .enumerate()
            .map(|(i, points)| {
                let path = dir.join(format!("shape_{i}.particles"));
                ParticlesFile::write_to_path(points, &path).unwrap();
                path
            })
            .collect()
    }

    fn population() -> Vec<Vec<Point3<f64>>> {
        (0..5)
            .map(|i| {
                let s = 1.0 + 0.1 * i as f64;
                vec![
                    Point3::new(s, 0.0, 0.0),
                    Point3::new(0.0, 2.0 - 0.05 * i as f64, 0.0),
                    Point3::new(0.0, 0.0, 3.0),
                    Point3::new(1.0, 1.0, 1.0 + 0.02 * (i * i) as f64),
                ]
            })
            .collect()
    }

    fn settings() -> EvaluationSettings {
        EvaluationSettings {
            modes: 1,
            specificity_samples: 50,
            seed: 42,
            reconstruction_dir: None,
        }
    }

    #[test]
    fn load_keeps_points_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let shapes = population();
        let paths = write_shapes(dir.path(), &shapes);
        let system = load_particle_system(&paths).unwrap();
        assert_eq!(system.num_domains(), 5);
        for (d, shape) in shapes.iter().enumerate() {
            assert_eq!(system.global_positions(d), *shape);
        }
    }

    #[test]
    fn load_rejects_mismatched_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut shapes = population();
        shapes[3].pop();
        let paths = write_shapes(dir.path(), &shapes);
        let err = load_particle_system(&paths).unwrap_err();
        assert!(matches!(
            err,
            EngineError::System {
                source: SystemError::ParticleCountMismatch { expected: 4, found: 3 }
            }
        ));
    }

    #[test]
    fn load_reports_the_failing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = write_shapes(dir.path(), &population());
        let bad = dir.path().join("bad.particles");
        fs::write(&bad, "1 2 3\n4 5\n").unwrap();
        paths.push(bad.clone());
        match load_particle_system(&paths).unwrap_err() {
            EngineError::PointFile { path, source } => {
                assert_eq!(path, bad);
                assert!(matches!(source, PointFileError::WrongArity { line: 2, found: 2 }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn run_produces_a_full_report() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_shapes(dir.path(), &population());
        let report = run(&paths, &settings(), &ProgressReporter::new()).unwrap();
        assert_eq!(report.num_shapes, 5);
        assert_eq!(report.num_points, 4);
        assert!(report.compactness > 0.0 && report.compactness <= 1.0 + 1e-12);
        assert!(report.generalization >= 0.0);
        assert!(report.specificity >= 0.0);
        assert_eq!(report.compactness_curve.len(), 4);
    }

    #[test]
    fn too_few_shapes_is_an_evaluation_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_shapes(dir.path(), &population()[..1]);
        let err = run(&paths, &settings(), &ProgressReporter::new()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Evaluation {
                source: EvaluationError::TooFewShapes { .. }
            }
        ));
    }

    #[test]
    fn reconstructions_are_written_per_shape() {
        let dir = tempfile::tempdir().unwrap();
        let shapes = population();
        let paths = write_shapes(dir.path(), &shapes);
        let out = dir.path().join("reconstructions");
        fs::create_dir(&out).unwrap();
        let settings = EvaluationSettings {
            reconstruction_dir: Some(out.clone()),
            ..settings()
        };
        run(&paths, &settings, &ProgressReporter::new()).unwrap();

        for (i, shape) in shapes.iter().enumerate() {
            let original =
                ParticlesFile::read_from_path(out.join(format!("{i}_original.particles")))
                    .unwrap();
            for (read, expected) in original.iter().zip(shape) {
                assert!((read - expected).norm() < 1e-9);
            }
            let rebuilt =
                ParticlesFile::read_from_path(out.join(format!("{i}_reconstruction.particles")))
                    .unwrap();
            assert_eq!(rebuilt.len(), shape.len());
        }
    }

    #[test]
    fn reconstruction_into_missing_directory_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let system_paths = write_shapes(dir.path(), &population());
        let system = load_particle_system(&system_paths).unwrap();
        let model = ShapeModel::from_system(&system).unwrap();
        let missing = dir.path().join("absent");
        match save_reconstructions(&model, 1, &missing).unwrap_err() {
            EngineError::PointFile { path, .. } => {
                assert_eq!(path, missing.join("0_original.particles"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
