use super::model::{PrincipalComponents, ShapeModel, mean_point_distance};
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

pub const DEFAULT_SPECIFICITY_SAMPLES: usize = 1000;
pub const DEFAULT_SPECIFICITY_SEED: u64 = 42;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("Number of modes must be at least 1")]
    ZeroModes,
    #[error("At least {required} shapes are required, found {found}")]
    TooFewShapes { required: usize, found: usize },
    #[error("Shape {index} has {found} points, expected {expected}")]
    InconsistentShape {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("Shapes contain no points")]
    EmptyShapes,
    #[error("Total shape variance is zero")]
    DegenerateVariance,
    #[error("Computation produced non-finite values")]
    NonFinite,
    #[error("Sample count must be at least 1")]
    ZeroSamples,
}

fn check_modes(n_modes: usize) -> Result<(), EvaluationError> {
    if n_modes == 0 {
        Err(EvaluationError::ZeroModes)
    } else {
        Ok(())
    }
}

fn check_shapes(model: &ShapeModel, required: usize) -> Result<(), EvaluationError> {
    let found = model.num_shapes();
    if found < required {
        Err(EvaluationError::TooFewShapes { required, found })
    } else {
        Ok(())
    }
}

fn finite(value: f64) -> Result<f64, EvaluationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvaluationError::NonFinite)
    }
}

/// Cumulative explained-variance fraction for every mode count `1..S`.
pub fn full_compactness(model: &ShapeModel) -> Result<Vec<f64>, EvaluationError> {
    check_shapes(model, 2)?;
    let pca = PrincipalComponents::fit(model.matrix())?;
    let total: f64 = pca.squared_singular_values.iter().sum();
    if total <= f64::MIN_POSITIVE {
        return Err(EvaluationError::DegenerateVariance);
    }

    let mode_count = (model.num_shapes() - 1).min(model.matrix().ncols());
    let mut running = 0.0;
    pca.squared_singular_values
        .iter()
        .take(mode_count)
        .map(|s2| {
            running += s2;
            finite((running / total).min(1.0))
        })
        .collect()
}

/// Fraction of total variance captured by the first `n_modes` principal modes.
///
/// Mode counts beyond the number of available modes clamp to the last one.
pub fn compactness(model: &ShapeModel, n_modes: usize) -> Result<f64, EvaluationError> {
    check_modes(n_modes)?;
    let curve = full_compactness(model)?;
    let index = n_modes.min(curve.len()) - 1;
    Ok(curve[index])
}

/// One shape left out of the model and rebuilt from the remaining shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct HeldOutShape {
    pub index: usize,
    pub original: DVector<f64>,
    pub reconstruction: DVector<f64>,
    /// Mean point distance between `original` and `reconstruction`.
    pub error: f64,
}

/// Rebuilds every shape from a PCA of the others.
///
/// Each shape is projected onto the first `n_modes` modes of a PCA fitted to
/// the remaining shapes. The result holds one entry per shape, in model order.
#[instrument(skip_all, name = "leave_one_out", fields(n_modes = n_modes))]
pub fn leave_one_out(
    model: &ShapeModel,
    n_modes: usize,
) -> Result<Vec<HeldOutShape>, EvaluationError> {
    check_modes(n_modes)?;
    check_shapes(model, 3)?;

    let held_out = |index: usize| -> Result<HeldOutShape, EvaluationError> {
        let pca = PrincipalComponents::fit(&model.without(index))?;
        let original = model.shape(index);
        let reconstruction = pca.reconstruct(&original, n_modes);
        let error = mean_point_distance(&original, &reconstruction);
        Ok(HeldOutShape {
            index,
            original,
            reconstruction,
            error,
        })
    };

    #[cfg(not(feature = "parallel"))]
    let iterator = 0..model.num_shapes();

    #[cfg(feature = "parallel")]
    let iterator = (0..model.num_shapes()).into_par_iter();

    iterator.map(held_out).collect()
}

/// Leave-one-out reconstruction error, averaged over shapes.
///
/// The error of one shape is the mean Euclidean distance between its points
/// and their reconstruction by [`leave_one_out`].
pub fn generalization(model: &ShapeModel, n_modes: usize) -> Result<f64, EvaluationError> {
    let held_out = leave_one_out(model, n_modes)?;
    let mean = held_out.iter().map(|h| h.error).sum::<f64>() / held_out.len() as f64;
    debug!(mean, "Leave-one-out reconstruction finished");
    finite(mean)
}

/// Monte-Carlo estimate of the distance from model-generated shapes to the
/// nearest training shape.
///
/// Coefficients of the first `n_modes` modes are drawn from independent normal
/// distributions with the per-mode sample variance. The result is reproducible
/// for a given `samples` and `seed`.
#[instrument(
    skip_all,
    name = "specificity",
    fields(n_modes = n_modes, samples = samples, seed = seed)
)]
pub fn specificity(
    model: &ShapeModel,
    n_modes: usize,
    samples: usize,
    seed: u64,
) -> Result<f64, EvaluationError> {
    check_modes(n_modes)?;
    check_shapes(model, 2)?;
    if samples == 0 {
        return Err(EvaluationError::ZeroSamples);
    }

    let pca = PrincipalComponents::fit(model.matrix())?;
    let deviations: Vec<f64> = pca
        .variances()
        .into_iter()
        .take(n_modes)
        .map(f64::sqrt)
        .collect();

    let mut rng = StdRng::seed_from_u64(seed);
    let draws: Vec<DVector<f64>> = (0..samples)
        .map(|_| {
            DVector::from_iterator(
                deviations.len(),
                deviations.iter().map(|sd| sd * standard_normal(&mut rng)),
            )
        })
        .collect();

    let training: Vec<DVector<f64>> = (0..model.num_shapes()).map(|i| model.shape(i)).collect();
    let nearest = |coefficients: &DVector<f64>| -> f64 {
        let synthetic = pca.synthesize(coefficients);
        training
            .iter()
            .map(|shape| mean_point_distance(&synthetic, shape))
            .fold(f64::INFINITY, f64::min)
    };

    #[cfg(not(feature = "parallel"))]
    let distances: Vec<f64> = draws.iter().map(nearest).collect();

    #[cfg(feature = "parallel")]
    let distances: Vec<f64> = draws.par_iter().map(nearest).collect();

    finite(distances.iter().sum::<f64>() / samples as f64)
}

/// Box-Muller draw from the standard normal distribution.
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.r#gen::<f64>();
    let u2: f64 = rng.r#gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Every metric for one mode count, ready for serialization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub num_shapes: usize,
    pub num_points: usize,
    pub modes: usize,
    pub compactness: f64,
    pub generalization: f64,
    pub specificity: f64,
    pub compactness_curve: Vec<f64>,
}

impl EvaluationReport {
    pub fn compute(
        model: &ShapeModel,
        n_modes: usize,
        samples: usize,
        seed: u64,
    ) -> Result<Self, EvaluationError> {
        let compactness_curve = full_compactness(model)?;
        Ok(Self {
            num_shapes: model.num_shapes(),
            num_points: model.num_points(),
            modes: n_modes,
            compactness: compactness(model, n_modes)?,
            generalization: generalization(model, n_modes)?,
            specificity: specificity(model, n_modes, samples, seed)?,
            compactness_curve,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{DMatrix, Point3};

    /// Shapes whose first point moves along x and second point along y, with
    /// independent amplitudes, so the population has exactly two modes.
    fn two_mode_population() -> ShapeModel {
        let amplitudes = [(0.0, 0.0), (3.0, 0.5), (-3.0, 0.2), (1.0, -0.6), (-1.0, -0.1)];
        let shapes: Vec<Vec<Point3<f64>>> = amplitudes
            .iter()
            .map(|&(a, b)| {
                vec![
                    Point3::new(a, 0.0, 0.0),
                    Point3::new(5.0, b, 0.0),
                    Point3::new(0.0, 0.0, 5.0),
                ]
            })
            .collect();
        ShapeModel::from_point_sets(&shapes).unwrap()
    }

    fn identical_population(count: usize) -> ShapeModel {
        let shape = vec![
            Point3::new(1.0, 2.0, 3.0),
            Point3::new(-1.0, 0.5, 2.0),
            Point3::new(0.0, -3.0, 1.0),
        ];
        ShapeModel::from_point_sets(&vec![shape; count]).unwrap()
    }

    #[test]
    fn compactness_is_monotone_and_reaches_one() {
        let model = two_mode_population();
        let curve = full_compactness(&model).unwrap();
        assert_eq!(curve.len(), 4);
        for pair in curve.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert!(curve[0] > 0.9 && curve[0] < 1.0);
        assert!((compactness(&model, 2).unwrap() - 1.0).abs() < 1e-12);
        assert!((compactness(&model, 50).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn compactness_rejects_zero_modes_and_zero_variance() {
        let model = two_mode_population();
        assert_eq!(compactness(&model, 0), Err(EvaluationError::ZeroModes));
        assert_eq!(
            compactness(&identical_population(4), 1),
            Err(EvaluationError::DegenerateVariance)
        );
    }

    #[test]
    fn identical_shapes_generalize_and_specify_perfectly() {
        let model = identical_population(5);
        assert!(generalization(&model, 1).unwrap().abs() < 1e-12);
        assert!(specificity(&model, 1, 50, 42).unwrap().abs() < 1e-12);
        assert!(specificity(&model, 3, 10, 7).unwrap().abs() < 1e-12);
    }

    #[test]
    fn generalization_vanishes_when_held_out_shapes_are_in_span() {
        // Points move along one fixed direction, so every shape is reachable
        // from the one-mode PCA of the others.
        let shapes: Vec<Vec<Point3<f64>>> = [0.0, 1.0, 2.5, -1.0]
            .iter()
            .map(|&t| vec![Point3::new(t, 0.0, 0.0), Point3::new(1.0, 2.0 * t, 0.0)])
            .collect();
        let model = ShapeModel::from_point_sets(&shapes).unwrap();
        assert!(generalization(&model, 1).unwrap() < 1e-9);
    }

    #[test]
    fn generalization_improves_with_more_modes() {
        let model = two_mode_population();
        let one = generalization(&model, 1).unwrap();
        let two = generalization(&model, 2).unwrap();
        assert!(one > 0.0);
        assert!(two <= one + 1e-12);
    }

    #[test]
    fn generalization_requires_three_shapes() {
        let rows = DMatrix::from_row_slice(2, 3, &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        let model = ShapeModel::from_matrix(rows).unwrap();
        assert_eq!(
            generalization(&model, 1),
            Err(EvaluationError::TooFewShapes {
                required: 3,
                found: 2
            })
        );
    }

    #[test]
    fn specificity_is_reproducible_for_a_seed() {
        let model = two_mode_population();
        let a = specificity(&model, 1, 200, 42).unwrap();
        let b = specificity(&model, 1, 200, 42).unwrap();
        assert_eq!(a, b);
        assert!(a > 0.0);
        assert_eq!(specificity(&model, 1, 0, 42), Err(EvaluationError::ZeroSamples));
    }

    #[test]
    fn report_collects_every_metric() {
        let model = two_mode_population();
        let report = EvaluationReport::compute(&model, 1, 100, 42).unwrap();
        assert_eq!(report.num_shapes, 5);
        assert_eq!(report.num_points, 3);
        assert_eq!(report.compactness, report.compactness_curve[0]);
    }
}
