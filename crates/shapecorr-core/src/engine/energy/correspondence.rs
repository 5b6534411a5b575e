use super::{EnergyTerm, TermEvaluation};
use crate::core::models::system::ParticleSystem;
use crate::engine::error::EngineError;
use itertools::Itertools;
use nalgebra::{DMatrix, Vector3};
use tracing::{instrument, trace};

/// Entropy of the shape population in correspondence space.
///
/// Each domain contributes one column of concatenated global coordinates. The
/// gradient for shape `j` is column `j` of `Y (G + aI)^-1`, where `Y` holds the
/// centred columns and `G = Y^T Y / (S - 1)` is their Gram matrix. With fewer
/// than two shapes the term is inactive.
#[derive(Debug, Default)]
pub struct CorrespondenceTerm {
    /// Global-frame gradients, `3N x S`.
    update: Option<DMatrix<f64>>,
    variances: Vec<f64>,
}

impl CorrespondenceTerm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.update.is_some()
    }

    fn centred_shape_matrix(system: &ParticleSystem) -> DMatrix<f64> {
        let shapes = system.num_domains();
        let rows = 3 * system.num_particles();
        let mut y = DMatrix::<f64>::zeros(rows, shapes);
        for d in 0..shapes {
            for (i, p) in system.global_positions(d).iter().enumerate() {
                y[(3 * i, d)] = p.x;
                y[(3 * i + 1, d)] = p.y;
                y[(3 * i + 2, d)] = p.z;
            }
        }
        let mean = y.column_mean();
        DMatrix::from_fn(rows, shapes, |r, c| y[(r, c)] - mean[r])
    }
}

impl EnergyTerm for CorrespondenceTerm {
    fn name(&self) -> &'static str {
        "correspondence"
    }

    #[instrument(
        skip_all,
        name = "correspondence_prepare",
        fields(regularization = regularization)
    )]
    fn prepare(&mut self, system: &ParticleSystem, regularization: f64) -> Result<(), EngineError> {
        let shapes = system.num_domains();
        if shapes < 2 || system.num_particles() == 0 {
            self.update = None;
            self.variances.clear();
            return Ok(());
        }
        if !system.is_balanced() {
            return Err(EngineError::Energy {
                term: self.name(),
                reason: "domains hold different particle counts".to_string(),
            });
        }

        let y = Self::centred_shape_matrix(system);
        let gram = y.transpose() * &y / (shapes - 1) as f64;

        let variances: Vec<f64> = gram
            .symmetric_eigenvalues()
            .iter()
            .map(|v| v.max(0.0))
            .sorted_by(|a, b| b.total_cmp(a))
            .collect();

        let regularized = &gram + DMatrix::identity(shapes, shapes) * regularization;
        let inverse = regularized
            .cholesky()
            .map(|c| c.inverse())
            .ok_or_else(|| EngineError::Energy {
                term: "correspondence",
                reason: format!(
                    "regularized covariance is not positive definite (alpha = {regularization})"
                ),
            })?;

        self.update = Some(&y * inverse);
        trace!(
            top_variance = variances.first().copied().unwrap_or(0.0),
            "Correspondence model updated"
        );
        self.variances = variances;
        Ok(())
    }

    fn evaluate(&self, system: &ParticleSystem, domain: usize, index: usize) -> TermEvaluation {
        let Some(update) = &self.update else {
            return TermEvaluation::default();
        };
        let row = 3 * index;
        if row + 2 >= update.nrows() || domain >= update.ncols() {
            return TermEvaluation::default();
        }
        let global = Vector3::new(
            update[(row, domain)],
            update[(row + 1, domain)],
            update[(row + 2, domain)],
        );
        TermEvaluation {
            gradient: system.transform(domain).gradient_to_local(&global),
            sigma: None,
        }
    }

    fn mode_variances(&self) -> Option<&[f64]> {
        self.update.as_ref().map(|_| self.variances.as_slice())
    }
}
