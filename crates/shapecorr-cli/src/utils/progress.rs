use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use shapecorr::engine::progress::{Progress, ProgressCallback};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Drives one progress bar per optimization scale.
#[derive(Clone)]
pub struct CliProgressHandler {
    pb: Arc<Mutex<ProgressBar>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    /// A handler whose bar is never drawn.
    pub fn hidden() -> Self {
        Self::with_draw_target(ProgressDrawTarget::hidden())
    }

    fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let pb = ProgressBar::new(0)
            .with_style(Self::bar_style())
            .with_message("Initializing...");
        pb.set_draw_target(target);
        pb.finish_and_clear();

        Self {
            pb: Arc::new(Mutex::new(pb)),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let pb_clone = self.pb.clone();

        Box::new(move |progress: Progress| {
            let Ok(pb_guard) = pb_clone.lock() else {
                warn!("Progress bar mutex was poisoned. Cannot update progress.");
                return;
            };

            match progress {
                Progress::ScaleStart {
                    scale,
                    num_scales,
                    particles,
                    max_iterations,
                } => {
                    pb_guard.reset();
                    pb_guard.set_length(max_iterations as u64);
                    pb_guard.set_position(0);
                    pb_guard.set_message(format!(
                        "Scale {}/{} ({} particles)",
                        scale + 1,
                        num_scales,
                        particles
                    ));
                }
                Progress::Iteration(status) => {
                    pb_guard.set_position(status.scale_iteration as u64);
                    if let Some(leading) = status.pca_variances.first() {
                        pb_guard.set_message(format!(
                            "Scale {}/{} ({} particles, λ₁ {:.3e})",
                            status.scale + 1,
                            status.num_scales,
                            status.particles,
                            leading
                        ));
                    }
                }
                Progress::ProcrustesApplied { iteration } => {
                    info!(iteration, "Procrustes registration applied");
                }
                Progress::ScaleFinish {
                    scale,
                    iterations,
                    converged,
                } => {
                    pb_guard.set_position(iterations as u64);
                    let outcome = if converged { "converged" } else { "budget spent" };
                    pb_guard.finish_with_message(format!(
                        "✓ Scale {} done after {} iterations ({})",
                        scale + 1,
                        iterations,
                        outcome
                    ));
                }
                Progress::Message(msg) => {
                    if !pb_guard.is_finished() {
                        pb_guard.println(format!("  {}", msg));
                    } else {
                        pb_guard.set_message(msg);
                    }
                }
            }
        })
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg:<40} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .with_key(
                "eta",
                |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                    let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
                },
            )
            .progress_chars("##-")
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}
