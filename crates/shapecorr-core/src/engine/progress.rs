use super::state::OptimizerStatus;

#[derive(Debug, Clone)]
pub enum Progress {
    ScaleStart {
        scale: usize,
        num_scales: usize,
        particles: usize,
        max_iterations: usize,
    },
    /// Emitted every `report_interval` sweeps.
    Iteration(OptimizerStatus),
    ProcrustesApplied {
        iteration: usize,
    },
    ScaleFinish {
        scale: usize,
        iterations: usize,
        converged: bool,
    },

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}
