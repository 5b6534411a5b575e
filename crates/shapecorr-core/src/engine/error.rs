use std::path::PathBuf;
use thiserror::Error;

use super::config::ConfigError;
use super::procrustes::ProcrustesError;
use crate::core::domain::DomainError;
use crate::core::io::points::PointFileError;
use crate::core::models::system::SystemError;
use crate::core::statistics::evaluation::EvaluationError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Particle system error: {source}")]
    System {
        #[from]
        source: SystemError,
    },

    #[error("Domain error: {source}")]
    Domain {
        #[from]
        source: DomainError,
    },

    #[error("Procrustes registration failed: {source}")]
    Procrustes {
        #[from]
        source: ProcrustesError,
    },

    #[error("Point file '{}' failed: {source}", path.display())]
    PointFile {
        path: PathBuf,
        #[source]
        source: PointFileError,
    },

    #[error("Shape evaluation failed: {source}")]
    Evaluation {
        #[from]
        source: EvaluationError,
    },

    #[error("Energy term '{term}' failed: {reason}")]
    Energy { term: &'static str, reason: String },

    #[error("Optimization has already finished")]
    Finished,
}
