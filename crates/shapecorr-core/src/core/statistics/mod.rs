//! PCA-based quality metrics for a finished correspondence model.
//!
//! - [`model`] - The shape matrix and its principal components
//! - [`evaluation`] - Compactness, generalization and specificity

pub mod evaluation;
pub mod model;
