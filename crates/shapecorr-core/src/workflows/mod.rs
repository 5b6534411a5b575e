//! # Workflows Module
//!
//! Top-level entry points that tie the [`engine`](crate::engine) and
//! [`core`](crate::core) layers together into complete procedures.
//!
//! ## Architecture
//!
//! - **Optimization Workflow** ([`optimize`]) - Multi-scale particle optimization over a
//!   population of domains, plus writing the resulting particles in local and world frames.
//! - **Evaluation Workflow** ([`evaluate`]) - Loading ordered point files into a particle
//!   system and computing compactness, generalization and specificity of the PCA model.
//!
//! Both workflows report through the same
//! [`ProgressReporter`](crate::engine::progress::ProgressReporter) used by the
//! engine and return [`EngineError`](crate::engine::error::EngineError) on failure.

pub mod evaluate;
pub mod optimize;
