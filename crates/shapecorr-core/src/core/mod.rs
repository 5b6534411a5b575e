//! # Core Module
//!
//! The stateless foundation of the library: geometric oracles for each shape, the
//! particle store that samples them, shared geometry helpers, file formats, and
//! the PCA statistics used to judge a finished correspondence model.
//!
//! ## Architecture
//!
//! - **Shape Oracles** ([`domain`]) - Scalar fields, constraint projection, cutting planes
//! - **Particle Representation** ([`models`]) - Particle store, per-domain transforms, attributes
//! - **File I/O** ([`io`]) - Ordered point-set files and compactness exports
//! - **Shape Statistics** ([`statistics`]) - Compactness, generalization, specificity
//! - **Geometry** ([`utils`]) - Centroids, collinearity checks, least-squares alignment
//!
//! Nothing here iterates an optimization; the stateful driver lives in
//! [`crate::engine`].

pub mod domain;
pub mod io;
pub mod models;
pub mod statistics;
pub mod utils;
