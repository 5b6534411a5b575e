//! # shapecorr Core Library
//!
//! Particle-based dense shape correspondence. A population of shapes, each given
//! as a scalar field whose zero level set is the surface, is sampled with the
//! same number of particles per shape. Particles are moved to spread evenly over
//! each surface while keeping the population compact in correspondence space,
//! and the resulting point distribution model is judged by compactness,
//! generalization and specificity.
//!
//! ## Architectural Philosophy
//!
//! The library keeps the same three-layer split throughout:
//!
//! - **[`core`]: The Foundation.** Stateless geometry: domains and their scalar fields,
//!   the `ParticleSystem` store with per-domain transforms, point-file I/O, and the
//!   PCA statistics used to evaluate a finished population.
//!
//! - **[`engine`]: The Logic Core.** The stateful optimizer: energy terms, update
//!   strategies, particle splitting, and generalized Procrustes registration.
//!
//! - **[`workflows`]: The Public API.** End-to-end procedures for optimizing a population
//!   and for evaluating a population stored as point files.

pub mod core;
pub mod engine;
pub mod workflows;
