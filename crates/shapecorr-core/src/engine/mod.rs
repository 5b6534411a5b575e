//! # Engine Module
//!
//! The stateful layer that moves particles. It turns a
//! [`ParticleSystem`](crate::core::models::system::ParticleSystem) holding one
//! domain per shape into a set of corresponding particles by
//! descending a combined energy over several scales.
//!
//! ## Overview
//!
//! Optimization proceeds scale by scale. The first scale starts from one particle
//! per domain; each later scale splits every particle in two along a random
//! tangent direction shared by all domains, so correspondence is preserved by
//! construction. Within a scale the optimizer repeatedly:
//!
//! 1. rebuilds the energy terms from the current positions,
//! 2. moves every particle one gradient step with the configured update strategy,
//! 3. re-aligns the population with generalized Procrustes on its interval.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Per-scale schedules, update mode and cutting planes
//! - **Energy** ([`energy`]) - Surface sampling and correspondence entropy terms
//! - **Update Strategies** ([`update`]) - Simultaneous, sequential and adaptive sweeps
//! - **Registration** ([`procrustes`]) - Generalized Procrustes alignment of domain transforms
//! - **Seeding** ([`seeding`]) - First-particle placement and particle splitting
//! - **Optimizer** ([`optimizer`]) - The multi-scale state machine
//! - **State Tracking** ([`state`]) - Status snapshots and per-scale diagnostics
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress reporting
//! - **Error Handling** ([`error`]) - Engine-specific error types

pub mod config;
pub mod energy;
pub mod error;
pub mod optimizer;
pub mod procrustes;
pub mod progress;
pub mod seeding;
pub mod state;
pub mod update;
