//! # Core Models Module
//!
//! Data structures describing a population of shapes sampled by particles.
//!
//! ## Key Components
//!
//! - [`system`] - The per-domain particle store with its observer hooks
//! - [`transform`] - Local-to-global similarity transforms, one per domain
//! - [`attribute`] - Derived per-particle quantities kept in sync with the store
//!
//! ## Usage
//!
//! ```ignore
//! use shapecorr::core::domain::{ImplicitSurfaceDomain, field::ScalarField};
//! use shapecorr::core::models::system::ParticleSystem;
//!
//! let mut system = ParticleSystem::new();
//! let d = system.add_domain(ImplicitSurfaceDomain::new(field).into());
//! system.add_particle(d, &Point3::new(1.0, 0.0, 0.0));
//! ```

pub mod attribute;
pub mod system;
pub mod transform;
