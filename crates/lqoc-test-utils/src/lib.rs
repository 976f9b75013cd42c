//! Shared test fixtures and utilities for the LQ optimal-control crates.
//!
//! Provides deterministic RNG setup, random well-conditioned matrices and
//! ready-made models and LQ problems.

pub mod fixtures;
pub mod rng;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use fixtures::{discrete_double_integrator, random_lq_problem, stable_diagonal_model};
pub use rng::{deterministic_vec, seeded_rng};
