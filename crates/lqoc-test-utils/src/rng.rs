//! Deterministic RNG utilities for reproducible tests.

use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Create a deterministic `ChaCha8Rng` from a seed.
///
/// All test randomization should go through this to ensure reproducibility.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Generate a deterministic `DVector<f64>` of length `dim` from a seed,
/// entries uniform in `[-1, 1)`.
pub fn deterministic_vec(dim: usize, seed: u64) -> DVector<f64> {
    let mut rng = seeded_rng(seed);
    random_vector(&mut rng, dim)
}

/// Vector with entries uniform in `[-1, 1)`.
pub fn random_vector(rng: &mut impl Rng, dim: usize) -> DVector<f64> {
    DVector::from_fn(dim, |_, _| rng.gen_range(-1.0..1.0))
}

/// Matrix with entries uniform in `[-1, 1)`.
pub fn random_matrix(rng: &mut impl Rng, rows: usize, cols: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows, cols, |_, _| rng.gen_range(-1.0..1.0))
}

/// Symmetric positive-definite matrix `M Mᵀ + shift·I`.
pub fn random_spd(rng: &mut impl Rng, dim: usize, shift: f64) -> DMatrix<f64> {
    let m = random_matrix(rng, dim, dim);
    &m * m.transpose() + DMatrix::identity(dim, dim) * shift
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
