//! Ready-made models and LQ problems.

use nalgebra::{DMatrix, DVector};

use lqoc_core::state_space::StateSpaceModel;
use lqoc_core::types::TimeType;
use lqoc_solver::problem::{LqCost, LqProblem};

use crate::rng::{random_matrix, random_spd, random_vector, seeded_rng};

/// Sample time of [`discrete_double_integrator`].
pub const DOUBLE_INTEGRATOR_DT: f64 = 0.1;

/// Zero-order-hold double integrator, state `[position, velocity]`, input acceleration.
pub fn discrete_double_integrator() -> StateSpaceModel {
    let dt = DOUBLE_INTEGRATOR_DT;
    StateSpaceModel::new(
        DMatrix::from_row_slice(2, 2, &[1.0, dt, 0.0, 1.0]),
        DMatrix::from_row_slice(2, 1, &[0.5 * dt * dt, dt]),
        TimeType::Discrete,
    )
    .expect("double integrator matrices are consistent")
}

/// Discrete-time model with `A = diag(poles)` and `B` a column of ones.
///
/// Stable when every pole lies strictly inside the unit circle.
pub fn stable_diagonal_model(poles: &[f64]) -> StateSpaceModel {
    let n = poles.len();
    StateSpaceModel::new(
        DMatrix::from_diagonal(&DVector::from_column_slice(poles)),
        DMatrix::from_element(n, 1, 1.0),
        TimeType::Discrete,
    )
    .expect("diagonal model matrices are consistent")
}

/// Double integrator regulation problem from `x0` with unit weights.
pub fn double_integrator_problem(x0: &DVector<f64>, horizon: usize) -> LqProblem {
    let cost = LqCost::diagonal(&[1.0, 1.0], &[0.1]);
    LqProblem::from_lti(&discrete_double_integrator(), &cost, x0, horizon)
        .expect("double integrator problem is well formed")
}

/// Time-varying LQ problem with random, strictly convex data.
///
/// Q_k and R_k are symmetric positive definite and P_k is small enough
/// that every stage Hessian `[[Q, Pᵀ], [P, R]]` stays positive definite.
pub fn random_lq_problem(state_dim: usize, control_dim: usize, horizon: usize, seed: u64) -> LqProblem {
    let mut rng = seeded_rng(seed);
    let mut p = LqProblem::zeros(state_dim, control_dim, horizon)
        .expect("fixture dimensions are positive");

    for k in 0..=horizon {
        p.x[k] = random_vector(&mut rng, state_dim);
        p.q_mat[k] = random_spd(&mut rng, state_dim, 1.0);
        p.q_vec[k] = random_vector(&mut rng, state_dim) * 0.1;
    }
    for k in 0..horizon {
        p.u[k] = random_vector(&mut rng, control_dim);
        p.a_mat[k] = DMatrix::identity(state_dim, state_dim)
            + random_matrix(&mut rng, state_dim, state_dim) * 0.1;
        p.b_mat[k] = random_matrix(&mut rng, state_dim, control_dim);
        p.b_vec[k] = random_vector(&mut rng, state_dim) * 0.1;
        p.r_mat[k] = random_spd(&mut rng, control_dim, 1.0);
        p.r_vec[k] = random_vector(&mut rng, control_dim) * 0.1;
        p.p_mat[k] = random_matrix(&mut rng, control_dim, state_dim) * (0.1 / state_dim as f64);
    }
    p
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
