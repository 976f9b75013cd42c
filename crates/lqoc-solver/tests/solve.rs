//! End-to-end tests: problem -> transcription -> backend -> trajectories.

use approx::assert_relative_eq;
use nalgebra::DVector;
use rand::Rng;

use lqoc_core::analysis::{GramianOptions, is_controllable, observability_gramian};
use lqoc_core::config::{BackendKind, SolverSettings};
use lqoc_core::error::{SolverError, UnsupportedOperation};
use lqoc_solver::prelude::*;
use lqoc_test_utils::fixtures::double_integrator_problem;
use lqoc_test_utils::{
    deterministic_vec, discrete_double_integrator, random_lq_problem, seeded_rng,
    stable_diagonal_model,
};

fn solve_with(backend: BackendKind, problem: &LqProblem) -> (Vec<DVector<f64>>, Vec<DVector<f64>>, Vec<DVector<f64>>) {
    let settings = SolverSettings {
        backend,
        ..SolverSettings::default()
    };
    let mut solver = make_solver(&settings).unwrap();
    solver.set_problem(problem).unwrap();
    let report = solver.solve().unwrap();
    assert!(report.status.is_converged(), "{backend:?} returned {:?}", report.status);
    (
        solver.solution_state().unwrap(),
        solver.solution_control().unwrap(),
        solver.costates().unwrap(),
    )
}

/// Roll the local dynamics forward from the fixed initial state.
fn rollout(problem: &LqProblem, controls: &[DVector<f64>]) -> Vec<DVector<f64>> {
    let mut states = vec![problem.x[0].clone()];
    for k in 0..problem.number_of_stages() {
        let dx = &states[k] - &problem.x[k];
        let du = &controls[k] - &problem.u[k];
        let dx_next = &problem.a_mat[k] * dx + &problem.b_mat[k] * du + &problem.b_vec[k];
        states.push(&problem.x[k + 1] + dx_next);
    }
    states
}

// ---------------------------------------------------------------------------
// Trajectory shape
// ---------------------------------------------------------------------------

#[test]
fn first_state_is_the_fixed_initial_state() {
    let problem = random_lq_problem(3, 2, 8, 1);
    for backend in [BackendKind::InteriorPoint, BackendKind::Riccati] {
        let (states, controls, costates) = solve_with(backend, &problem);
        assert_eq!(states.len(), 9);
        assert_eq!(states[0], problem.x[0]);
        assert_eq!(controls.len(), 8);
        assert_eq!(costates.len(), 8);
    }
}

#[test]
fn single_stage_horizon() {
    let problem = random_lq_problem(2, 1, 1, 2);
    let (states, controls, _) = solve_with(BackendKind::Riccati, &problem);
    assert_eq!(states.len(), 2);
    assert_eq!(controls.len(), 1);
}

// ---------------------------------------------------------------------------
// Optimality
// ---------------------------------------------------------------------------

#[test]
fn solution_satisfies_dynamics() {
    let problem = random_lq_problem(4, 2, 10, 3);
    for backend in [BackendKind::InteriorPoint, BackendKind::Riccati] {
        let (states, controls, _) = solve_with(backend, &problem);
        let defect = problem.dynamics_defect(&states, &controls).unwrap();
        for d in &defect {
            assert!(d.amax() < 1e-6, "{backend:?} defect {d}");
        }
    }
}

#[test]
fn perturbed_controls_never_lower_the_cost() {
    let problem = random_lq_problem(3, 2, 6, 4);
    let (states, controls, _) = solve_with(BackendKind::Riccati, &problem);
    let optimal = problem.evaluate_cost(&states, &controls).unwrap();

    let mut rng = seeded_rng(40);
    for _ in 0..20 {
        let perturbed: Vec<DVector<f64>> = controls
            .iter()
            .map(|u| u.map(|v| v + rng.gen_range(-0.1..0.1)))
            .collect();
        let perturbed_states = rollout(&problem, &perturbed);
        let cost = problem.evaluate_cost(&perturbed_states, &perturbed).unwrap();
        assert!(cost >= optimal - 1e-10, "cost {cost} below optimum {optimal}");
    }
}

#[test]
fn backends_agree() {
    for seed in 0..3 {
        let problem = random_lq_problem(4, 2, 12, 100 + seed);
        let (x_ipm, u_ipm, pi_ipm) = solve_with(BackendKind::InteriorPoint, &problem);
        let (x_ric, u_ric, pi_ric) = solve_with(BackendKind::Riccati, &problem);

        for (a, b) in x_ipm.iter().zip(&x_ric) {
            assert_relative_eq!(a, b, epsilon = 1e-5);
        }
        for (a, b) in u_ipm.iter().zip(&u_ric) {
            assert_relative_eq!(a, b, epsilon = 1e-5);
        }
        for (a, b) in pi_ipm.iter().zip(&pi_ric) {
            assert_relative_eq!(a, b, epsilon = 1e-5);
        }
    }
}

#[test]
fn stable_model_regulation_agrees_across_backends() {
    let model = stable_diagonal_model(&[0.5, 0.8, -0.3]);
    assert!(is_controllable(&model));
    let gramian = observability_gramian(&model, GramianOptions::default()).unwrap();
    assert!(gramian.converged);
    assert!(gramian.matrix.cholesky().is_some());

    let x0 = deterministic_vec(3, 17);
    let cost = LqCost::diagonal(&[1.0, 1.0, 1.0], &[0.5]);
    let problem = LqProblem::from_lti(&model, &cost, &x0, 30).unwrap();
    let (x_ipm, u_ipm, _) = solve_with(BackendKind::InteriorPoint, &problem);
    let (x_ric, u_ric, _) = solve_with(BackendKind::Riccati, &problem);

    assert_eq!(x_ric[0], x0);
    assert!(x_ric[30].norm() < 0.5 * x0.norm());
    for (a, b) in x_ipm.iter().zip(&x_ric) {
        assert_relative_eq!(a, b, epsilon = 1e-5);
    }
    for (a, b) in u_ipm.iter().zip(&u_ric) {
        assert_relative_eq!(a, b, epsilon = 1e-5);
    }
}

#[test]
fn absolute_solution_does_not_depend_on_nominal_trajectory() {
    let model = discrete_double_integrator();
    let cost = LqCost::diagonal(&[1.0, 0.5], &[0.2]);
    let x0 = DVector::from_vec(vec![1.0, -0.5]);
    let horizon = 15;

    let around_x0 = LqProblem::from_lti(&model, &cost, &x0, horizon).unwrap();

    let mut rng = seeded_rng(9);
    let mut x_nom: Vec<DVector<f64>> = (0..=horizon)
        .map(|_| DVector::from_fn(2, |_, _| rng.gen_range(-2.0..2.0)))
        .collect();
    x_nom[0] = x0.clone();
    let u_nom: Vec<DVector<f64>> = (0..horizon)
        .map(|_| DVector::from_element(1, rng.gen_range(-1.0..1.0)))
        .collect();
    let around_random = LqProblem::from_lti_trajectory(&model, &cost, &x_nom, &u_nom).unwrap();

    for backend in [BackendKind::Riccati, BackendKind::InteriorPoint] {
        let (x_a, u_a, _) = solve_with(backend, &around_x0);
        let (x_b, u_b, _) = solve_with(backend, &around_random);
        for (a, b) in x_a.iter().zip(&x_b) {
            assert_relative_eq!(a, b, epsilon = 1e-5);
        }
        for (a, b) in u_a.iter().zip(&u_b) {
            assert_relative_eq!(a, b, epsilon = 1e-5);
        }
    }
}

#[test]
fn double_integrator_is_regulated_towards_origin() {
    let x0 = DVector::from_vec(vec![1.0, 0.0]);
    let problem = double_integrator_problem(&x0, 50);
    let (states, _, _) = solve_with(BackendKind::Riccati, &problem);
    assert!(states[50].norm() < 0.5 * x0.norm());
}

// ---------------------------------------------------------------------------
// Solver lifecycle
// ---------------------------------------------------------------------------

#[test]
fn repeated_solves_reuse_memory() {
    let mut solver = InteriorPointSolver::default();
    for seed in 0..4 {
        solver.set_problem(&random_lq_problem(3, 1, 7, seed)).unwrap();
        solver.solve().unwrap();
        assert_eq!(solver.solution_control().unwrap().len(), 7);
    }
    assert_eq!(solver.transcriber().unwrap().allocation_count(), 1);
}

#[test]
fn getters_are_idempotent() {
    let mut solver = RiccatiSolver::default();
    solver.set_problem(&random_lq_problem(2, 1, 5, 8)).unwrap();
    solver.solve().unwrap();
    assert_eq!(solver.solution_state().unwrap(), solver.solution_state().unwrap());
    assert_eq!(solver.solution_control().unwrap(), solver.solution_control().unwrap());
}

#[test]
fn lifecycle_errors() {
    let mut solver = InteriorPointSolver::default();
    assert_eq!(solver.solve().unwrap_err(), SolverError::NoProblem);
    assert_eq!(solver.solution_control().unwrap_err(), SolverError::NoSolution);
    assert_eq!(solver.feedback().unwrap_err(), UnsupportedOperation::FeedbackGains);
}
