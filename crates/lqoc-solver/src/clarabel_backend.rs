//! Interior-point backend built on Clarabel (pure Rust conic solver).
//!
//! # QP Formulation
//!
//! Decision variables are ordered stage by stage: z = [u_0, x_0, u_1, x_1, …, u_N, x_N]
//! where x_0 and u_N are empty.
//!
//! Cost: ½ zᵀ H z + hᵀ z with per-stage Hessian blocks [[R_k, S_k], [S_kᵀ, Q_k]]
//! and gradient blocks [r̃_k, q̃_k].
//!
//! Subject to the dynamics as equalities (zero cone):
//! x_{k+1} − A_k x_k − B_k u_k = b̃_k
//!
//! Co-states are the negated equality duals, π_k = −z_k.

use std::time::Instant;

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettings, DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
    SupportedConeT::ZeroConeT,
};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

use lqoc_core::config::IpmArgs;
use lqoc_core::error::SolverError;

use crate::backend::{BackendReport, BackendStatus, OcpQpBackend, OcpQpSolution};
use crate::layout::StageDims;
use crate::transcriber::TranscribedQp;

/// Smallest duality-gap tolerance passed to Clarabel.
const MIN_GAP_TOL: f64 = 1e-8;

/// Entries below this magnitude are left out of the sparse matrices.
const SPARSITY_EPS: f64 = 1e-15;

/// Structured QP backend solving the full stage-ordered QP with Clarabel.
#[derive(Debug, Default)]
pub struct ClarabelBackend {
    solution: Option<OcpQpSolution>,
}

impl ClarabelBackend {
    pub const fn new() -> Self {
        Self { solution: None }
    }
}

/// Column offsets `(u_k, x_k)` of every stage in the stacked variable vector.
fn stage_offsets(dims: &StageDims) -> Vec<(usize, usize)> {
    let mut offset = 0;
    dims.nu
        .iter()
        .zip(&dims.nx)
        .map(|(&nu, &nx)| {
            let u_off = offset;
            let x_off = u_off + nu;
            offset = x_off + nx;
            (u_off, x_off)
        })
        .collect()
}

/// Build the cost Hessian H (full symmetric) and gradient h.
fn build_cost(qp: &TranscribedQp, offsets: &[(usize, usize)], n_z: usize) -> (DMatrix<f64>, DVector<f64>) {
    let mut h_mat = DMatrix::zeros(n_z, n_z);
    let mut h_vec = DVector::zeros(n_z);

    for (k, &(u_off, x_off)) in offsets.iter().enumerate() {
        let (nu, nx) = qp.s.shape(k);

        h_mat.view_mut((u_off, u_off), (nu, nu)).copy_from(&qp.r.view(k));
        h_mat.view_mut((x_off, x_off), (nx, nx)).copy_from(&qp.q.view(k));
        h_mat.view_mut((u_off, x_off), (nu, nx)).copy_from(&qp.s.view(k));
        h_mat
            .view_mut((x_off, u_off), (nx, nu))
            .copy_from(&qp.s.view(k).transpose());

        h_vec.rows_mut(u_off, nu).copy_from(&qp.r_vec.column_view(k));
        h_vec.rows_mut(x_off, nx).copy_from(&qp.q_vec.column_view(k));
    }

    (h_mat, h_vec)
}

/// Build the dynamics equality rows `[−B_k, I, −A_k]` and right-hand side b̃.
fn build_dynamics(qp: &TranscribedQp, offsets: &[(usize, usize)], n_z: usize) -> (DMatrix<f64>, DVector<f64>) {
    let dims = qp.dims();
    let n_eq = dims.num_equalities();
    let mut a_all = DMatrix::zeros(n_eq, n_z);
    let mut b_all = DVector::zeros(n_eq);

    let mut row = 0;
    for k in 0..dims.horizon() {
        let (u_off, x_off) = offsets[k];
        let (_, x_next_off) = offsets[k + 1];
        let n_rows = dims.nx[k + 1];

        // I * x_{k+1}
        for i in 0..n_rows {
            a_all[(row + i, x_next_off + i)] = 1.0;
        }
        // -A_k * x_k, -B_k * u_k
        a_all
            .view_mut((row, x_off), (n_rows, dims.nx[k]))
            .copy_from(&(-qp.a.view(k)));
        a_all
            .view_mut((row, u_off), (n_rows, dims.nu[k]))
            .copy_from(&(-qp.b.view(k)));

        b_all.rows_mut(row, n_rows).copy_from(&qp.b_vec.column_view(k));
        row += n_rows;
    }

    (a_all, b_all)
}

/// Map the interior-point arguments onto Clarabel settings.
///
/// The gap tolerances are clamped at [`MIN_GAP_TOL`]. Clarabel starts from
/// its own barrier parameter, so `mu0` is only logged.
fn clarabel_settings(args: &IpmArgs) -> Result<DefaultSettings<f64>, SolverError> {
    debug!(mu0 = args.mu0, "initial barrier parameter not used by clarabel");
    let tol = args.mu_max.max(MIN_GAP_TOL);
    DefaultSettingsBuilder::default()
        .max_iter(args.iter_max)
        .min_terminate_step_length(args.alpha_min)
        .verbose(false)
        .tol_gap_abs(tol)
        .tol_gap_rel(tol)
        .build()
        .map_err(|e| SolverError::Settings(e.to_string()))
}

fn map_status(status: SolverStatus) -> BackendStatus {
    match status {
        SolverStatus::Solved => BackendStatus::Solved,
        SolverStatus::AlmostSolved => BackendStatus::AlmostSolved,
        SolverStatus::MaxIterations | SolverStatus::MaxTime => BackendStatus::MaxIterations,
        SolverStatus::PrimalInfeasible
        | SolverStatus::DualInfeasible
        | SolverStatus::AlmostPrimalInfeasible
        | SolverStatus::AlmostDualInfeasible => BackendStatus::Infeasible,
        _ => BackendStatus::NumericalError,
    }
}

impl OcpQpBackend for ClarabelBackend {
    fn name(&self) -> &'static str {
        "clarabel"
    }

    fn mem_size(&self, dims: &StageDims) -> usize {
        // Dense cost and constraint matrices plus the stage solution.
        let n_z = dims.num_variables();
        let n_eq = dims.num_equalities();
        OcpQpSolution::mem_size(dims) + n_z * n_z + n_eq * n_z + n_z + n_eq
    }

    fn create(&mut self, dims: &StageDims) {
        let mem_size = self.mem_size(dims);
        debug!(backend = self.name(), mem_size, "creating backend memory");
        let solution = OcpQpSolution::zeros(dims);
        // The dense QP is assembled per solve; only the stage solution persists.
        debug_assert_eq!(solution.mem_len(), OcpQpSolution::mem_size(dims));
        debug_assert!(solution.mem_len() <= mem_size);
        self.solution = Some(solution);
    }

    fn solve(&mut self, qp: &TranscribedQp, args: &IpmArgs) -> Result<BackendReport, SolverError> {
        let start = Instant::now();
        let name = self.name();
        let dims = qp.dims();

        let solution = self
            .solution
            .as_mut()
            .filter(|sol| sol.fits(dims))
            .ok_or(SolverError::NotCreated { backend: name })?;

        let n_ineq = dims.num_inequalities();
        if n_ineq > 0 {
            return Err(SolverError::UnsupportedConstraints {
                backend: name,
                count: n_ineq,
            });
        }

        // 1. Assemble the stacked QP
        let offsets = stage_offsets(dims);
        let n_z = dims.num_variables();
        let (h_mat, h_vec) = build_cost(qp, &offsets, n_z);
        let (a_all, b_all) = build_dynamics(qp, &offsets, n_z);

        // 2. Convert to Clarabel format
        let p_csc = dmatrix_to_csc_upper_tri(&h_mat);
        let a_csc = dmatrix_to_csc(&a_all);
        let cones = vec![ZeroConeT(b_all.len())];

        // 3. Settings
        let settings = clarabel_settings(args)?;

        // 4. Solve
        let q_slice: Vec<f64> = h_vec.iter().copied().collect();
        let b_slice: Vec<f64> = b_all.iter().copied().collect();
        let mut solver = DefaultSolver::new(&p_csc, &q_slice, &a_csc, &b_slice, &cones, settings)
            .map_err(|e| SolverError::Setup {
                backend: name,
                message: format!("{e:?}"),
            })?;
        solver.solve();
        let sol = &solver.solution;

        // 5. Scatter back into stages
        for (k, &(u_off, x_off)) in offsets.iter().enumerate() {
            let nu = dims.nu[k];
            let nx = dims.nx[k];
            solution.u[k].copy_from_slice(&sol.x[u_off..u_off + nu]);
            solution.x[k].copy_from_slice(&sol.x[x_off..x_off + nx]);
        }
        let mut row = 0;
        for pi in &mut solution.pi {
            let n_rows = pi.len();
            for (i, value) in pi.iter_mut().enumerate() {
                *value = -sol.z[row + i];
            }
            row += n_rows;
        }

        let elapsed = start.elapsed();

        Ok(BackendReport {
            status: map_status(sol.status),
            iterations: sol.iterations,
            objective: sol.obj_val,
            solve_time_us: u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
        })
    }

    fn solution(&self) -> Option<&OcpQpSolution> {
        self.solution.as_ref()
    }
}

/// Convert a nalgebra `DMatrix<f64>` to a Clarabel `CscMatrix<f64>` (full matrix).
fn dmatrix_to_csc(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..nrows {
            let v = m[(i, j)];
            if v.abs() > SPARSITY_EPS {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

/// Convert a symmetric nalgebra `DMatrix<f64>` to upper-triangular `CscMatrix<f64>`.
fn dmatrix_to_csc_upper_tri(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..=j.min(nrows.saturating_sub(1)) {
            let v = m[(i, j)];
            if v.abs() > SPARSITY_EPS {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::LqProblem;
    use crate::transcriber::QpTranscriber;
    use approx::assert_relative_eq;

    /// One state, one control, one stage: x_1 = u_0 + 0.5.
    fn scalar_qp() -> QpTranscriber {
        let mut p = LqProblem::zeros(1, 1, 1).unwrap();
        p.r_mat[0][(0, 0)] = 1.0;
        p.r_vec[0][0] = 0.1;
        p.b_mat[0][(0, 0)] = 1.0;
        p.b_vec[0][0] = 0.5;
        p.q_mat[1][(0, 0)] = 2.0;
        p.q_vec[1][0] = -0.3;

        let mut t = QpTranscriber::new(1, 1);
        t.resize(1).unwrap();
        t.transcribe(&p).unwrap();
        t
    }

    #[test]
    fn stage_offsets_interleave_controls_and_states() {
        let dims = StageDims::for_horizon(2, 3, 1);
        assert_eq!(stage_offsets(&dims), vec![(0, 1), (1, 2), (5, 5)]);
    }

    #[test]
    fn dynamics_rows_have_identity_on_next_state() {
        let mut p = LqProblem::zeros(2, 1, 2).unwrap();
        p.a_mat[1] = DMatrix::from_row_slice(2, 2, &[1.0, 0.1, 0.0, 1.0]);
        p.b_mat[0] = DMatrix::from_row_slice(2, 1, &[0.0, 1.0]);
        p.b_mat[1] = DMatrix::from_row_slice(2, 1, &[0.0, 1.0]);
        let mut t = QpTranscriber::new(2, 1);
        t.resize(2).unwrap();
        let qp = t.transcribe(&p).unwrap();

        let offsets = stage_offsets(qp.dims());
        let (a_all, _) = build_dynamics(qp, &offsets, qp.dims().num_variables());
        // z = [u0, u1, x1(2), x2(2)]
        assert_eq!(a_all.shape(), (4, 6));
        assert_relative_eq!(a_all[(0, 2)], 1.0);
        assert_relative_eq!(a_all[(1, 0)], -1.0);
        assert_relative_eq!(a_all[(2, 4)], 1.0);
        assert_relative_eq!(a_all[(2, 3)], -0.1);
        assert_relative_eq!(a_all[(3, 1)], -1.0);
    }

    #[test]
    fn upper_tri_csc_drops_lower_entries() {
        let m = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 3.0]);
        let csc = dmatrix_to_csc_upper_tri(&m);
        assert_eq!(csc.colptr, vec![0, 1, 3]);
        assert_eq!(csc.rowval, vec![0, 0, 1]);
        assert_eq!(csc.nzval, vec![2.0, 1.0, 3.0]);
    }

    #[test]
    fn create_allocates_stage_solution() {
        let dims = StageDims::for_horizon(4, 3, 2);
        let mut backend = ClarabelBackend::new();
        backend.create(&dims);
        let held = backend.solution().unwrap().mem_len();
        assert_eq!(held, OcpQpSolution::mem_size(&dims));
        assert!(held < backend.mem_size(&dims));
    }

    #[test]
    fn solve_before_create_fails() {
        let t = scalar_qp();
        let mut backend = ClarabelBackend::new();
        let err = backend
            .solve(t.qp().unwrap(), &IpmArgs::default())
            .unwrap_err();
        assert_eq!(err, SolverError::NotCreated { backend: "clarabel" });
    }

    #[test]
    fn solve_with_other_layout_fails() {
        let t = scalar_qp();
        let mut backend = ClarabelBackend::new();
        backend.create(&StageDims::for_horizon(3, 1, 1));
        assert!(matches!(
            backend.solve(t.qp().unwrap(), &IpmArgs::default()),
            Err(SolverError::NotCreated { .. })
        ));
    }

    #[test]
    fn scalar_problem_matches_closed_form() {
        let t = scalar_qp();
        let qp = t.qp().unwrap();
        let mut backend = ClarabelBackend::new();
        backend.create(qp.dims());
        let report = backend.solve(qp, &IpmArgs::default()).unwrap();
        assert!(report.status.is_converged());

        // u = -(r + Q b + q) / (R + Q)
        let u = -(0.1 + 2.0 * 0.5 - 0.3) / 3.0;
        let x1 = u + 0.5;
        let sol = backend.solution().unwrap();
        assert_relative_eq!(sol.u[0][0], u, epsilon = 1e-6);
        assert_relative_eq!(sol.x[1][0], x1, epsilon = 1e-6);
        assert_relative_eq!(sol.pi[0][0], 2.0 * x1 - 0.3, epsilon = 1e-6);
        assert_relative_eq!(report.objective, qp.objective(sol), epsilon = 1e-6);
    }

    #[test]
    fn settings_carry_interior_point_arguments() {
        let args = IpmArgs {
            alpha_min: 1e-3,
            mu_max: 1e-6,
            iter_max: 7,
            mu0: 5.0,
        };
        let settings = clarabel_settings(&args).unwrap();
        assert_eq!(settings.max_iter, 7);
        assert_relative_eq!(settings.min_terminate_step_length, 1e-3);
        assert_relative_eq!(settings.tol_gap_abs, 1e-6);
        assert_relative_eq!(settings.tol_gap_rel, 1e-6);
        assert!(!settings.verbose);
    }

    #[test]
    fn gap_tolerance_is_clamped() {
        let settings = clarabel_settings(&IpmArgs::default()).unwrap();
        assert_relative_eq!(settings.tol_gap_abs, MIN_GAP_TOL);
        assert_relative_eq!(settings.tol_gap_rel, MIN_GAP_TOL);
        assert_relative_eq!(settings.min_terminate_step_length, 1e-8);
        assert_eq!(settings.max_iter, 20);
    }
}
