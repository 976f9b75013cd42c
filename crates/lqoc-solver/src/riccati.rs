//! Dense backward Riccati recursion for unconstrained stage-structured QPs.
//!
//! Backward pass, with primes denoting stage k+1:
//!
//! ```text
//! H = R + BᵀP'B        G = S + BᵀP'A        g = r̃ + Bᵀ(P'b̃ + p')
//! K = −H⁻¹G            k = −H⁻¹g
//! P = Q + AᵀP'A + GᵀK  p = q̃ + Aᵀ(P'b̃ + p') + Gᵀk
//! ```
//!
//! followed by a forward rollout `u_k = K_k x_k + k_k`. Stage 0 has an
//! empty state, so its gain has zero columns and `u_0 = k_0`.

use std::time::Instant;

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use lqoc_core::config::IpmArgs;
use lqoc_core::error::SolverError;

use crate::backend::{BackendReport, BackendStatus, OcpQpBackend, OcpQpSolution};
use crate::layout::StageDims;
use crate::transcriber::TranscribedQp;

/// Riccati backend. Ignores the interior-point arguments.
#[derive(Debug, Default)]
pub struct RiccatiBackend {
    solution: Option<OcpQpSolution>,
    /// Value function Hessians P_k (N+1).
    value_hessians: Vec<DMatrix<f64>>,
    /// Value function gradients p_k (N+1).
    value_gradients: Vec<DVector<f64>>,
    /// Feedback gains K_k (N).
    gains: Vec<DMatrix<f64>>,
    /// Feedforward terms k_k (N).
    feedforward: Vec<DVector<f64>>,
}

impl RiccatiBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of f64 slots held by the solution and the recursion workspace.
    pub fn mem_len(&self) -> usize {
        let matrices: usize = self
            .value_hessians
            .iter()
            .chain(&self.gains)
            .map(DMatrix::len)
            .sum();
        let vectors: usize = self
            .value_gradients
            .iter()
            .chain(&self.feedforward)
            .map(DVector::len)
            .sum();
        self.solution.as_ref().map_or(0, OcpQpSolution::mem_len) + matrices + vectors
    }

    /// Feedback gains of the last solve, one per stage transition.
    pub fn gains(&self) -> &[DMatrix<f64>] {
        &self.gains
    }
}

impl OcpQpBackend for RiccatiBackend {
    fn name(&self) -> &'static str {
        "riccati"
    }

    fn mem_size(&self, dims: &StageDims) -> usize {
        let value: usize = dims.nx.iter().map(|nx| nx * nx + nx).sum();
        let policy: usize = (0..dims.horizon())
            .map(|k| dims.nu[k] * dims.nx[k] + dims.nu[k])
            .sum();
        OcpQpSolution::mem_size(dims) + value + policy
    }

    fn create(&mut self, dims: &StageDims) {
        let mem_size = self.mem_size(dims);
        debug!(backend = self.name(), mem_size, "creating backend memory");
        let big_n = dims.horizon();
        self.solution = Some(OcpQpSolution::zeros(dims));
        self.value_hessians = dims.nx.iter().map(|&nx| DMatrix::zeros(nx, nx)).collect();
        self.value_gradients = dims.nx.iter().map(|&nx| DVector::zeros(nx)).collect();
        self.gains = (0..big_n)
            .map(|k| DMatrix::zeros(dims.nu[k], dims.nx[k]))
            .collect();
        self.feedforward = (0..big_n).map(|k| DVector::zeros(dims.nu[k])).collect();
        debug_assert_eq!(self.mem_len(), mem_size);
    }

    fn solve(&mut self, qp: &TranscribedQp, _args: &IpmArgs) -> Result<BackendReport, SolverError> {
        let start = Instant::now();
        let name = self.name();
        let dims = qp.dims();
        let big_n = dims.horizon();

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

        // Backward pass
        self.value_hessians[big_n].copy_from(&qp.q.view(big_n));
        self.value_gradients[big_n].copy_from(&qp.q_vec.column_view(big_n));

        for k in (0..big_n).rev() {
            let a = qp.a.view(k);
            let b = qp.b.view(k);
            let p_next = &self.value_hessians[k + 1];
            let w = p_next * qp.b_vec.column_view(k) + &self.value_gradients[k + 1];

            let pb = p_next * b;
            let pa = p_next * a;
            let h = qp.r.view(k) + b.transpose() * &pb;
            let g = qp.s.view(k) + pb.transpose() * a;
            let g_vec = qp.r_vec.column_view(k) + b.transpose() * &w;

            let chol = h
                .cholesky()
                .ok_or(SolverError::NotPositiveDefinite { stage: k })?;
            let gain = -chol.solve(&g);
            let ff = -chol.solve(&g_vec);

            let p_k = qp.q.view(k) + a.transpose() * &pa + g.transpose() * &gain;
            let p_vec_k = qp.q_vec.column_view(k) + a.transpose() * &w + g.transpose() * &ff;

            self.value_hessians[k] = 0.5 * (&p_k + p_k.transpose());
            self.value_gradients[k] = p_vec_k;
            self.gains[k] = gain;
            self.feedforward[k] = ff;
        }

        // Forward rollout from the empty stage-0 state
        let mut x = DVector::<f64>::zeros(dims.nx[0]);
        for k in 0..big_n {
            let u = &self.gains[k] * &x + &self.feedforward[k];
            let x_next = qp.a.view(k) * &x + qp.b.view(k) * &u + qp.b_vec.column_view(k);

            solution.pi[k] = &self.value_hessians[k + 1] * &x_next + &self.value_gradients[k + 1];
            solution.x[k] = x;
            solution.u[k] = u;
            x = x_next;
        }
        solution.x[big_n] = x;

        let elapsed = start.elapsed();

        Ok(BackendReport {
            status: BackendStatus::Solved,
            iterations: 1,
            objective: qp.objective(solution),
            solve_time_us: u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
        })
    }

    fn solution(&self) -> Option<&OcpQpSolution> {
        self.solution.as_ref()
    }
}
