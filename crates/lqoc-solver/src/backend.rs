//! Interface between the transcribed QP and a structured QP solver.

use nalgebra::DVector;

use lqoc_core::config::IpmArgs;
use lqoc_core::error::SolverError;

use crate::layout::StageDims;
use crate::transcriber::TranscribedQp;

/// Termination status of a backend solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    Solved,
    /// Converged to reduced accuracy.
    AlmostSolved,
    MaxIterations,
    Infeasible,
    NumericalError,
}

impl BackendStatus {
    pub const fn is_converged(self) -> bool {
        matches!(self, Self::Solved | Self::AlmostSolved)
    }
}

/// Outcome of one backend solve. The stage solution itself stays with the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackendReport {
    pub status: BackendStatus,
    pub iterations: u32,
    /// QP objective at the returned iterate.
    pub objective: f64,
    /// Wall-clock solve time in microseconds.
    pub solve_time_us: u64,
}

/// Per-stage primal and dual values, sized by the QP's [`StageDims`].
///
/// `x[0]` and `u[N]` are empty since the initial state is fixed and the
/// last stage has no control. The multiplier arrays follow `nb`/`ng`.
#[derive(Debug, Clone, PartialEq)]
pub struct OcpQpSolution {
    pub x: Vec<DVector<f64>>,
    pub u: Vec<DVector<f64>>,
    /// Dynamics co-states π_0 .. π_{N-1}, one per transition.
    pub pi: Vec<DVector<f64>>,
    pub lam_lb: Vec<DVector<f64>>,
    pub lam_ub: Vec<DVector<f64>>,
    pub lam_lg: Vec<DVector<f64>>,
    pub lam_ug: Vec<DVector<f64>>,
}

impl OcpQpSolution {
    pub fn zeros(dims: &StageDims) -> Self {
        let per_stage = |sizes: &[usize]| -> Vec<DVector<f64>> {
            sizes.iter().map(|&n| DVector::zeros(n)).collect()
        };
        Self {
            x: per_stage(&dims.nx),
            u: per_stage(&dims.nu),
            pi: per_stage(&dims.nx[1..]),
            lam_lb: per_stage(&dims.nb),
            lam_ub: per_stage(&dims.nb),
            lam_lg: per_stage(&dims.ng),
            lam_ug: per_stage(&dims.ng),
        }
    }

    /// Number of f64 slots a solution for `dims` occupies.
    pub fn mem_size(dims: &StageDims) -> usize {
        dims.num_variables() + dims.num_equalities() + dims.num_inequalities()
    }

    /// Number of f64 slots actually held.
    pub fn mem_len(&self) -> usize {
        [&self.x, &self.u, &self.pi, &self.lam_lb, &self.lam_ub, &self.lam_lg, &self.lam_ug]
            .iter()
            .flat_map(|stages| stages.iter())
            .map(DVector::len)
            .sum()
    }

    /// Whether this solution is laid out for `dims`.
    pub fn fits(&self, dims: &StageDims) -> bool {
        let same = |v: &[DVector<f64>], sizes: &[usize]| {
            v.len() == sizes.len() && v.iter().zip(sizes).all(|(v, &n)| v.len() == n)
        };
        same(&self.x, &dims.nx) && same(&self.u, &dims.nu) && same(&self.pi, &dims.nx[1..])
    }
}

/// A solver for stage-structured QPs.
///
/// The call order is: size query, `create` for a layout, then any number
/// of `solve` calls on QPs with that layout. A layout change requires a
/// new `create`.
pub trait OcpQpBackend {
    /// Short name used in errors and logs.
    fn name(&self) -> &'static str;

    /// f64 slots needed for the solution and workspace of a QP with `dims`.
    fn mem_size(&self, dims: &StageDims) -> usize;

    /// Allocate solution and workspace memory for `dims`.
    fn create(&mut self, dims: &StageDims);

    /// Solve `qp`, which must have the layout passed to the last `create`.
    fn solve(&mut self, qp: &TranscribedQp, args: &IpmArgs) -> Result<BackendReport, SolverError>;

    /// Solution of the last solve, `None` before `create`.
    fn solution(&self) -> Option<&OcpQpSolution>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solution_sized_by_stage_dims() {
        let dims = StageDims::for_horizon(3, 4, 2);
        let sol = OcpQpSolution::zeros(&dims);
        assert_eq!(sol.x.len(), 4);
        assert_eq!(sol.x[0].len(), 0);
        assert_eq!(sol.x[3].len(), 4);
        assert_eq!(sol.u.len(), 4);
        assert_eq!(sol.u[3].len(), 0);
        assert_eq!(sol.pi.len(), 3);
        assert!(sol.lam_lb.iter().all(|l| l.is_empty()));
        assert!(sol.fits(&dims));
        assert!(!sol.fits(&StageDims::for_horizon(4, 4, 2)));
        assert_eq!(OcpQpSolution::mem_size(&dims), 18 + 12);
    }

    #[test]
    fn held_slots_match_size_query() {
        for (n, m, big_n) in [(1, 1, 1), (4, 2, 3), (6, 3, 10)] {
            let dims = StageDims::for_horizon(big_n, n, m);
            assert_eq!(OcpQpSolution::zeros(&dims).mem_len(), OcpQpSolution::mem_size(&dims));
        }
    }

    #[test]
    fn converged_statuses() {
        assert!(BackendStatus::Solved.is_converged());
        assert!(BackendStatus::AlmostSolved.is_converged());
        assert!(!BackendStatus::MaxIterations.is_converged());
        assert!(!BackendStatus::Infeasible.is_converged());
        assert!(!BackendStatus::NumericalError.is_converged());
    }
}
