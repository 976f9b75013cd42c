//! Re-centering of a local LQ problem into an absolute, stage-structured QP.
//!
//! The QP is stated in absolute coordinates `(x_k, u_k)` with the fixed
//! initial state removed from the decision variables:
//!
//! ```text
//! min  Σ_k ½ xᵀQ_k x + ½ uᵀR_k u + uᵀS_k x + q̃_kᵀx + r̃_kᵀu
//! s.t. x_{k+1} = A_k x_k + B_k u_k + b̃_k
//! ```
//!
//! Interior stages shift the affine terms by the nominal trajectory
//! `(x̄, ū)` stored in the problem:
//!
//! ```text
//! b̃_k = b_k + x̄_{k+1} − A_k x̄_k − B_k ū_k
//! q̃_k = q_k − Q_k x̄_k − P_kᵀ ū_k
//! r̃_k = r_k − R_k ū_k − P_k x̄_k
//! ```
//!
//! Stage 0 has no state variable, so `A_0 x̄_0` drops out of b̃_0 and the
//! `P_0 x̄_0` contribution is added back into r̃_0. The last stage keeps
//! only `q̃_N = q_N − Q_N x̄_N`.

use nalgebra::DVector;
use tracing::debug;

use lqoc_core::error::{ProblemError, TranscriptionError};

use crate::backend::OcpQpSolution;
use crate::layout::{BlockArena, StageDims};
use crate::problem::LqProblem;

/// Inequality descriptor arenas. Every stage is sized by `nb`/`ng`, which
/// are zero, so these carry no data yet.
#[derive(Clone, Debug)]
pub struct ConstraintArenas {
    /// Indices of box-bounded variables per stage.
    pub idxb: Vec<Vec<usize>>,
    pub d_lb: BlockArena,
    pub d_ub: BlockArena,
    pub c: BlockArena,
    pub d: BlockArena,
    pub d_lg: BlockArena,
    pub d_ug: BlockArena,
}

/// Absolute-coordinate QP blocks laid out stage by stage.
#[derive(Clone, Debug)]
pub struct TranscribedQp {
    dims: StageDims,
    x0: DVector<f64>,

    pub a: BlockArena,
    pub b: BlockArena,
    pub b_vec: BlockArena,
    pub q: BlockArena,
    pub s: BlockArena,
    pub r: BlockArena,
    pub q_vec: BlockArena,
    pub r_vec: BlockArena,
    pub constraints: ConstraintArenas,
}

impl TranscribedQp {
    fn zeros(dims: StageDims, state_dim: usize) -> Self {
        let shapes = dims.shapes();
        let constraints = ConstraintArenas {
            idxb: dims.nb.iter().map(|&nb| vec![0; nb]).collect(),
            d_lb: BlockArena::new(shapes.d_lb),
            d_ub: BlockArena::new(shapes.d_ub),
            c: BlockArena::new(shapes.c),
            d: BlockArena::new(shapes.d),
            d_lg: BlockArena::new(shapes.d_lg),
            d_ug: BlockArena::new(shapes.d_ug),
        };
        Self {
            x0: DVector::zeros(state_dim),
            a: BlockArena::new(shapes.a),
            b: BlockArena::new(shapes.b),
            b_vec: BlockArena::new(shapes.b_vec),
            q: BlockArena::new(shapes.q),
            s: BlockArena::new(shapes.s),
            r: BlockArena::new(shapes.r),
            q_vec: BlockArena::new(shapes.q_vec),
            r_vec: BlockArena::new(shapes.r_vec),
            constraints,
            dims,
        }
    }

    pub const fn dims(&self) -> &StageDims {
        &self.dims
    }

    /// Number of f64 slots actually held by the arenas.
    pub fn mem_len(&self) -> usize {
        let c = &self.constraints;
        [
            &self.a, &self.b, &self.b_vec, &self.q, &self.s, &self.r, &self.q_vec, &self.r_vec,
            &c.d_lb, &c.d_ub, &c.c, &c.d, &c.d_lg, &c.d_ug,
        ]
        .iter()
        .map(|arena| arena.as_slice().len())
        .sum()
    }

    /// Number of stages N.
    pub fn horizon(&self) -> usize {
        self.dims.horizon()
    }

    /// The fixed initial state. Not a decision variable.
    pub const fn x0(&self) -> &DVector<f64> {
        &self.x0
    }

    /// QP objective `Σ ½ xᵀQx + ½ uᵀRu + uᵀSx + q̃ᵀx + r̃ᵀu` at a stage solution.
    pub fn objective(&self, sol: &OcpQpSolution) -> f64 {
        (0..=self.horizon())
            .map(|k| {
                let x = &sol.x[k];
                let u = &sol.u[k];
                0.5 * x.dot(&(self.q.view(k) * x))
                    + 0.5 * u.dot(&(self.r.view(k) * u))
                    + u.dot(&(self.s.view(k) * x))
                    + self.q_vec.column_view(k).dot(x)
                    + self.r_vec.column_view(k).dot(u)
            })
            .sum()
    }
}

/// Lays out LQ problems of a fixed state/control size into reusable QP arenas.
#[derive(Debug)]
pub struct QpTranscriber {
    state_dim: usize,
    control_dim: usize,
    qp: Option<TranscribedQp>,
    allocation_count: usize,
}

impl QpTranscriber {
    pub const fn new(state_dim: usize, control_dim: usize) -> Self {
        Self {
            state_dim,
            control_dim,
            qp: None,
            allocation_count: 0,
        }
    }

    pub const fn state_dim(&self) -> usize {
        self.state_dim
    }

    pub const fn control_dim(&self) -> usize {
        self.control_dim
    }

    /// Configured horizon, `None` before the first [`resize`](Self::resize).
    pub fn horizon(&self) -> Option<usize> {
        self.qp.as_ref().map(TranscribedQp::horizon)
    }

    /// How many times the arenas have been (re)allocated.
    pub const fn allocation_count(&self) -> usize {
        self.allocation_count
    }

    /// Set the horizon, reallocating every arena if it changed.
    ///
    /// Returns `true` when a reallocation happened. Calling this with the
    /// current horizon leaves every buffer in place.
    pub fn resize(&mut self, horizon: usize) -> Result<bool, ProblemError> {
        if horizon == 0 {
            return Err(ProblemError::EmptyHorizon);
        }
        if self.horizon() == Some(horizon) {
            return Ok(false);
        }

        let dims = StageDims::for_horizon(horizon, self.state_dim, self.control_dim);
        let mem_size = dims.mem_size();
        debug!(
            horizon,
            variables = dims.num_variables(),
            equalities = dims.num_equalities(),
            mem_size,
            "allocating QP arenas"
        );
        let qp = TranscribedQp::zeros(dims, self.state_dim);
        debug_assert_eq!(qp.mem_len(), mem_size);
        self.qp = Some(qp);
        self.allocation_count += 1;
        Ok(true)
    }

    /// The most recently transcribed QP, `None` before the first resize.
    pub const fn qp(&self) -> Option<&TranscribedQp> {
        self.qp.as_ref()
    }

    /// Re-center `problem` into absolute coordinates and write it into the arenas.
    pub fn transcribe(&mut self, problem: &LqProblem) -> Result<&TranscribedQp, TranscriptionError> {
        let (state_dim, control_dim) = (self.state_dim, self.control_dim);
        let qp = self.qp.as_mut().ok_or(TranscriptionError::HorizonNotSet)?;

        let big_n = qp.horizon();
        if problem.number_of_stages() != big_n {
            return Err(TranscriptionError::HorizonMismatch {
                expected: big_n,
                got: problem.number_of_stages(),
            });
        }
        if problem.state_dim() != state_dim || problem.control_dim() != control_dim {
            return Err(TranscriptionError::DimensionMismatch {
                state_dim,
                control_dim,
                got_state: problem.state_dim(),
                got_control: problem.control_dim(),
            });
        }
        problem.validate()?;

        let x = &problem.x;
        let u = &problem.u;
        qp.x0.copy_from(&x[0]);

        for k in 0..big_n {
            let a = &problem.a_mat[k];
            let b = &problem.b_mat[k];
            let p = &problem.p_mat[k];
            let r = &problem.r_mat[k];

            qp.b.set(k, b);
            qp.r.set(k, r);

            let r_tilde = &problem.r_vec[k] - r * &u[k] - p * &x[k];
            if k == 0 {
                let b_tilde = &problem.b_vec[0] + &x[1] - b * &u[0];
                qp.b_vec.set(0, &b_tilde);
                qp.r_vec.set(0, &(r_tilde + p * &x[0]));
            } else {
                let q = &problem.q_mat[k];
                let b_tilde = &problem.b_vec[k] + &x[k + 1] - a * &x[k] - b * &u[k];
                let q_tilde = &problem.q_vec[k] - q * &x[k] - p.transpose() * &u[k];

                qp.a.set(k, a);
                qp.q.set(k, q);
                qp.s.set(k, p);
                qp.b_vec.set(k, &b_tilde);
                qp.q_vec.set(k, &q_tilde);
                qp.r_vec.set(k, &r_tilde);
            }
        }

        let q_final = &problem.q_mat[big_n];
        qp.q.set(big_n, q_final);
        qp.q_vec
            .set(big_n, &(&problem.q_vec[big_n] - q_final * &x[big_n]));

        Ok(&*qp)
    }
}
