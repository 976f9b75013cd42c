//! Finite-horizon LQ optimal-control problem around a nominal trajectory.
//!
//! Everything is expressed in *local* coordinates, i.e. as deviations
//! `δx_k = x_k − x̄_k`, `δu_k = u_k − ū_k` from the nominal trajectory
//! `(x̄, ū)` stored in the problem:
//!
//! ```text
//! δx_{k+1} = A_k δx_k + B_k δu_k + b_k                         k = 0..N-1
//! ℓ_k      = ½ δxᵀ Q_k δx + ½ δuᵀ R_k δu + δuᵀ P_k δx + q_kᵀ δx + r_kᵀ δu
//! ℓ_N      = ½ δxᵀ Q_N δx + q_Nᵀ δx
//! ```
//!
//! Stage 0's state is the fixed initial condition; stage N has no control.

use nalgebra::{DMatrix, DVector};

use lqoc_core::error::{LqocError, ModelError, ProblemError};
use lqoc_core::state_space::StateSpaceModel;
use lqoc_core::types::{
    ControlMatrixArray, ControlVectorArray, FeedbackArray, StateControlMatrixArray,
    StateMatrixArray, StateVectorArray,
};

/// Time-invariant quadratic cost `½ xᵀ Q x + ½ uᵀ R u`, terminal `½ xᵀ Q_f x`.
#[derive(Clone, Debug)]
pub struct LqCost {
    pub q: DMatrix<f64>,
    pub r: DMatrix<f64>,
    pub q_final: DMatrix<f64>,
}

impl LqCost {
    /// Diagonal weights, terminal weight equal to the stage weight.
    pub fn diagonal(q_weights: &[f64], r_weights: &[f64]) -> Self {
        let q = DMatrix::from_diagonal(&DVector::from_column_slice(q_weights));
        let r = DMatrix::from_diagonal(&DVector::from_column_slice(r_weights));
        Self {
            q_final: q.clone(),
            q,
            r,
        }
    }
}

/// Time-varying LQ problem over N stages.
///
/// The arrays are public so an outer optimization loop can refill them in
/// place every iteration; [`LqProblem::validate`] checks that lengths and
/// block shapes still match the dimensions fixed at construction.
#[derive(Clone, Debug)]
pub struct LqProblem {
    state_dim: usize,
    control_dim: usize,
    horizon: usize,

    /// Nominal states x̄_0 ..= x̄_N (N+1). `x[0]` is the fixed initial state.
    pub x: StateVectorArray,
    /// Nominal controls ū_0 .. ū_{N-1} (N).
    pub u: ControlVectorArray,

    /// Dynamics state sensitivities A_k (N, n×n).
    pub a_mat: StateMatrixArray,
    /// Dynamics control sensitivities B_k (N, n×m).
    pub b_mat: StateControlMatrixArray,
    /// Affine dynamics residuals b_k (N, n).
    pub b_vec: StateVectorArray,

    /// State cost Hessians Q_k (N+1, n×n).
    pub q_mat: StateMatrixArray,
    /// State cost gradients q_k (N+1, n).
    pub q_vec: StateVectorArray,
    /// Control cost Hessians R_k (N, m×m).
    pub r_mat: ControlMatrixArray,
    /// Control cost gradients r_k (N, m).
    pub r_vec: ControlVectorArray,
    /// Control/state cross terms P_k (N, m×n).
    pub p_mat: FeedbackArray,
}

impl LqProblem {
    /// Correctly sized problem with every block zero.
    pub fn zeros(state_dim: usize, control_dim: usize, horizon: usize) -> Result<Self, ProblemError> {
        if horizon == 0 {
            return Err(ProblemError::EmptyHorizon);
        }
        if state_dim == 0 || control_dim == 0 {
            return Err(ProblemError::EmptyDimension {
                state_dim,
                control_dim,
            });
        }
        let n = state_dim;
        let m = control_dim;
        Ok(Self {
            state_dim,
            control_dim,
            horizon,
            x: vec![DVector::zeros(n); horizon + 1],
            u: vec![DVector::zeros(m); horizon],
            a_mat: vec![DMatrix::zeros(n, n); horizon],
            b_mat: vec![DMatrix::zeros(n, m); horizon],
            b_vec: vec![DVector::zeros(n); horizon],
            q_mat: vec![DMatrix::zeros(n, n); horizon + 1],
            q_vec: vec![DVector::zeros(n); horizon + 1],
            r_mat: vec![DMatrix::zeros(m, m); horizon],
            r_vec: vec![DVector::zeros(m); horizon],
            p_mat: vec![DMatrix::zeros(m, n); horizon],
        })
    }

    /// Linearize a discrete-time LTI model with a quadratic cost around a nominal trajectory.
    ///
    /// `x_nom` has N+1 entries (its first entry becomes the fixed initial
    /// state), `u_nom` has N. The residual `b_k = A x̄_k + B ū_k − x̄_{k+1}`
    /// absorbs any dynamic infeasibility of the nominal trajectory, and the
    /// cost gradients are those of the absolute cost evaluated at the nominal.
    pub fn from_lti_trajectory(
        model: &StateSpaceModel,
        cost: &LqCost,
        x_nom: &[DVector<f64>],
        u_nom: &[DVector<f64>],
    ) -> Result<Self, LqocError> {
        if !model.time_type().is_discrete() {
            return Err(ModelError::RequiresDiscreteTime.into());
        }
        let n = model.state_dim();
        let m = model.control_dim();
        let horizon = u_nom.len();
        let mut problem = Self::zeros(n, m, horizon)?;

        if x_nom.len() != horizon + 1 {
            return Err(ProblemError::StageCount {
                name: "x",
                expected: horizon + 1,
                got: x_nom.len(),
            }
            .into());
        }
        check_block("q", 0, &cost.q, (n, n))?;
        check_block("r", 0, &cost.r, (m, m))?;
        check_block("q_final", 0, &cost.q_final, (n, n))?;

        problem.x = x_nom.to_vec();
        problem.u = u_nom.to_vec();
        problem.validate()?;

        for k in 0..horizon {
            problem.a_mat[k].copy_from(model.a());
            problem.b_mat[k].copy_from(model.b());
            problem.b_vec[k] = model.a() * &x_nom[k] + model.b() * &u_nom[k] - &x_nom[k + 1];
            problem.q_mat[k].copy_from(&cost.q);
            problem.q_vec[k] = &cost.q * &x_nom[k];
            problem.r_mat[k].copy_from(&cost.r);
            problem.r_vec[k] = &cost.r * &u_nom[k];
        }
        problem.q_mat[horizon].copy_from(&cost.q_final);
        problem.q_vec[horizon] = &cost.q_final * &x_nom[horizon];

        Ok(problem)
    }

    /// [`from_lti_trajectory`](Self::from_lti_trajectory) around the constant nominal `(x0, 0)`.
    pub fn from_lti(
        model: &StateSpaceModel,
        cost: &LqCost,
        x0: &DVector<f64>,
        horizon: usize,
    ) -> Result<Self, LqocError> {
        let x_nom = vec![x0.clone(); horizon + 1];
        let u_nom = vec![DVector::zeros(model.control_dim()); horizon];
        Self::from_lti_trajectory(model, cost, &x_nom, &u_nom)
    }

    /// Number of stages N.
    pub const fn number_of_stages(&self) -> usize {
        self.horizon
    }

    pub const fn state_dim(&self) -> usize {
        self.state_dim
    }

    pub const fn control_dim(&self) -> usize {
        self.control_dim
    }

    /// Check every array length and block shape.
    pub fn validate(&self) -> Result<(), ProblemError> {
        let n = self.state_dim;
        let m = self.control_dim;
        let big_n = self.horizon;

        check_count("x", &self.x, big_n + 1)?;
        check_count("u", &self.u, big_n)?;
        check_count("a_mat", &self.a_mat, big_n)?;
        check_count("b_mat", &self.b_mat, big_n)?;
        check_count("b_vec", &self.b_vec, big_n)?;
        check_count("q_mat", &self.q_mat, big_n + 1)?;
        check_count("q_vec", &self.q_vec, big_n + 1)?;
        check_count("r_mat", &self.r_mat, big_n)?;
        check_count("r_vec", &self.r_vec, big_n)?;
        check_count("p_mat", &self.p_mat, big_n)?;

        for k in 0..=big_n {
            check_block("x", k, &self.x[k], (n, 1))?;
            check_block("q_mat", k, &self.q_mat[k], (n, n))?;
            check_block("q_vec", k, &self.q_vec[k], (n, 1))?;
        }
        for k in 0..big_n {
            check_block("u", k, &self.u[k], (m, 1))?;
            check_block("a_mat", k, &self.a_mat[k], (n, n))?;
            check_block("b_mat", k, &self.b_mat[k], (n, m))?;
            check_block("b_vec", k, &self.b_vec[k], (n, 1))?;
            check_block("r_mat", k, &self.r_mat[k], (m, m))?;
            check_block("r_vec", k, &self.r_vec[k], (m, 1))?;
            check_block("p_mat", k, &self.p_mat[k], (m, n))?;
        }
        Ok(())
    }

    /// Local quadratic cost of an absolute trajectory `(x, u)`.
    pub fn evaluate_cost(&self, x: &[DVector<f64>], u: &[DVector<f64>]) -> Result<f64, ProblemError> {
        check_count("x", x, self.horizon + 1)?;
        check_count("u", u, self.horizon)?;

        let mut total = 0.0;
        for k in 0..self.horizon {
            let dx = &x[k] - &self.x[k];
            let du = &u[k] - &self.u[k];
            total += 0.5 * dx.dot(&(&self.q_mat[k] * &dx))
                + 0.5 * du.dot(&(&self.r_mat[k] * &du))
                + du.dot(&(&self.p_mat[k] * &dx))
                + self.q_vec[k].dot(&dx)
                + self.r_vec[k].dot(&du);
        }
        let dx = &x[self.horizon] - &self.x[self.horizon];
        total += 0.5 * dx.dot(&(&self.q_mat[self.horizon] * &dx)) + self.q_vec[self.horizon].dot(&dx);
        Ok(total)
    }

    /// Residual of the local dynamics for an absolute trajectory, one entry per stage transition.
    pub fn dynamics_defect(
        &self,
        x: &[DVector<f64>],
        u: &[DVector<f64>],
    ) -> Result<StateVectorArray, ProblemError> {
        check_count("x", x, self.horizon + 1)?;
        check_count("u", u, self.horizon)?;

        Ok((0..self.horizon)
            .map(|k| {
                let dx = &x[k] - &self.x[k];
                let du = &u[k] - &self.u[k];
                let dx_next = &x[k + 1] - &self.x[k + 1];
                dx_next - (&self.a_mat[k] * dx + &self.b_mat[k] * du + &self.b_vec[k])
            })
            .collect())
    }
}

fn check_count<T>(name: &'static str, items: &[T], expected: usize) -> Result<(), ProblemError> {
    if items.len() == expected {
        Ok(())
    } else {
        Err(ProblemError::StageCount {
            name,
            expected,
            got: items.len(),
        })
    }
}

fn check_block<R, C, S>(
    name: &'static str,
    stage: usize,
    block: &nalgebra::Matrix<f64, R, C, S>,
    expected: (usize, usize),
) -> Result<(), ProblemError>
where
    R: nalgebra::Dim,
    C: nalgebra::Dim,
    S: nalgebra::RawStorage<f64, R, C>,
{
    if block.shape() == expected {
        Ok(())
    } else {
        Err(ProblemError::BlockShape {
            name,
            stage,
            expected,
            got: block.shape(),
        })
    }
}
