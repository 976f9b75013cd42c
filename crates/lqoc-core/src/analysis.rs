//! Structural analysis of state-space models.
//!
//! Controllability and observability are decided by the rank of the
//! Kalman matrices, computed with a full-pivot LU factorization. The rank
//! test uses the usual threshold `ε · min(rows, cols) · |largest pivot|`,
//! so it becomes unreliable when the Kalman matrix is badly scaled, which
//! happens quickly as n grows (powers of A up to A^{n-1}). No attempt is
//! made to be more robust than that.
//!
//! Gramians are accumulated by the discrete-time fixed-point iteration
//!
//! ```text
//! W_c ← W_c + A^i B Bᵀ (A^i)ᵀ        W_o ← W_o + (A^i)ᵀ Cᵀ C A^i
//! ```
//!
//! and stop once the entrywise 1-norm of the increment drops below the
//! tolerance. The continuous-time case would need a Lyapunov solver and is
//! rejected with [`UnsupportedOperation::ContinuousGramian`].

use nalgebra::DMatrix;
use tracing::debug;

use crate::error::{GramianKind, UnsupportedOperation};
use crate::state_space::StateSpaceModel;

/// Stopping criteria for the Gramian fixed-point iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GramianOptions {
    /// Maximum number of accumulation steps.
    pub max_iters: usize,
    /// Threshold on the entrywise 1-norm of the last increment.
    pub tolerance: f64,
}

impl Default for GramianOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            tolerance: 1e-9,
        }
    }
}

/// Result of a Gramian computation.
///
/// Hitting `max_iters` is not an error: `converged` is false and the last
/// accumulated estimate is returned. Callers that care should inspect
/// `residual`.
#[derive(Debug, Clone)]
pub struct Gramian {
    /// The accumulated Gramian estimate.
    pub matrix: DMatrix<f64>,
    /// Number of accumulation steps whose increment was still above
    /// tolerance. The converging step is not counted, so on convergence this
    /// is `residual_history.len() - 1`; otherwise it equals `max_iters`.
    pub iterations: usize,
    /// Entrywise 1-norm of the last increment.
    pub residual: f64,
    /// Residual after every accumulation step, in order.
    pub residual_history: Vec<f64>,
    /// Whether `residual < tolerance` was reached.
    pub converged: bool,
}

/// Kalman controllability matrix `[B, AB, A²B, …, A^{n-1}B]` (n × n·m).
pub fn controllability_matrix(model: &StateSpaceModel) -> DMatrix<f64> {
    let n = model.state_dim();
    let m = model.control_dim();
    let mut co = DMatrix::zeros(n, n * m);

    co.view_mut((0, 0), (n, m)).copy_from(model.b());
    for i in 1..n {
        let next = model.a() * co.view((0, (i - 1) * m), (n, m));
        co.view_mut((0, i * m), (n, m)).copy_from(&next);
    }
    co
}

/// True iff the controllability matrix has full row rank n.
pub fn is_controllable(model: &StateSpaceModel) -> bool {
    full_piv_rank(&controllability_matrix(model)) == model.state_dim()
}

/// Kalman observability matrix `[C; CA; CA²; …; CA^{n-1}]` stacked by rows (n·n × n).
pub fn observability_matrix(model: &StateSpaceModel) -> DMatrix<f64> {
    let n = model.state_dim();
    let mut o = DMatrix::zeros(n * n, n);

    o.view_mut((0, 0), (n, n)).copy_from(model.c());
    for i in 1..n {
        let next = o.view(((i - 1) * n, 0), (n, n)) * model.a();
        o.view_mut((i * n, 0), (n, n)).copy_from(&next);
    }
    o
}

/// True iff the observability matrix has full column rank n.
pub fn is_observable(model: &StateSpaceModel) -> bool {
    full_piv_rank(&observability_matrix(model)) == model.state_dim()
}

/// Discrete-time controllability Gramian `Σ A^i B Bᵀ (A^i)ᵀ`.
pub fn controllability_gramian(
    model: &StateSpaceModel,
    options: GramianOptions,
) -> Result<Gramian, UnsupportedOperation> {
    if !model.time_type().is_discrete() {
        return Err(UnsupportedOperation::ContinuousGramian(
            GramianKind::Controllability,
        ));
    }
    let bbt = model.b() * model.b().transpose();
    Ok(accumulate(model.a(), options, |a_pow| {
        a_pow * &bbt * a_pow.transpose()
    }))
}

/// Discrete-time observability Gramian `Σ (A^i)ᵀ Cᵀ C A^i`.
pub fn observability_gramian(
    model: &StateSpaceModel,
    options: GramianOptions,
) -> Result<Gramian, UnsupportedOperation> {
    if !model.time_type().is_discrete() {
        return Err(UnsupportedOperation::ContinuousGramian(
            GramianKind::Observability,
        ));
    }
    let ctc = model.c().transpose() * model.c();
    Ok(accumulate(model.a(), options, |a_pow| {
        a_pow.transpose() * &ctc * a_pow
    }))
}

/// Run the fixed-point accumulation `W ← W + term(A^i)` with a running power of A.
fn accumulate(
    a: &DMatrix<f64>,
    options: GramianOptions,
    term: impl Fn(&DMatrix<f64>) -> DMatrix<f64>,
) -> Gramian {
    let n = a.nrows();
    let mut gramian = DMatrix::zeros(n, n);
    let mut a_pow = DMatrix::identity(n, n);
    let mut residual_history = Vec::new();
    let mut iterations = 0;
    let mut converged = false;

    while iterations < options.max_iters {
        let increment = term(&a_pow);
        let residual = increment.lp_norm(1);
        gramian += increment;
        residual_history.push(residual);

        if residual < options.tolerance {
            converged = true;
            break;
        }

        a_pow = &a_pow * a;
        iterations += 1;
    }

    let residual = residual_history.last().copied().unwrap_or(f64::INFINITY);
    if !converged {
        debug!(iterations, residual, "gramian iteration stopped at max_iters");
    }

    Gramian {
        matrix: gramian,
        iterations,
        residual,
        residual_history,
        converged,
    }
}

/// Numerical rank from a full-pivot LU factorization.
///
/// Counts pivots with `|U_ii| > ε · min(rows, cols) · |U_00|`; U_00 is the
/// largest pivot by construction.
pub fn full_piv_rank(m: &DMatrix<f64>) -> usize {
    let diag_size = m.nrows().min(m.ncols());
    if diag_size == 0 {
        return 0;
    }
    let lu = m.clone().full_piv_lu();
    let u = lu.u();
    let max_pivot = u[(0, 0)].abs();
    let threshold = f64::EPSILON * diag_size as f64 * max_pivot;
    (0..diag_size).filter(|&i| u[(i, i)].abs() > threshold).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimeType;
    use approx::assert_relative_eq;

    fn double_integrator(time_type: TimeType) -> StateSpaceModel {
        StateSpaceModel::new(
            DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]),
            DMatrix::from_row_slice(2, 1, &[0.0, 1.0]),
            time_type,
        )
        .unwrap()
    }

    fn stable_diagonal() -> StateSpaceModel {
        StateSpaceModel::new(
            DMatrix::from_row_slice(2, 2, &[0.5, 0.0, 0.0, 0.8]),
            DMatrix::from_row_slice(2, 1, &[1.0, 1.0]),
            TimeType::Discrete,
        )
        .unwrap()
    }

    #[test]
    fn controllability_matrix_of_double_integrator() {
        let co = controllability_matrix(&double_integrator(TimeType::Continuous));
        // [B, AB] = [[0, 1], [1, 0]]
        assert_relative_eq!(co, DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]));
    }

    #[test]
    fn double_integrator_is_controllable() {
        assert!(is_controllable(&double_integrator(TimeType::Continuous)));
        assert!(is_controllable(&double_integrator(TimeType::Discrete)));
    }

    #[test]
    fn zero_system_is_not_controllable() {
        let model = StateSpaceModel::zeros(3, 1, TimeType::Discrete).unwrap();
        assert!(!is_controllable(&model));
    }

    #[test]
    fn decoupled_unactuated_state_is_not_controllable() {
        // Second state has no input and no coupling.
        let model = StateSpaceModel::new(
            DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]),
            DMatrix::from_row_slice(2, 1, &[1.0, 0.0]),
            TimeType::Discrete,
        )
        .unwrap();
        assert!(!is_controllable(&model));
    }

    #[test]
    fn observability_matrix_stacks_rows() {
        let mut model = double_integrator(TimeType::Discrete);
        model
            .set_c(DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 0.0]))
            .unwrap();
        let o = observability_matrix(&model);
        assert_eq!(o.shape(), (4, 2));
        // C = [[1,0],[0,0]], CA = [[0,1],[0,0]]
        let expected = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        assert_relative_eq!(o, expected);
        assert!(is_observable(&model));
    }

    #[test]
    fn velocity_measurement_is_not_observable() {
        let mut model = double_integrator(TimeType::Discrete);
        model
            .set_c(DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]))
            .unwrap();
        assert!(!is_observable(&model));
    }

    #[test]
    fn full_state_output_is_observable() {
        assert!(is_observable(&stable_diagonal()));
    }

    #[test]
    fn rank_of_zero_matrix_is_zero() {
        assert_eq!(full_piv_rank(&DMatrix::zeros(3, 4)), 0);
        assert_eq!(full_piv_rank(&DMatrix::identity(3, 4)), 3);
    }

    #[test]
    fn gramian_converges_for_stable_system() {
        let options = GramianOptions::default();
        let gramian = controllability_gramian(&stable_diagonal(), options).unwrap();

        assert!(gramian.converged);
        assert!(gramian.residual < options.tolerance);
        assert!(gramian.iterations < options.max_iters);
        assert_eq!(gramian.iterations, gramian.residual_history.len() - 1);
        for pair in gramian.residual_history.windows(2) {
            assert!(pair[1] <= pair[0], "residual increased: {pair:?}");
        }

        // Closed form for diagonal A: W_ij = b_i b_j / (1 - a_i a_j)
        let expected = DMatrix::from_row_slice(
            2,
            2,
            &[
                1.0 / (1.0 - 0.25),
                1.0 / (1.0 - 0.4),
                1.0 / (1.0 - 0.4),
                1.0 / (1.0 - 0.64),
            ],
        );
        assert_relative_eq!(gramian.matrix, expected, epsilon = 1e-8);
    }

    #[test]
    fn gramian_satisfies_lyapunov_equation() {
        let model = stable_diagonal();
        let w = controllability_gramian(&model, GramianOptions::default())
            .unwrap()
            .matrix;
        let a = model.a();
        let lhs = a * &w * a.transpose() - &w + model.b() * model.b().transpose();
        assert_relative_eq!(lhs, DMatrix::zeros(2, 2), epsilon = 1e-8);
    }

    #[test]
    fn observability_gramian_converges() {
        let model = stable_diagonal();
        let gramian = observability_gramian(&model, GramianOptions::default()).unwrap();
        assert!(gramian.converged);
        // C = I, A diagonal: W_o = diag(1 / (1 - a_i²))
        assert_relative_eq!(gramian.matrix[(0, 0)], 1.0 / 0.75, epsilon = 1e-8);
        assert_relative_eq!(gramian.matrix[(1, 1)], 1.0 / 0.36, epsilon = 1e-8);
        assert_relative_eq!(gramian.matrix[(0, 1)], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn unstable_gramian_stops_at_max_iters() {
        let model = StateSpaceModel::new(
            DMatrix::from_element(1, 1, 1.1),
            DMatrix::from_element(1, 1, 1.0),
            TimeType::Discrete,
        )
        .unwrap();
        let options = GramianOptions {
            max_iters: 10,
            tolerance: 1e-9,
        };
        let gramian = controllability_gramian(&model, options).unwrap();
        assert!(!gramian.converged);
        assert_eq!(gramian.iterations, 10);
        assert_eq!(gramian.residual_history.len(), 10);
        assert!(gramian.residual > 1.0);
    }

    #[test]
    fn zero_iterations_returns_zero_matrix() {
        let options = GramianOptions {
            max_iters: 0,
            tolerance: 1e-9,
        };
        let gramian = controllability_gramian(&stable_diagonal(), options).unwrap();
        assert_eq!(gramian.iterations, 0);
        assert!(!gramian.converged);
        assert_relative_eq!(gramian.matrix, DMatrix::zeros(2, 2));
    }

    #[test]
    fn continuous_time_gramians_are_unsupported() {
        let model = double_integrator(TimeType::Continuous);
        assert_eq!(
            controllability_gramian(&model, GramianOptions::default()).unwrap_err(),
            UnsupportedOperation::ContinuousGramian(GramianKind::Controllability)
        );
        assert_eq!(
            observability_gramian(&model, GramianOptions::default()).unwrap_err(),
            UnsupportedOperation::ContinuousGramian(GramianKind::Observability)
        );
    }
}
