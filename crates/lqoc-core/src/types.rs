//! Shared numeric and trajectory types.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// One state vector per stage, `x_0 ..= x_N`.
pub type StateVectorArray = Vec<DVector<f64>>;

/// One control vector per stage, `u_0 .. u_{N-1}`.
pub type ControlVectorArray = Vec<DVector<f64>>;

/// One n×n matrix per stage.
pub type StateMatrixArray = Vec<DMatrix<f64>>;

/// One n×m matrix per stage.
pub type StateControlMatrixArray = Vec<DMatrix<f64>>;

/// One m×m matrix per stage.
pub type ControlMatrixArray = Vec<DMatrix<f64>>;

/// One m×n matrix per stage (cost cross terms and feedback gains).
pub type FeedbackArray = Vec<DMatrix<f64>>;

/// Time domain of a linear system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeType {
    /// `x_{k+1} = A x_k + B u_k`
    #[default]
    Discrete,
    /// `ẋ = A x + B u`
    Continuous,
}

impl TimeType {
    pub const fn is_discrete(self) -> bool {
        matches!(self, Self::Discrete)
    }
}
