//! Linear time-invariant state-space model.
//!
//! ```text
//! x⁺ = A x + B u      (discrete)   or   ẋ = A x + B u   (continuous)
//! y  = C x + D u
//! ```
//!
//! A and C are n×n, B and D are n×m. Shapes are fixed when the model is
//! built: the mutable accessors hand out fixed-shape views and the setters
//! reject matrices of the wrong shape.

use nalgebra::{DMatrix, DMatrixViewMut, DVector};

use crate::error::{ModelError, UnsupportedOperation};
use crate::types::TimeType;

/// Linearization interface shared by linear systems.
///
/// For an LTI system the sensitivities do not depend on the evaluation
/// point, so implementations may ignore `x`, `u` and `t`.
pub trait LinearSystem {
    /// State dimension n.
    fn state_dim(&self) -> usize;

    /// Control dimension m.
    fn control_dim(&self) -> usize;

    /// ∂f/∂x at `(x, u, t)`.
    fn derivative_state(&self, x: &DVector<f64>, u: &DVector<f64>, t: f64) -> &DMatrix<f64>;

    /// ∂f/∂u at `(x, u, t)`.
    fn derivative_control(&self, x: &DVector<f64>, u: &DVector<f64>, t: f64) -> &DMatrix<f64>;
}

/// State-space matrices (A, B, C, D) of a linear time-invariant system.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSpaceModel {
    a: DMatrix<f64>,
    b: DMatrix<f64>,
    c: DMatrix<f64>,
    d: DMatrix<f64>,
    time_type: TimeType,
}

impl StateSpaceModel {
    /// All four matrices zero.
    pub fn zeros(state_dim: usize, control_dim: usize, time_type: TimeType) -> Result<Self, ModelError> {
        check_dims(state_dim, control_dim)?;
        Ok(Self {
            a: DMatrix::zeros(state_dim, state_dim),
            b: DMatrix::zeros(state_dim, control_dim),
            c: DMatrix::zeros(state_dim, state_dim),
            d: DMatrix::zeros(state_dim, control_dim),
            time_type,
        })
    }

    /// Build from A and B with the full state as output (C = I, D = 0).
    pub fn new(a: DMatrix<f64>, b: DMatrix<f64>, time_type: TimeType) -> Result<Self, ModelError> {
        let n = a.nrows();
        let m = b.ncols();
        Self::with_output(
            a,
            b,
            DMatrix::identity(n, n),
            DMatrix::zeros(n, m),
            time_type,
        )
    }

    /// Build from all four matrices. n is taken from A, m from B.
    pub fn with_output(
        a: DMatrix<f64>,
        b: DMatrix<f64>,
        c: DMatrix<f64>,
        d: DMatrix<f64>,
        time_type: TimeType,
    ) -> Result<Self, ModelError> {
        let n = a.nrows();
        let m = b.ncols();
        check_dims(n, m)?;
        check_shape("A", &a, (n, n))?;
        check_shape("B", &b, (n, m))?;
        check_shape("C", &c, (n, n))?;
        check_shape("D", &d, (n, m))?;
        Ok(Self {
            a,
            b,
            c,
            d,
            time_type,
        })
    }

    pub fn state_dim(&self) -> usize {
        self.a.nrows()
    }

    pub fn control_dim(&self) -> usize {
        self.b.ncols()
    }

    pub const fn time_type(&self) -> TimeType {
        self.time_type
    }

    pub const fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub const fn b(&self) -> &DMatrix<f64> {
        &self.b
    }

    pub const fn c(&self) -> &DMatrix<f64> {
        &self.c
    }

    pub const fn d(&self) -> &DMatrix<f64> {
        &self.d
    }

    /// Mutable view of A. The view has A's shape and cannot resize it.
    pub fn a_mut(&mut self) -> DMatrixViewMut<'_, f64> {
        full_view_mut(&mut self.a)
    }

    pub fn b_mut(&mut self) -> DMatrixViewMut<'_, f64> {
        full_view_mut(&mut self.b)
    }

    pub fn c_mut(&mut self) -> DMatrixViewMut<'_, f64> {
        full_view_mut(&mut self.c)
    }

    pub fn d_mut(&mut self) -> DMatrixViewMut<'_, f64> {
        full_view_mut(&mut self.d)
    }

    pub fn set_a(&mut self, a: DMatrix<f64>) -> Result<(), ModelError> {
        check_shape("A", &a, self.a.shape())?;
        self.a = a;
        Ok(())
    }

    pub fn set_b(&mut self, b: DMatrix<f64>) -> Result<(), ModelError> {
        check_shape("B", &b, self.b.shape())?;
        self.b = b;
        Ok(())
    }

    pub fn set_c(&mut self, c: DMatrix<f64>) -> Result<(), ModelError> {
        check_shape("C", &c, self.c.shape())?;
        self.c = c;
        Ok(())
    }

    pub fn set_d(&mut self, d: DMatrix<f64>) -> Result<(), ModelError> {
        check_shape("D", &d, self.d.shape())?;
        self.d = d;
        Ok(())
    }

    /// System output `y = C x + D u`.
    ///
    /// Not available: outputs are not yet defined for states living on a
    /// generalized manifold, so this always fails instead of returning the
    /// flat-space product.
    pub fn compute_output(
        &self,
        _state: &DVector<f64>,
        _control: &DVector<f64>,
    ) -> Result<DVector<f64>, UnsupportedOperation> {
        Err(UnsupportedOperation::ManifoldOutput)
    }
}

impl LinearSystem for StateSpaceModel {
    fn state_dim(&self) -> usize {
        self.a.nrows()
    }

    fn control_dim(&self) -> usize {
        self.b.ncols()
    }

    fn derivative_state(&self, _x: &DVector<f64>, _u: &DVector<f64>, _t: f64) -> &DMatrix<f64> {
        &self.a
    }

    fn derivative_control(&self, _x: &DVector<f64>, _u: &DVector<f64>, _t: f64) -> &DMatrix<f64> {
        &self.b
    }
}

fn full_view_mut(m: &mut DMatrix<f64>) -> DMatrixViewMut<'_, f64> {
    let shape = m.shape();
    m.view_mut((0, 0), shape)
}

const fn check_dims(state_dim: usize, control_dim: usize) -> Result<(), ModelError> {
    if state_dim == 0 || control_dim == 0 {
        return Err(ModelError::EmptyDimension {
            state_dim,
            control_dim,
        });
    }
    Ok(())
}

fn check_shape(name: &'static str, m: &DMatrix<f64>, expected: (usize, usize)) -> Result<(), ModelError> {
    if m.shape() == expected {
        Ok(())
    } else {
        Err(ModelError::DimensionMismatch {
            name,
            expected,
            got: m.shape(),
        })
    }
}
