//! Conversion of a backend's stage solution into full trajectories.

use nalgebra::DVector;

use lqoc_core::types::{ControlVectorArray, StateVectorArray};

use crate::backend::OcpQpSolution;

/// Read-only view of a stage solution together with the fixed initial state.
#[derive(Debug, Clone, Copy)]
pub struct SolutionExtractor<'a> {
    solution: &'a OcpQpSolution,
    x0: &'a DVector<f64>,
}

impl<'a> SolutionExtractor<'a> {
    pub const fn new(solution: &'a OcpQpSolution, x0: &'a DVector<f64>) -> Self {
        Self { solution, x0 }
    }

    /// States x_0 ..= x_N. Stage 0 is the fixed initial state.
    pub fn states(&self) -> StateVectorArray {
        std::iter::once(self.x0.clone())
            .chain(self.solution.x.iter().skip(1).cloned())
            .collect()
    }

    /// Controls u_0 .. u_{N-1}. The last stage carries no control.
    pub fn controls(&self) -> ControlVectorArray {
        let horizon = self.solution.x.len() - 1;
        self.solution.u[..horizon].to_vec()
    }

    /// Dynamics co-states π_0 .. π_{N-1}.
    pub fn costates(&self) -> StateVectorArray {
        self.solution.pi.clone()
    }
}
