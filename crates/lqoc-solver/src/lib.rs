//! lqoc-solver: transcription of affine LQ optimal-control problems into
//! stage-structured QPs in absolute coordinates, structured QP backends and
//! extraction of the optimal trajectories.

pub mod backend;
pub mod clarabel_backend;
pub mod layout;
pub mod problem;
pub mod riccati;
pub mod solution;
pub mod solver;
pub mod transcriber;

pub mod prelude {
    pub use crate::backend::{BackendReport, BackendStatus, OcpQpBackend, OcpQpSolution};
    pub use crate::clarabel_backend::ClarabelBackend;
    pub use crate::layout::{BlockArena, StageDims};
    pub use crate::problem::{LqCost, LqProblem};
    pub use crate::riccati::RiccatiBackend;
    pub use crate::solution::SolutionExtractor;
    pub use crate::solver::{
        InteriorPointSolver, LqocSolver, RiccatiSolver, StructuredQpSolver, make_solver,
    };
    pub use crate::transcriber::{QpTranscriber, TranscribedQp};
}
