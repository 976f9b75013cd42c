//! lqoc-core: state-space models, structural analysis, errors and configuration
//! shared by the LQ optimal-control crates.

pub mod analysis;
pub mod config;
pub mod error;
pub mod state_space;
pub mod types;

pub mod prelude {
    pub use crate::analysis::{
        Gramian, GramianOptions, controllability_gramian, controllability_matrix, is_controllable,
        is_observable, observability_gramian, observability_matrix,
    };
    pub use crate::config::{BackendKind, IpmArgs, ModelConfig, SolverSettings};
    pub use crate::error::{
        ConfigError, GramianKind, LqocError, ModelError, ProblemError, SolverError,
        TranscriptionError, UnsupportedOperation,
    };
    pub use crate::state_space::{LinearSystem, StateSpaceModel};
    pub use crate::types::{
        ControlMatrixArray, ControlVectorArray, FeedbackArray, StateControlMatrixArray,
        StateMatrixArray, StateVectorArray, TimeType,
    };
}
