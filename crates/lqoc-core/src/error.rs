use thiserror::Error;

/// Top-level error type for the LQ optimal-control crates.
#[derive(Debug, Error)]
pub enum LqocError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Problem error: {0}")]
    Problem(#[from] ProblemError),

    #[error("Transcription error: {0}")]
    Transcription(#[from] TranscriptionError),

    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),

    #[error("Unsupported operation: {0}")]
    Unsupported(#[from] UnsupportedOperation),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Ragged matrix {name}: row {row} has {got} entries, expected {expected}")]
    RaggedMatrix {
        name: &'static str,
        row: usize,
        expected: usize,
        got: usize,
    },
}

/// State-space model construction errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Matrix {name} has shape {got:?}, expected {expected:?}")]
    DimensionMismatch {
        name: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("State and control dimensions must be positive (got n={state_dim}, m={control_dim})")]
    EmptyDimension { state_dim: usize, control_dim: usize },

    #[error("Operation requires a discrete-time model")]
    RequiresDiscreteTime,
}

/// Malformed LQ problem data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProblemError {
    #[error("Horizon must be at least one stage")]
    EmptyHorizon,

    #[error("State and control dimensions must be positive (got n={state_dim}, m={control_dim})")]
    EmptyDimension { state_dim: usize, control_dim: usize },

    #[error("Array {name} has {got} stages, expected {expected}")]
    StageCount {
        name: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Block {name}[{stage}] has shape {got:?}, expected {expected:?}")]
    BlockShape {
        name: &'static str,
        stage: usize,
        expected: (usize, usize),
        got: (usize, usize),
    },
}

/// Errors raised while laying out an LQ problem for a structured QP solver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptionError {
    #[error("Time horizon not set, call resize() before transcribing")]
    HorizonNotSet,

    #[error("Problem has {got} stages but the transcriber is sized for {expected}")]
    HorizonMismatch { expected: usize, got: usize },

    #[error("Problem has dimensions (n={got_state}, m={got_control}), transcriber expects (n={state_dim}, m={control_dim})")]
    DimensionMismatch {
        state_dim: usize,
        control_dim: usize,
        got_state: usize,
        got_control: usize,
    },

    #[error(transparent)]
    Problem(#[from] ProblemError),
}

/// Errors reported by a QP backend or the LQ solver front end.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("No problem set, call set_problem() before solve()")]
    NoProblem,

    #[error("No solution available, call solve() first")]
    NoSolution,

    #[error("Backend {backend} has no memory for this layout, call create() first")]
    NotCreated { backend: &'static str },

    #[error("Invalid solver settings: {0}")]
    Settings(String),

    #[error("Backend {backend} failed to set up the QP: {message}")]
    Setup {
        backend: &'static str,
        message: String,
    },

    #[error("Control Hessian at stage {stage} is not positive definite")]
    NotPositiveDefinite { stage: usize },

    #[error("Backend {backend} does not support {count} inequality constraints")]
    UnsupportedConstraints { backend: &'static str, count: usize },
}

/// Operations that exist in the interface but are deliberately not provided.
///
/// Copy + static messages, like the other structural errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UnsupportedOperation {
    #[error("Computation of the {0} Gramian is not implemented for continuous-time systems")]
    ContinuousGramian(GramianKind),

    #[error("compute_output() is not available for generalized state manifolds")]
    ManifoldOutput,

    #[error("Feedback gain extraction is not implemented")]
    FeedbackGains,
}

/// Which Gramian an operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GramianKind {
    Controllability,
    Observability,
}

impl std::fmt::Display for GramianKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Controllability => f.write_str("controllability"),
            Self::Observability => f.write_str("observability"),
        }
    }
}
