use std::path::Path;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, LqocError};
use crate::state_space::StateSpaceModel;
use crate::types::TimeType;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_alpha_min() -> f64 {
    1e-8
}
const fn default_mu_max() -> f64 {
    1e-12
}
const fn default_iter_max() -> u32 {
    20
}
const fn default_mu0() -> f64 {
    2.0
}

// ---------------------------------------------------------------------------
// IpmArgs
// ---------------------------------------------------------------------------

/// Tuning parameters passed through to an interior-point QP backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IpmArgs {
    /// Smallest step length before the iteration is abandoned.
    #[serde(default = "default_alpha_min")]
    pub alpha_min: f64,

    /// Target duality measure (convergence tolerance).
    #[serde(default = "default_mu_max")]
    pub mu_max: f64,

    /// Maximum number of interior-point iterations.
    #[serde(default = "default_iter_max")]
    pub iter_max: u32,

    /// Initial barrier parameter.
    #[serde(default = "default_mu0")]
    pub mu0: f64,
}

impl Default for IpmArgs {
    fn default() -> Self {
        Self {
            alpha_min: default_alpha_min(),
            mu_max: default_mu_max(),
            iter_max: default_iter_max(),
            mu0: default_mu0(),
        }
    }
}

impl IpmArgs {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alpha_min <= 0.0 || self.alpha_min > 1.0 {
            return Err(invalid("alpha_min", "must be in (0, 1]"));
        }
        if self.mu_max <= 0.0 {
            return Err(invalid("mu_max", "must be > 0"));
        }
        if self.iter_max == 0 {
            return Err(invalid("iter_max", "must be > 0"));
        }
        if self.mu0 <= 0.0 {
            return Err(invalid("mu0", "must be > 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SolverSettings
// ---------------------------------------------------------------------------

/// Which structured QP backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Interior-point solve through Clarabel.
    #[default]
    InteriorPoint,
    /// Dense backward Riccati recursion (unconstrained problems only).
    Riccati,
}

/// Settings handed to an LQ solver through `configure()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    #[serde(default)]
    pub ipm: IpmArgs,

    #[serde(default)]
    pub backend: BackendKind,

    /// Emit a per-stage solution summary at debug level after every solve.
    #[serde(default)]
    pub log_solution: bool,
}

impl SolverSettings {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ipm.validate()
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }
}

// ---------------------------------------------------------------------------
// ModelConfig
// ---------------------------------------------------------------------------

/// State-space model description, matrices given row by row.
///
/// `c` and `d` are optional; they default to the identity and zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub a: Vec<Vec<f64>>,
    pub b: Vec<Vec<f64>>,
    #[serde(default)]
    pub c: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub d: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub time_type: TimeType,
}

impl ModelConfig {
    /// Build the model, checking that every matrix is rectangular and consistently shaped.
    pub fn to_model(&self) -> Result<StateSpaceModel, LqocError> {
        let a = rows_to_matrix("a", &self.a)?;
        let b = rows_to_matrix("b", &self.b)?;
        let model = match (&self.c, &self.d) {
            (None, None) => StateSpaceModel::new(a, b, self.time_type)?,
            (c, d) => {
                let n = a.nrows();
                let m = b.ncols();
                let c = match c {
                    Some(rows) => rows_to_matrix("c", rows)?,
                    None => DMatrix::identity(n, n),
                };
                let d = match d {
                    Some(rows) => rows_to_matrix("d", rows)?,
                    None => DMatrix::zeros(n, m),
                };
                StateSpaceModel::with_output(a, b, c, d, self.time_type)?
            }
        };
        Ok(model)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

fn rows_to_matrix(name: &'static str, rows: &[Vec<f64>]) -> Result<DMatrix<f64>, ConfigError> {
    let ncols = rows.first().map_or(0, Vec::len);
    for (row, values) in rows.iter().enumerate() {
        if values.len() != ncols {
            return Err(ConfigError::RaggedMatrix {
                name,
                row,
                expected: ncols,
                got: values.len(),
            });
        }
    }
    Ok(DMatrix::from_fn(rows.len(), ncols, |i, j| rows[i][j]))
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
}
