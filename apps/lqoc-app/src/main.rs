//! LQ optimal-control CLI.
//!
//! Provides three modes of operation:
//! - `analyze`: Controllability, observability and Gramians of a model
//! - `solve`: Regulate a model to the origin over a finite horizon
//! - `info`: Print workspace crate versions and configuration

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use nalgebra::{DMatrix, DVector};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lqoc_core::analysis::full_piv_rank;
use lqoc_core::prelude::*;
use lqoc_solver::prelude::*;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Linear-quadratic optimal control toolkit.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Structural analysis of a state-space model.
    Analyze {
        /// Model TOML file. Defaults to a discrete double integrator.
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Maximum Gramian accumulation steps.
        #[arg(long, default_value_t = 100)]
        max_iters: usize,

        /// Gramian convergence tolerance.
        #[arg(long, default_value_t = 1e-9)]
        tolerance: f64,
    },

    /// Regulate a model from an initial state to the origin.
    Solve {
        /// Model TOML file. Defaults to a discrete double integrator.
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Solver settings TOML file.
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Number of stages.
        #[arg(short = 'n', long, default_value_t = 20)]
        horizon: usize,

        /// QP backend, overrides the settings file.
        #[arg(short, long)]
        backend: Option<Backend>,

        /// Initial state, comma separated.
        #[arg(long, value_delimiter = ',', default_values_t = vec![1.0, 0.0])]
        x0: Vec<f64>,

        /// Diagonal state weight.
        #[arg(long, default_value_t = 1.0)]
        state_weight: f64,

        /// Diagonal control weight.
        #[arg(long, default_value_t = 0.1)]
        control_weight: f64,
    },

    /// Print crate information.
    Info,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    InteriorPoint,
    Riccati,
}

impl From<Backend> for BackendKind {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::InteriorPoint => Self::InteriorPoint,
            Backend::Riccati => Self::Riccati,
        }
    }
}

// ---------------------------------------------------------------------------
// Mode implementations
// ---------------------------------------------------------------------------

fn double_integrator() -> Result<StateSpaceModel, ModelError> {
    let dt = 0.1;
    StateSpaceModel::new(
        DMatrix::from_row_slice(2, 2, &[1.0, dt, 0.0, 1.0]),
        DMatrix::from_row_slice(2, 1, &[0.5 * dt * dt, dt]),
        TimeType::Discrete,
    )
}

fn load_model(path: Option<&Path>) -> Result<StateSpaceModel, LqocError> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading model");
            ModelConfig::from_file(path)?.to_model()
        }
        None => Ok(double_integrator()?),
    }
}

fn print_gramian(name: &str, result: Result<Gramian, UnsupportedOperation>) {
    match result {
        Ok(g) => {
            println!(
                "{name} gramian: iterations={}, residual={:.3e}, converged={}",
                g.iterations, g.residual, g.converged
            );
            println!("{}", g.matrix);
        }
        Err(e) => println!("{name} gramian: {e}"),
    }
}

fn run_analyze(model: Option<&Path>, options: GramianOptions) -> Result<(), LqocError> {
    let model = load_model(model)?;
    let n = model.state_dim();

    let co = controllability_matrix(&model);
    let ob = observability_matrix(&model);
    println!("n={n}, m={}, time={:?}", model.control_dim(), model.time_type());
    println!(
        "controllable: {} (rank {}/{n})",
        is_controllable(&model),
        full_piv_rank(&co)
    );
    println!(
        "observable:   {} (rank {}/{n})",
        is_observable(&model),
        full_piv_rank(&ob)
    );
    println!();

    print_gramian("controllability", controllability_gramian(&model, options));
    print_gramian("observability", observability_gramian(&model, options));
    Ok(())
}

struct SolveArgs {
    model: Option<PathBuf>,
    settings: Option<PathBuf>,
    horizon: usize,
    backend: Option<Backend>,
    x0: Vec<f64>,
    state_weight: f64,
    control_weight: f64,
}

fn run_solve(args: SolveArgs) -> Result<(), LqocError> {
    let model = load_model(args.model.as_deref())?;
    let mut settings = match &args.settings {
        Some(path) => SolverSettings::from_file(path)?,
        None => SolverSettings::default(),
    };
    if let Some(backend) = args.backend {
        settings.backend = backend.into();
    }

    let n = model.state_dim();
    let m = model.control_dim();
    if args.x0.len() != n {
        return Err(ConfigError::InvalidValue {
            field: "x0".into(),
            message: format!("expected {n} entries, got {}", args.x0.len()),
        }
        .into());
    }

    let cost = LqCost::diagonal(&vec![args.state_weight; n], &vec![args.control_weight; m]);
    let x0 = DVector::from_vec(args.x0);
    let problem = LqProblem::from_lti(&model, &cost, &x0, args.horizon)?;

    let mut solver = make_solver(&settings)?;
    solver.set_problem(&problem)?;
    let report = solver.solve()?;
    info!(
        status = ?report.status,
        iterations = report.iterations,
        solve_time_us = report.solve_time_us,
        "solved"
    );

    let states = solver.solution_state()?;
    let controls = solver.solution_control()?;
    println!(
        "backend={:?}, status={:?}, iterations={}, objective={:.6}",
        settings.backend, report.status, report.iterations, report.objective
    );
    for (k, x) in states.iter().enumerate() {
        let u = controls.get(k).map_or_else(String::new, |u| format!("{:?}", u.as_slice()));
        println!("{k:4}  x={:?}  u={u}", x.as_slice());
    }
    Ok(())
}

fn run_info() {
    println!("lqoc v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("crates:");
    println!("  lqoc-core    {}", env!("CARGO_PKG_VERSION"));
    println!("  lqoc-solver  {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("backends: interior-point (clarabel), riccati");
    println!("edition: 2024");
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Analyze {
            model,
            max_iters,
            tolerance,
        }) => run_analyze(
            model.as_deref(),
            GramianOptions {
                max_iters,
                tolerance,
            },
        ),
        Some(Commands::Solve {
            model,
            settings,
            horizon,
            backend,
            x0,
            state_weight,
            control_weight,
        }) => run_solve(SolveArgs {
            model,
            settings,
            horizon,
            backend,
            x0,
            state_weight,
            control_weight,
        }),
        Some(Commands::Info) => {
            run_info();
            Ok(())
        }
        None => {
            // Default: analyze the built-in model
            run_analyze(None, GramianOptions::default())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
