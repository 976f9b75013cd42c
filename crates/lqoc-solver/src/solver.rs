//! LQ solver front end: transcribe, solve with a structured QP backend, extract.

use tracing::{debug, warn};

use lqoc_core::config::{BackendKind, SolverSettings};
use lqoc_core::error::{ConfigError, LqocError, SolverError, UnsupportedOperation};
use lqoc_core::types::{ControlVectorArray, FeedbackArray, StateVectorArray};

use crate::backend::{BackendReport, OcpQpBackend};
use crate::clarabel_backend::ClarabelBackend;
use crate::problem::LqProblem;
use crate::riccati::RiccatiBackend;
use crate::solution::SolutionExtractor;
use crate::transcriber::QpTranscriber;

/// Solver for finite-horizon LQ optimal-control problems.
///
/// Typical use inside an outer optimization loop:
/// `configure` once, then per iteration `set_problem`, `solve` and read
/// the absolute trajectories back.
pub trait LqocSolver {
    /// Apply solver settings. Invalid settings are rejected and leave the
    /// current ones in place.
    fn configure(&mut self, settings: &SolverSettings) -> Result<(), ConfigError>;

    /// Transcribe `problem`, resizing internal memory if its horizon changed.
    fn set_problem(&mut self, problem: &LqProblem) -> Result<(), LqocError>;

    /// Solve the last problem passed to [`set_problem`](Self::set_problem).
    fn solve(&mut self) -> Result<BackendReport, SolverError>;

    /// Optimal states x_0 ..= x_N in absolute coordinates.
    fn solution_state(&self) -> Result<StateVectorArray, SolverError>;

    /// Optimal controls u_0 .. u_{N-1} in absolute coordinates.
    fn solution_control(&self) -> Result<ControlVectorArray, SolverError>;

    /// Dynamics co-states π_0 .. π_{N-1}.
    fn costates(&self) -> Result<StateVectorArray, SolverError>;

    /// Time-varying feedback gains. Not provided.
    fn feedback(&self) -> Result<FeedbackArray, UnsupportedOperation> {
        Err(UnsupportedOperation::FeedbackGains)
    }
}

/// [`LqocSolver`] running Clarabel on the transcribed QP.
pub type InteriorPointSolver = StructuredQpSolver<ClarabelBackend>;

/// [`LqocSolver`] running a Riccati recursion on the transcribed QP.
pub type RiccatiSolver = StructuredQpSolver<RiccatiBackend>;

/// Transcriber plus structured QP backend.
#[derive(Debug)]
pub struct StructuredQpSolver<B> {
    backend: B,
    settings: SolverSettings,
    transcriber: Option<QpTranscriber>,
    has_problem: bool,
    has_solution: bool,
}

impl<B: OcpQpBackend + Default> Default for StructuredQpSolver<B> {
    fn default() -> Self {
        Self::new(B::default())
    }
}

impl<B: OcpQpBackend> StructuredQpSolver<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            settings: SolverSettings::default(),
            transcriber: None,
            has_problem: false,
            has_solution: false,
        }
    }

    pub const fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// The transcriber, `None` before the first problem.
    pub const fn transcriber(&self) -> Option<&QpTranscriber> {
        self.transcriber.as_ref()
    }

    fn extractor(&self) -> Result<SolutionExtractor<'_>, SolverError> {
        if !self.has_solution {
            return Err(SolverError::NoSolution);
        }
        let qp = self
            .transcriber
            .as_ref()
            .and_then(QpTranscriber::qp)
            .ok_or(SolverError::NoSolution)?;
        let solution = self.backend.solution().ok_or(SolverError::NoSolution)?;
        Ok(SolutionExtractor::new(solution, qp.x0()))
    }

    fn log_solution(&self, report: &BackendReport) {
        let Ok(extractor) = self.extractor() else {
            return;
        };
        debug!(
            backend = self.backend.name(),
            status = ?report.status,
            iterations = report.iterations,
            objective = report.objective,
            "LQ solution"
        );
        let states = extractor.states();
        let controls = extractor.controls();
        for (k, x) in states.iter().enumerate() {
            match controls.get(k) {
                Some(u) => debug!(stage = k, x = ?x.as_slice(), u = ?u.as_slice()),
                None => debug!(stage = k, x = ?x.as_slice()),
            }
        }
    }
}

impl<B: OcpQpBackend> LqocSolver for StructuredQpSolver<B> {
    fn configure(&mut self, settings: &SolverSettings) -> Result<(), ConfigError> {
        settings.validate()?;
        self.settings = settings.clone();
        Ok(())
    }

    fn set_problem(&mut self, problem: &LqProblem) -> Result<(), LqocError> {
        let n = problem.state_dim();
        let m = problem.control_dim();
        self.has_problem = false;
        self.has_solution = false;

        if self
            .transcriber
            .as_ref()
            .is_none_or(|t| t.state_dim() != n || t.control_dim() != m)
        {
            self.transcriber = Some(QpTranscriber::new(n, m));
        }
        let transcriber = self
            .transcriber
            .get_or_insert_with(|| QpTranscriber::new(n, m));

        let reallocated = transcriber.resize(problem.number_of_stages())?;
        let qp = transcriber.transcribe(problem)?;
        let created = self
            .backend
            .solution()
            .is_some_and(|sol| sol.fits(qp.dims()));
        if reallocated || !created {
            self.backend.create(qp.dims());
        }

        self.has_problem = true;
        Ok(())
    }

    fn solve(&mut self) -> Result<BackendReport, SolverError> {
        if !self.has_problem {
            return Err(SolverError::NoProblem);
        }
        let qp = self
            .transcriber
            .as_ref()
            .and_then(QpTranscriber::qp)
            .ok_or(SolverError::NoProblem)?;

        let report = self.backend.solve(qp, &self.settings.ipm)?;
        self.has_solution = true;

        if !report.status.is_converged() {
            warn!(
                backend = self.backend.name(),
                status = ?report.status,
                iterations = report.iterations,
                "QP solve did not converge"
            );
        }
        if self.settings.log_solution {
            self.log_solution(&report);
        }
        Ok(report)
    }

    fn solution_state(&self) -> Result<StateVectorArray, SolverError> {
        Ok(self.extractor()?.states())
    }

    fn solution_control(&self) -> Result<ControlVectorArray, SolverError> {
        Ok(self.extractor()?.controls())
    }

    fn costates(&self) -> Result<StateVectorArray, SolverError> {
        Ok(self.extractor()?.costates())
    }
}

/// Build and configure the solver selected by `settings.backend`.
pub fn make_solver(settings: &SolverSettings) -> Result<Box<dyn LqocSolver>, ConfigError> {
    let mut solver: Box<dyn LqocSolver> = match settings.backend {
        BackendKind::InteriorPoint => Box::new(InteriorPointSolver::default()),
        BackendKind::Riccati => Box::new(RiccatiSolver::default()),
    };
    solver.configure(settings)?;
    Ok(solver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lqoc_core::config::IpmArgs;
    use nalgebra::{DMatrix, DVector};

    fn small_problem(horizon: usize) -> LqProblem {
        let mut p = LqProblem::zeros(2, 1, horizon).unwrap();
        for k in 0..horizon {
            p.a_mat[k] = DMatrix::from_row_slice(2, 2, &[1.0, 0.1, 0.0, 1.0]);
            p.b_mat[k] = DMatrix::from_row_slice(2, 1, &[0.005, 0.1]);
            p.r_mat[k] = DMatrix::from_element(1, 1, 0.1);
        }
        for k in 0..=horizon {
            p.q_mat[k] = DMatrix::identity(2, 2);
        }
        p.x[0] = DVector::from_vec(vec![1.0, 0.0]);
        p
    }

    #[test]
    fn solve_without_problem_fails() {
        let mut solver = RiccatiSolver::default();
        assert_eq!(solver.solve().unwrap_err(), SolverError::NoProblem);
    }

    #[test]
    fn getters_before_solve_fail() {
        let mut solver = RiccatiSolver::default();
        assert_eq!(solver.solution_state().unwrap_err(), SolverError::NoSolution);
        solver.set_problem(&small_problem(3)).unwrap();
        assert_eq!(solver.solution_control().unwrap_err(), SolverError::NoSolution);
        assert_eq!(solver.costates().unwrap_err(), SolverError::NoSolution);
    }

    #[test]
    fn new_problem_invalidates_solution() {
        let mut solver = RiccatiSolver::default();
        solver.set_problem(&small_problem(3)).unwrap();
        solver.solve().unwrap();
        assert!(solver.solution_state().is_ok());
        solver.set_problem(&small_problem(3)).unwrap();
        assert_eq!(solver.solution_state().unwrap_err(), SolverError::NoSolution);
    }

    #[test]
    fn feedback_is_unsupported() {
        let solver = InteriorPointSolver::default();
        assert_eq!(solver.feedback().unwrap_err(), UnsupportedOperation::FeedbackGains);
    }

    #[test]
    fn configure_rejects_invalid_settings() {
        let mut solver = RiccatiSolver::default();
        let settings = SolverSettings {
            ipm: IpmArgs {
                mu0: 0.0,
                ..IpmArgs::default()
            },
            ..SolverSettings::default()
        };
        assert!(solver.configure(&settings).is_err());
        assert_eq!(solver.settings(), &SolverSettings::default());
    }

    #[test]
    fn set_problem_reuses_memory_for_same_horizon() {
        let mut solver = RiccatiSolver::default();
        solver.set_problem(&small_problem(4)).unwrap();
        solver.set_problem(&small_problem(4)).unwrap();
        assert_eq!(solver.transcriber().unwrap().allocation_count(), 1);
        solver.set_problem(&small_problem(6)).unwrap();
        assert_eq!(solver.transcriber().unwrap().allocation_count(), 2);
        solver.solve().unwrap();
        assert_eq!(solver.solution_control().unwrap().len(), 6);
    }

    #[test]
    fn set_problem_with_new_dimensions_starts_over() {
        let mut solver = RiccatiSolver::default();
        solver.set_problem(&small_problem(4)).unwrap();
        let mut wide = LqProblem::zeros(3, 2, 4).unwrap();
        for r in &mut wide.r_mat {
            r.fill_with_identity();
        }
        solver.set_problem(&wide).unwrap();
        solver.solve().unwrap();
        let states = solver.solution_state().unwrap();
        assert_eq!(states.len(), 5);
        assert_eq!(states[4].len(), 3);
    }

    #[test]
    fn make_solver_applies_settings() {
        let settings = SolverSettings {
            backend: BackendKind::Riccati,
            log_solution: true,
            ..SolverSettings::default()
        };
        let mut solver = make_solver(&settings).unwrap();
        solver.set_problem(&small_problem(5)).unwrap();
        let report = solver.solve().unwrap();
        assert!(report.status.is_converged());
        assert_eq!(solver.solution_state().unwrap()[0], DVector::from_vec(vec![1.0, 0.0]));
    }
}
