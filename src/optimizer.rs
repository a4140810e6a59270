//! Minimisation drivers via the `argmin` crate.
//!
//! Wraps an [`OptimizationProblem`] into argmin's `CostFunction` +
//! `Gradient` traits, then runs Nelder–Mead or L-BFGS inside an optional
//! augmented Lagrangian outer loop. Scalar searches (inverse arclength,
//! chord update) go through Brent's method.
//!
//! Parameters are plain `Vec<f64>` (argmin-math `vec` backend).

use crate::control::SolveControl;
use crate::gradients::try_central_difference_gradient;
use crate::objectives::{
    augmented_lagrangian_penalty, bounds_penalty, constraint_violations, max_violation,
    update_multipliers,
};
use crate::types::{
    ALSettings, ALState, BeamError, Bounds, Method, MinimizeResult, Result, SolverOptions,
    SENTINEL_RESIDUAL,
};
use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason};
use argmin::solver::brent::BrentOpt;
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::neldermead::NelderMead;
use argmin::solver::quasinewton::LBFGS;
use std::cell::RefCell;
use tracing::{debug, warn};

const SCALAR_MAX_ITERS: u64 = 500;

/// Relative size of the initial simplex edges.
const SIMPLEX_STEP: f64 = 0.05;

/// An objective over a free vector, with optional constraints.
///
/// Constraint methods are always called right after `cost` at the same
/// point, so implementations may read state that `cost` just computed.
pub trait OptimizationProblem {
    fn cost(&mut self, a: &[f64]) -> f64;

    /// h(a) = 0
    fn equality_constraints(&mut self, _a: &[f64]) -> Vec<f64> {
        Vec::new()
    }

    /// g(a) ≤ 0
    fn inequality_constraints(&mut self, _a: &[f64]) -> Vec<f64> {
        Vec::new()
    }
}

// ─────────────────────────────────────────────────────────────
//  argmin problem wrapper
// ─────────────────────────────────────────────────────────────

/// Evaluates `f(clamp(θ)) + AL(θ) + bound penalty(θ)`.
///
/// `RefCell` is used for the problem because argmin's `CostFunction` /
/// `Gradient` traits take `&self`, but beam objectives mutate their state.
///
/// **Evaluation cache**: argmin may call `cost(θ)` twice at the same θ
/// (e.g. line-search acceptance). The last `(θ, value)` pair is kept so
/// the expensive beam evaluation runs once per unique θ.
struct PenalizedProblem<'a, P: ?Sized> {
    problem: RefCell<&'a mut P>,
    bounds: &'a Bounds,
    al: Option<ALState>,
    fd_step: f64,
    control: &'a SolveControl,
    trace: &'a RefCell<Vec<f64>>,
    last_eval: RefCell<Option<(Vec<f64>, f64)>>,
}

impl<'a, P: OptimizationProblem + ?Sized> PenalizedProblem<'a, P> {
    fn evaluate(&self, theta: &[f64]) -> std::result::Result<f64, argmin::core::Error> {
        {
            let cached = self.last_eval.borrow();
            if let Some((ref t, v)) = *cached {
                if t == theta {
                    return Ok(v);
                }
            }
        }
        if let Err(e) = self.control.check() {
            return Err(argmin::core::Error::msg(e.to_string()));
        }

        let clamped = self.bounds.clamp(theta);
        let mut value = {
            let mut problem = self.problem.borrow_mut();
            let raw = problem.cost(&clamped);
            let mut v = if raw.is_finite() { raw } else { SENTINEL_RESIDUAL };
            if let Some(al) = &self.al {
                let h = problem.equality_constraints(&clamped);
                let g = problem.inequality_constraints(&clamped);
                let penalty = augmented_lagrangian_penalty(&h, &g, al);
                v += if penalty.is_finite() { penalty } else { SENTINEL_RESIDUAL };
            }
            v
        };
        value += bounds_penalty(theta, &clamped);

        self.trace.borrow_mut().push(value);
        *self.last_eval.borrow_mut() = Some((theta.to_vec(), value));
        Ok(value)
    }
}

impl<'a, P: OptimizationProblem + ?Sized> CostFunction for PenalizedProblem<'a, P> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, theta: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        self.evaluate(theta)
    }
}

impl<'a, P: OptimizationProblem + ?Sized> Gradient for PenalizedProblem<'a, P> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, theta: &Self::Param) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        try_central_difference_gradient(|p| self.evaluate(p), theta, self.fd_step)
    }
}

/// Scalar objective for Brent searches.
struct ScalarProblem<F> {
    f: RefCell<F>,
}

impl<F: FnMut(f64) -> f64> CostFunction for ScalarProblem<F> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, x: &f64) -> std::result::Result<f64, argmin::core::Error> {
        let mut f = self.f.borrow_mut();
        let v = (*f)(*x);
        Ok(if v.is_finite() { v } else { 1e10 })
    }
}

// ─────────────────────────────────────────────────────────────
//  Inner unconstrained solve
// ─────────────────────────────────────────────────────────────

struct InnerOutcome {
    x: Vec<f64>,
    iterations: usize,
    converged: bool,
}

fn initial_simplex(x0: &[f64], bounds: &Bounds) -> Vec<Vec<f64>> {
    let mut simplex = vec![x0.to_vec()];
    for i in 0..x0.len() {
        let span = bounds.upper[i] - bounds.lower[i];
        let step = if span.is_finite() {
            SIMPLEX_STEP * span
        } else {
            SIMPLEX_STEP * x0[i].abs().max(1.0)
        };
        let mut vertex = x0.to_vec();
        vertex[i] = if x0[i] + step <= bounds.upper[i] {
            x0[i] + step
        } else {
            x0[i] - step
        };
        simplex.push(vertex);
    }
    simplex
}

/// Run one inner solve, optionally with AL penalty terms.
fn inner_minimize<P: OptimizationProblem + ?Sized>(
    problem: &mut P,
    x0: &[f64],
    bounds: &Bounds,
    options: &SolverOptions,
    al: Option<ALState>,
    control: &SolveControl,
    trace: &RefCell<Vec<f64>>,
) -> Result<InnerOutcome> {
    let wrapped = PenalizedProblem {
        problem: RefCell::new(problem),
        bounds,
        al,
        fd_step: options.fd_step,
        control,
        trace,
        last_eval: RefCell::new(None),
    };
    let max_iters = options.max_iterations as u64;

    let run = match options.method {
        Method::NelderMead => {
            let solver = NelderMead::new(initial_simplex(x0, bounds))
                .with_sd_tolerance(options.sd_tolerance)?;
            Executor::new(wrapped, solver)
                .configure(|config| config.max_iters(max_iters))
                .run()
                .map(|result| {
                    let state = result.state();
                    (
                        state.get_best_param().cloned(),
                        state.get_iter() as usize,
                        matches!(
                            state.get_termination_reason(),
                            Some(TerminationReason::SolverConverged)
                        ),
                    )
                })
        }
        Method::Lbfgs => {
            let linesearch = MoreThuenteLineSearch::new();
            let solver = LBFGS::new(linesearch, 10); // 10 correction pairs
            Executor::new(wrapped, solver)
                .configure(|config| {
                    config
                        .param(x0.to_vec())
                        .max_iters(max_iters)
                        .target_cost(f64::NEG_INFINITY)
                })
                .run()
                .map(|result| {
                    let state = result.state();
                    (
                        state.get_best_param().cloned(),
                        state.get_iter() as usize,
                        matches!(
                            state.get_termination_reason(),
                            Some(TerminationReason::SolverConverged)
                        ),
                    )
                })
        }
    };

    match run {
        Ok((best, iterations, converged)) => {
            let best = best.ok_or_else(|| BeamError::Solver("minimiser returned no best parameters".into()))?;
            Ok(InnerOutcome {
                x: bounds.clamp(&best),
                iterations,
                converged,
            })
        }
        Err(e) => {
            // an interrupted objective surfaces as an argmin error
            control.check()?;
            Err(BeamError::from(e))
        }
    }
}

// ─────────────────────────────────────────────────────────────
//  Constrained minimisation via Augmented Lagrangian
// ─────────────────────────────────────────────────────────────

/// Minimise `problem` over the box `bounds`, starting from `x0`.
///
/// Without constraints this is a single inner solve. With constraints it
/// solves a sequence of inner problems, each incorporating the AL penalty
///
///   min  f(a)  +  Σ λ_k h_k + (μ/2) h_k²  +  Σ (μ/2) [max(0, λ_k/μ + g_k)]²
///
/// and after each one updates
///
///   λ ← λ + μ h,   λ ← max(0, λ + μ g),   μ ← min(μ_max, α · μ)
///
/// until the largest violation drops below `constraint_tol` or the outer
/// iteration budget runs out. An infeasible result is returned, not an error.
pub fn minimize<P: OptimizationProblem + ?Sized>(
    problem: &mut P,
    x0: &[f64],
    bounds: &Bounds,
    options: &SolverOptions,
    al_settings: &ALSettings,
    control: &SolveControl,
) -> Result<MinimizeResult> {
    if x0.len() != bounds.len() {
        return Err(BeamError::DimensionMismatch(format!(
            "initial point has {} entries, bounds have {}",
            x0.len(),
            bounds.len()
        )));
    }
    control.check()?;
    let trace = RefCell::new(Vec::new());
    let start = bounds.clamp(x0);

    if start.is_empty() {
        let fun = problem.cost(&start);
        let h = problem.equality_constraints(&start);
        let g = problem.inequality_constraints(&start);
        return Ok(MinimizeResult {
            x: start,
            fun,
            iterations: 0,
            converged: true,
            constraint_max_violation: max_violation(&constraint_violations(&h, &g)),
            trace: vec![fun],
        });
    }

    problem.cost(&start);
    let n_eq = problem.equality_constraints(&start).len();
    let n_ineq = problem.inequality_constraints(&start).len();

    if n_eq + n_ineq == 0 {
        let inner = inner_minimize(problem, &start, bounds, options, None, control, &trace)?;
        let fun = problem.cost(&inner.x);
        if !inner.converged {
            warn!(iterations = inner.iterations, fun, "minimiser stopped before converging");
        }
        return Ok(MinimizeResult {
            x: inner.x,
            fun,
            iterations: inner.iterations,
            converged: inner.converged,
            constraint_max_violation: 0.0,
            trace: trace.into_inner(),
        });
    }

    let mut al = ALState::new(n_eq, n_ineq, al_settings);
    let mut best = start;
    let mut total_iters = 0usize;
    let mut inner_converged = false;

    for outer in 0..al_settings.max_outer_iters {
        let inner = inner_minimize(problem, &best, bounds, options, Some(al.clone()), control, &trace)?;
        best = inner.x;
        total_iters += inner.iterations;
        inner_converged = inner.converged;

        problem.cost(&best);
        let h = problem.equality_constraints(&best);
        let g = problem.inequality_constraints(&best);
        let viol = max_violation(&constraint_violations(&h, &g));

        debug!(
            outer = outer + 1,
            mu = al.mu,
            max_violation = viol,
            "augmented Lagrangian outer iteration"
        );

        if viol < al_settings.constraint_tol {
            debug!(max_violation = viol, "constraints satisfied");
            break;
        }

        update_multipliers(&mut al, &h, &g);
        al.mu = (al.mu * al_settings.mu_factor).min(al_settings.mu_max);
    }

    let fun = problem.cost(&best);
    let h = problem.equality_constraints(&best);
    let g = problem.inequality_constraints(&best);
    let final_viol = max_violation(&constraint_violations(&h, &g));
    if final_viol >= al_settings.constraint_tol {
        warn!(max_violation = final_viol, "constraints not satisfied after outer loop");
    }

    Ok(MinimizeResult {
        x: best,
        fun,
        iterations: total_iters,
        converged: inner_converged && final_viol < al_settings.constraint_tol,
        constraint_max_violation: final_viol,
        trace: trace.into_inner(),
    })
}

// ─────────────────────────────────────────────────────────────
//  Scalar minimisation
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarMinimum {
    pub x: f64,
    pub fun: f64,
    pub converged: bool,
}

/// Brent's method on `[lower, upper]` to absolute tolerance `tolerance`.
pub fn minimize_scalar<F: FnMut(f64) -> f64>(
    f: F,
    lower: f64,
    upper: f64,
    tolerance: f64,
) -> Result<ScalarMinimum> {
    if !(lower < upper) {
        return Err(BeamError::Solver(format!(
            "empty scalar bracket [{lower}, {upper}]"
        )));
    }
    let solver = BrentOpt::new(lower, upper).set_tolerance(tolerance, tolerance);
    let result = Executor::new(ScalarProblem { f: RefCell::new(f) }, solver)
        .configure(|config| config.max_iters(SCALAR_MAX_ITERS))
        .run()?;
    let state = result.state();
    let x = state
        .get_best_param()
        .copied()
        .ok_or_else(|| BeamError::Solver("Brent returned no best parameter".into()))?;
    Ok(ScalarMinimum {
        x,
        fun: state.get_best_cost(),
        converged: matches!(
            state.get_termination_reason(),
            Some(TerminationReason::SolverConverged)
        ),
    })
}
