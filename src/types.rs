use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

// ─────────────────────────────────────────────────────────────
//  Error type
// ─────────────────────────────────────────────────────────────

/// Unified error type for all fallible operations in the crate.
///
/// Every function in the public API returns `Result<T, BeamError>`
/// instead of panicking.  Quality problems that still leave a usable
/// result (sentinel-penalised residuals, infeasible spars) are reported
/// through [`SolveStatus`] instead.
#[derive(Debug, Error)]
pub enum BeamError {
    /// Young's modulus, inertia or area is not a positive finite number.
    #[error("invalid material properties: {0}")]
    InvalidMaterial(String),
    /// Sample grid is too short, not finite, or not strictly increasing.
    #[error("invalid sample grid: {0}")]
    InvalidGrid(String),
    /// An arclength that must coincide with a grid sample does not.
    #[error("arclength {s} does not coincide with any sample of the grid")]
    InvalidSampleLookup { s: f64 },
    /// A quadrature or slope conversion produced a non-finite value
    /// (|G| ≥ 1, or a derivative singularity at the domain boundary).
    #[error("numeric divergence while computing {stage}")]
    NumericDivergence { stage: &'static str },
    /// Fixed-point loop hit its iteration cap.
    #[error("fixed-point iteration did not converge after {iterations} iterations (last change {delta:.3e})")]
    NonConvergence { iterations: usize, delta: f64 },
    /// Vector lengths that must agree do not.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    /// The two skins of a coupled system cannot be paired.
    #[error("incompatible beams: {0}")]
    IncompatibleBeams(String),
    /// Argmin solver returned an error.
    #[error("solver error: {0}")]
    Solver(String),
    /// The cancellation flag of the active [`SolveControl`](crate::control::SolveControl) was raised.
    #[error("solve cancelled")]
    Cancelled,
    /// The deadline of the active [`SolveControl`](crate::control::SolveControl) passed.
    #[error("solve exceeded its deadline")]
    DeadlineExceeded,
    /// Malformed configuration document.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
    /// Configuration file could not be read.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<argmin::core::Error> for BeamError {
    fn from(e: argmin::core::Error) -> Self {
        Self::Solver(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BeamError>;

// ─────────────────────────────────────────────────────────────
//  Constants
// ─────────────────────────────────────────────────────────────

/// Finite stand-in for a NaN residual so the outer optimiser can still
/// rank the trial point.
pub const SENTINEL_RESIDUAL: f64 = 100.0;

pub const DEFAULT_STATE_TOLERANCE: f64 = 1e-8;
pub const DEFAULT_END_OFFSET: f64 = 1e-6;
pub const DEFAULT_RESULTANT_STEP: f64 = 1e-3;

/// Child chord snaps back to the parent chord when closer than this.
pub const CHORD_SNAP_TOLERANCE: f64 = 1e-7;

// ─────────────────────────────────────────────────────────────
//  Material
// ─────────────────────────────────────────────────────────────

/// Linear-elastic section properties, immutable per beam.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialProperties {
    /// Young's modulus E.
    pub young: f64,
    /// Second moment of area I.
    pub inertia: f64,
    /// Cross-section area A.
    pub area: f64,
}

impl MaterialProperties {
    pub fn new(young: f64, inertia: f64, area: f64) -> Result<Self> {
        let material = Self { young, inertia, area };
        material.validate()?;
        Ok(material)
    }

    /// Every property must be positive and finite. Models re-check this on
    /// construction since the fields are public.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("young", self.young), ("inertia", self.inertia), ("area", self.area)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(BeamError::InvalidMaterial(format!(
                    "{name} must be positive and finite (received {value})"
                )));
            }
        }
        Ok(())
    }

    /// E·I
    pub fn flexural_rigidity(&self) -> f64 {
        self.young * self.inertia
    }
}

impl Default for MaterialProperties {
    /// Unit section (E = I = A = 1), the normalised cantilever case.
    fn default() -> Self {
        Self { young: 1.0, inertia: 1.0, area: 1.0 }
    }
}

// ─────────────────────────────────────────────────────────────
//  Loads
// ─────────────────────────────────────────────────────────────

/// A point force attached at arclength `s`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConcentratedLoad {
    /// Attachment arclength; must coincide with a grid sample.
    pub s: f64,
    /// Force components `[f_x, f_y]` in the undeformed frame.
    pub force: [f64; 2],
    /// Direction rotates with the local tangent of the deformed beam.
    pub follower: bool,
}

impl ConcentratedLoad {
    /// Fixed-direction load.
    pub fn fixed(s: f64, fx: f64, fy: f64) -> Self {
        Self { s, force: [fx, fy], follower: false }
    }

    /// Load whose direction follows the local rotation of the beam.
    pub fn follower(s: f64, fx: f64, fy: f64) -> Self {
        Self { s, force: [fx, fy], follower: true }
    }
}

/// Distributed load intensity `w(s)`: force per unit length along +y.
#[derive(Clone)]
pub struct DistributedLoad(Arc<dyn Fn(f64) -> f64 + Send + Sync>);

impl DistributedLoad {
    pub fn new(w: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        Self(Arc::new(w))
    }

    /// Uniform intensity along the whole span.
    pub fn uniform(w: f64) -> Self {
        Self::new(move |_| w)
    }

    pub fn intensity(&self, s: f64) -> f64 {
        (self.0)(s)
    }
}

impl fmt::Debug for DistributedLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DistributedLoad(..)")
    }
}

/// Everything applied to one beam.
#[derive(Debug, Clone, Default)]
pub struct LoadSpec {
    pub concentrated: Vec<ConcentratedLoad>,
    pub distributed: Option<DistributedLoad>,
    /// Rotate the distributed load onto the local normal of the deformed beam.
    pub distributed_follower: bool,
    pub torque: f64,
}

impl LoadSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concentrated(mut self, load: ConcentratedLoad) -> Self {
        self.concentrated.push(load);
        self
    }

    pub fn with_distributed(mut self, load: DistributedLoad, follower: bool) -> Self {
        self.distributed = Some(load);
        self.distributed_follower = follower;
        self
    }

    pub fn with_torque(mut self, torque: f64) -> Self {
        self.torque = torque;
        self
    }

    /// True when any load needs the deformed tangent angles.
    pub fn has_follower(&self) -> bool {
        self.concentrated.iter().any(|l| l.follower)
            || (self.distributed.is_some() && self.distributed_follower)
    }
}

// ─────────────────────────────────────────────────────────────
//  Sample grid
// ─────────────────────────────────────────────────────────────

/// Strictly increasing arclength coordinates from the beam origin to its tip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleGrid {
    s: Vec<f64>,
}

impl SampleGrid {
    pub fn new(s: Vec<f64>) -> Result<Self> {
        if s.len() < 2 {
            return Err(BeamError::InvalidGrid(format!(
                "need at least 2 samples, got {}",
                s.len()
            )));
        }
        if let Some(bad) = s.iter().find(|v| !v.is_finite()) {
            return Err(BeamError::InvalidGrid(format!("non-finite sample {bad}")));
        }
        if let Some(k) = s.windows(2).position(|w| w[1] <= w[0]) {
            return Err(BeamError::InvalidGrid(format!(
                "samples {k} and {} are not strictly increasing ({} >= {})",
                k + 1,
                s[k],
                s[k + 1]
            )));
        }
        Ok(Self { s })
    }

    /// `n` equally spaced samples on `[start, end]`.
    pub fn uniform(start: f64, end: f64, n: usize) -> Result<Self> {
        if n < 2 {
            return Self::new(vec![start]);
        }
        let step = (end - start) / (n - 1) as f64;
        let mut s: Vec<f64> = (0..n).map(|k| start + step * k as f64).collect();
        // pin the tip exactly so loads attached at `end` resolve
        s[n - 1] = end;
        Self::new(s)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.s
    }

    pub fn len(&self) -> usize {
        self.s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.s.is_empty()
    }

    pub fn first(&self) -> f64 {
        self.s[0]
    }

    pub fn last(&self) -> f64 {
        self.s[self.s.len() - 1]
    }

    /// Index of the sample equal to `s` (to within a few ULPs).
    pub fn index_of(&self, s: f64) -> Option<usize> {
        let tol = 4.0 * f64::EPSILON * s.abs().max(1.0);
        self.s.iter().position(|&v| (v - s).abs() <= tol)
    }

    /// Like [`index_of`](Self::index_of) but a miss is a contract violation.
    pub fn require_index(&self, s: f64) -> Result<usize> {
        self.index_of(s).ok_or(BeamError::InvalidSampleLookup { s })
    }

    /// Insert a sample at `index`, keeping the grid strictly increasing.
    pub(crate) fn insert(&mut self, index: usize, value: f64) -> Result<()> {
        let mut s = self.s.clone();
        s.insert(index, value);
        *self = Self::new(s)?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────
//  Beam state  (recomputed every iteration / evaluation)
// ─────────────────────────────────────────────────────────────

/// Per-sample fields of one beam plus the aggregate residual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeamState {
    /// Deformed horizontal position.
    pub x: Vec<f64>,
    /// Deformed vertical position.
    pub y: Vec<f64>,
    /// Bending moment M.
    pub moment: Vec<f64>,
    /// Rotation proxy G (sine of the local rotation angle).
    pub rotation: Vec<f64>,
    /// Per-sample equilibrium error r.
    pub error: Vec<f64>,
    /// Aggregate residual R, always finite.
    pub residual: f64,
    /// R was replaced by [`SENTINEL_RESIDUAL`] because it evaluated to NaN.
    pub diverged: bool,
}

impl BeamState {
    pub fn zeros(n: usize) -> Self {
        Self {
            x: vec![0.0; n],
            y: vec![0.0; n],
            moment: vec![0.0; n],
            rotation: vec![0.0; n],
            error: vec![0.0; n],
            residual: 0.0,
            diverged: false,
        }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Deformed positions as an n × 2 array (x, y per row).
    pub fn positions(&self) -> Array2<f64> {
        let n = self.x.len();
        let mut out = Array2::zeros((n, 2));
        for i in 0..n {
            out[[i, 0]] = self.x[i];
            out[[i, 1]] = self.y[i];
        }
        out
    }

    /// Deformed tip position.
    pub fn tip(&self) -> [f64; 2] {
        let n = self.x.len();
        [self.x[n - 1], self.y[n - 1]]
    }
}

// ─────────────────────────────────────────────────────────────
//  Bounds
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    /// `[-magnitude, magnitude]` on every free coefficient.
    pub fn symmetric(n: usize, magnitude: f64) -> Self {
        let m = magnitude.abs();
        Self {
            lower: vec![-m; n],
            upper: vec![m; n],
        }
    }

    pub fn unbounded(n: usize) -> Self {
        Self {
            lower: vec![f64::NEG_INFINITY; n],
            upper: vec![f64::INFINITY; n],
        }
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    /// Project `theta` onto the box.
    pub fn clamp(&self, theta: &[f64]) -> Vec<f64> {
        theta
            .iter()
            .zip(self.lower.iter().zip(&self.upper))
            .map(|(&t, (&lo, &hi))| t.max(lo).min(hi))
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────
//  Constraints  (equality / inequality on the free vector)
// ─────────────────────────────────────────────────────────────

/// Nonlinear constraint on the free coefficient vector.
///
/// Equalities are driven to `h(A) = 0`, inequalities to `g(A) ≤ 0`; both
/// through the augmented Lagrangian loop in
/// [`optimizer::minimize`](crate::optimizer::minimize).
pub enum Constraint<'a> {
    Equality(Box<dyn Fn(&[f64]) -> f64 + 'a>),
    Inequality(Box<dyn Fn(&[f64]) -> f64 + 'a>),
}

impl<'a> Constraint<'a> {
    pub fn equality(f: impl Fn(&[f64]) -> f64 + 'a) -> Self {
        Self::Equality(Box::new(f))
    }

    pub fn inequality(f: impl Fn(&[f64]) -> f64 + 'a) -> Self {
        Self::Inequality(Box::new(f))
    }
}

impl fmt::Debug for Constraint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equality(_) => write!(f, "Constraint::Equality(..)"),
            Self::Inequality(_) => write!(f, "Constraint::Inequality(..)"),
        }
    }
}

/// Settings for the augmented Lagrangian outer loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ALSettings {
    /// Initial penalty parameter μ.
    pub mu_init: f64,
    /// Multiplicative growth factor for μ each outer iteration.
    pub mu_factor: f64,
    /// Maximum value of μ (prevents ill-conditioning).
    pub mu_max: f64,
    /// Maximum number of outer AL iterations.
    pub max_outer_iters: usize,
    /// Constraint feasibility tolerance: stop when the largest violation < tol.
    pub constraint_tol: f64,
}

impl Default for ALSettings {
    fn default() -> Self {
        Self {
            mu_init: 10.0,
            mu_factor: 5.0,
            mu_max: 1e8,
            max_outer_iters: 20,
            constraint_tol: 1e-6,
        }
    }
}

/// Mutable multiplier state of the augmented Lagrangian.
#[derive(Debug, Clone, PartialEq)]
pub struct ALState {
    /// λ for each equality h_k = 0 (free sign).
    pub equality: Vec<f64>,
    /// λ_k ≥ 0 for each inequality g_k ≤ 0.
    pub inequality: Vec<f64>,
    /// Current penalty parameter μ.
    pub mu: f64,
}

impl ALState {
    pub fn new(num_equality: usize, num_inequality: usize, settings: &ALSettings) -> Self {
        Self {
            equality: vec![0.0; num_equality],
            inequality: vec![0.0; num_inequality],
            mu: settings.mu_init,
        }
    }
}

// ─────────────────────────────────────────────────────────────
//  Solver options
// ─────────────────────────────────────────────────────────────

/// Inner minimiser used for coefficient optimisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Method {
    /// Derivative-free simplex search.
    #[default]
    NelderMead,
    /// L-BFGS with a central-difference gradient.
    Lbfgs,
}

/// What the coupled outer solve minimises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoupledObjective {
    /// Upper-skin residual only; the lower skin is driven by the spar
    /// constraints and the load transfer.
    #[default]
    UpperResidual,
    /// Sum of both skins' residuals.
    Combined,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Fixed-point stop: √Σ(Δx² + Δy²) below this.
    pub state_tolerance: f64,
    pub max_fixed_point_iters: usize,
    /// Offset of the samples inserted next to singular endpoints.
    pub end_offset: f64,
    /// Box half-width on free coefficients in beam / coupled solves.
    pub bound: f64,
    /// Box half-width in the potential-energy solve.
    pub potential_bound: f64,
    pub method: Method,
    pub max_iterations: usize,
    /// Nelder–Mead stop: standard deviation of simplex costs.
    pub sd_tolerance: f64,
    /// Relative step of the finite-difference gradient (L-BFGS).
    pub fd_step: f64,
    /// Step of the central difference in the coupled load transfer.
    pub resultant_step: f64,
    /// Absolute tolerance of scalar (Brent) searches.
    pub scalar_tolerance: f64,
    pub coupled_objective: CoupledObjective,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            state_tolerance: DEFAULT_STATE_TOLERANCE,
            max_fixed_point_iters: 500,
            end_offset: DEFAULT_END_OFFSET,
            bound: 0.2,
            potential_bound: 0.01,
            method: Method::NelderMead,
            max_iterations: 5000,
            sd_tolerance: 1e-14,
            fd_step: 1e-7,
            resultant_step: DEFAULT_RESULTANT_STEP,
            scalar_tolerance: 1e-13,
            coupled_objective: CoupledObjective::UpperResidual,
        }
    }
}

// ─────────────────────────────────────────────────────────────
//  Results
// ─────────────────────────────────────────────────────────────

/// Quality indicator attached to every optimisation result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SolveStatus {
    Converged,
    /// The minimiser stopped on its iteration cap.
    MaxIterations,
    /// The returned residual is the NaN sentinel, not a real value.
    Penalized,
    /// Equality / inequality constraints still violated by `violation`.
    ConstraintInfeasible { violation: f64 },
}

impl SolveStatus {
    pub fn classify(converged: bool, diverged: bool, violation: f64, constraint_tol: f64) -> Self {
        if diverged {
            Self::Penalized
        } else if !(violation < constraint_tol) {
            Self::ConstraintInfeasible { violation }
        } else if !converged {
            Self::MaxIterations
        } else {
            Self::Converged
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

/// Output of [`optimizer::minimize`](crate::optimizer::minimize).
#[derive(Debug, Clone)]
pub struct MinimizeResult {
    /// Best free vector (inside the bounds).
    pub x: Vec<f64>,
    /// Raw objective at `x` (no penalty terms).
    pub fun: f64,
    pub iterations: usize,
    /// Inner minimiser reported convergence and constraints are satisfied.
    pub converged: bool,
    /// Largest constraint violation at `x`; zero when unconstrained.
    pub constraint_max_violation: f64,
    /// Penalised objective at every evaluation.
    pub trace: Vec<f64>,
}

/// Output of the fixed-point loop.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedPointReport {
    pub iterations: usize,
    /// Final state change √Σ(Δx² + Δy²).
    pub delta: f64,
    /// State change per iteration.
    pub trace: Vec<f64>,
}

/// Output of a single-beam parameterised solve.
#[derive(Debug, Clone)]
pub struct ParameterizedReport {
    /// Optimised free vector A.
    pub free: Vec<f64>,
    /// Full coefficient vector D = formatInput(A).
    pub coefficients: Vec<f64>,
    pub residual: f64,
    pub status: SolveStatus,
    pub iterations: usize,
    pub constraint_max_violation: f64,
    pub trace: Vec<f64>,
}

/// Output of a coupled upper/lower solve.
#[derive(Debug, Clone)]
pub struct CoupledReport {
    pub free: Vec<f64>,
    pub upper_coefficients: Vec<f64>,
    pub lower_coefficients: Vec<f64>,
    /// Value of the chosen [`CoupledObjective`].
    pub objective: f64,
    pub upper_residual: f64,
    pub lower_residual: f64,
    /// Spar constraint values at the optimum.
    pub spar_values: Vec<f64>,
    pub status: SolveStatus,
    pub iterations: usize,
    pub constraint_max_violation: f64,
    pub trace: Vec<f64>,
}

/// Output of the potential-energy minimisation.
#[derive(Debug, Clone)]
pub struct PotentialReport {
    pub free: Vec<f64>,
    pub coefficients: Vec<f64>,
    /// U − W at the optimum.
    pub residual: f64,
    pub strain_energy: f64,
    pub work: f64,
    pub chord: f64,
    pub status: SolveStatus,
    pub iterations: usize,
    pub trace: Vec<f64>,
}
