//! Single-beam equilibrium: moment, rotation, arclength-preserving
//! re-gridding and the residual that drives coefficient optimisation.
//!
//! Two solution paths share the same state:
//!
//! * `iterative_solve`: fixed-point loop on the sampled shape
//!   (x, y) for an initially straight beam.
//! * `parameterized_solve`: the child geometry's coefficients are
//!   searched until the moment–curvature residual vanishes.

use crate::control::SolveControl;
use crate::geometry::{Geometry, RotationAngles};
use crate::layout::CoefficientMap;
use crate::optimizer::{minimize, minimize_scalar, OptimizationProblem};
use crate::quadrature::{cumtrapz, trapz};
use crate::types::{
    ALSettings, BeamError, BeamState, Bounds, ConcentratedLoad, Constraint, FixedPointReport,
    LoadSpec, MaterialProperties, ParameterizedReport, Result, SampleGrid, SolveStatus,
    SolverOptions, SENTINEL_RESIDUAL,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Doubling steps allowed when bracketing a re-gridded sample.
const MAX_BRACKET_EXPANSIONS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamOptions {
    /// Drop the end samples from the residual and insert guard samples
    /// next to endpoints where the geometry's derivatives are singular.
    pub ignore_ends: bool,
    /// Track tangent rotation so follower loads turn with the beam.
    pub rotated: bool,
    /// x coordinate of the beam root.
    pub origin: f64,
}

impl Default for BeamOptions {
    fn default() -> Self {
        Self {
            ignore_ends: false,
            rotated: false,
            origin: 0.0,
        }
    }
}

/// One beam: an immutable parent shape, a deforming child shape, loads
/// and the per-sample state.
#[derive(Debug, Clone)]
pub struct BeamModel<G: Geometry> {
    parent: G,
    child: G,
    material: MaterialProperties,
    loads: LoadSpec,
    /// Grid index of each concentrated load, resolved once.
    load_indices: Vec<usize>,
    grid: SampleGrid,
    options: BeamOptions,
    solver: SolverOptions,
    length: f64,
    parent_x: Vec<f64>,
    parent_y: Vec<f64>,
    parent_curvature: Vec<f64>,
    parent_angles: Option<RotationAngles>,
    child_angles: Option<RotationAngles>,
    child_curvature: Vec<f64>,
    state: BeamState,
}

fn singular_at<G: Geometry>(geometry: &G, x: f64) -> bool {
    !(geometry.derivative(x, 1).is_finite() && geometry.derivative(x, 2).is_finite())
}

/// Insert guard samples `end_offset` inside each singular endpoint.
fn guard_endpoints<G: Geometry>(
    geometry: &G,
    mut grid: SampleGrid,
    origin: f64,
    end_offset: f64,
) -> Result<SampleGrid> {
    if singular_at(geometry, origin) {
        let guard = grid.first() + end_offset;
        grid.insert(1, guard)?;
        debug!(s = guard, "guard sample inserted after singular root");
    }
    if singular_at(geometry, geometry.chord()) {
        let guard = grid.last() - end_offset;
        let last = grid.len() - 1;
        grid.insert(last, guard)?;
        debug!(s = guard, "guard sample inserted before singular tip");
    }
    Ok(grid)
}

impl<G: Geometry> BeamModel<G> {
    pub fn new(
        geometry: &G,
        material: MaterialProperties,
        loads: LoadSpec,
        grid: SampleGrid,
        options: BeamOptions,
    ) -> Result<Self> {
        Self::with_solver_options(geometry, material, loads, grid, options, SolverOptions::default())
    }

    /// Build the model.
    ///
    /// Steps:
    ///   1. Clone the geometry into independent parent and child snapshots
    ///   2. Undeformed arclength from the origin to the chord
    ///   3. Guard samples next to singular endpoints (`ignore_ends`)
    ///   4. Resolve load arclengths to grid indices
    ///   5. Parent x-grid, height, curvature and (if `rotated`) tangent angles
    pub fn with_solver_options(
        geometry: &G,
        material: MaterialProperties,
        loads: LoadSpec,
        grid: SampleGrid,
        options: BeamOptions,
        solver: SolverOptions,
    ) -> Result<Self> {
        material.validate()?;
        let parent = geometry.clone();
        let child = geometry.clone();

        let (length, _) = parent.arclength(options.origin, parent.chord());

        let grid = if options.ignore_ends {
            guard_endpoints(&parent, grid, options.origin, solver.end_offset)?
        } else {
            grid
        };

        let load_indices = loads
            .concentrated
            .iter()
            .map(|load| grid.require_index(load.s))
            .collect::<Result<Vec<_>>>()?;

        let parent_x = parent.x_from_arclength(grid.as_slice(), options.origin);
        let parent_y: Vec<f64> = parent_x.iter().map(|&x| parent.height(x)).collect();
        let parent_curvature = parent.curvature(&parent_x);
        let parent_angles = options.rotated.then(|| parent.rotation_angles(&parent_x));

        let mut state = BeamState::zeros(grid.len());
        state.x = parent_x.clone();
        state.y = parent_y.clone();

        Ok(Self {
            parent,
            child,
            material,
            loads,
            load_indices,
            grid,
            options,
            solver,
            length,
            child_angles: parent_angles.clone(),
            child_curvature: parent_curvature.clone(),
            parent_x,
            parent_y,
            parent_curvature,
            parent_angles,
            state,
        })
    }

    // ─────────────────────────────────────────────────────────
    //  Accessors
    // ─────────────────────────────────────────────────────────

    pub fn state(&self) -> &BeamState {
        &self.state
    }

    pub fn parent(&self) -> &G {
        &self.parent
    }

    pub fn child(&self) -> &G {
        &self.child
    }

    pub fn grid(&self) -> &SampleGrid {
        &self.grid
    }

    pub fn loads(&self) -> &LoadSpec {
        &self.loads
    }

    pub fn load_indices(&self) -> &[usize] {
        &self.load_indices
    }

    pub fn material(&self) -> &MaterialProperties {
        &self.material
    }

    pub fn options(&self) -> &BeamOptions {
        &self.options
    }

    pub fn solver_options(&self) -> &SolverOptions {
        &self.solver
    }

    pub fn set_solver_options(&mut self, solver: SolverOptions) {
        self.solver = solver;
    }

    /// Arclength of the parent from the origin to its chord.
    pub fn undeformed_length(&self) -> f64 {
        self.length
    }

    pub fn parent_x(&self) -> &[f64] {
        &self.parent_x
    }

    pub fn parent_y(&self) -> &[f64] {
        &self.parent_y
    }

    pub fn parent_curvature(&self) -> &[f64] {
        &self.parent_curvature
    }

    pub fn child_curvature(&self) -> &[f64] {
        &self.child_curvature
    }

    pub fn child_angles(&self) -> Option<&RotationAngles> {
        self.child_angles.as_ref()
    }

    // ─────────────────────────────────────────────────────────
    //  Load-transfer hooks (coupled system)
    // ─────────────────────────────────────────────────────────

    /// Slot of the concentrated load at grid `index`, creating a zero
    /// fixed-direction load there if none exists.
    pub(crate) fn ensure_load_at(&mut self, index: usize) -> usize {
        if let Some(slot) = self.load_indices.iter().position(|&i| i == index) {
            return slot;
        }
        let s = self.grid.as_slice()[index];
        self.loads.concentrated.push(ConcentratedLoad::fixed(s, 0.0, 0.0));
        self.load_indices.push(index);
        self.loads.concentrated.len() - 1
    }

    pub(crate) fn set_load_force(&mut self, slot: usize, force: [f64; 2]) {
        if let Some(load) = self.loads.concentrated.get_mut(slot) {
            load.force = force;
        }
    }

    // ─────────────────────────────────────────────────────────
    //  Moment
    // ─────────────────────────────────────────────────────────

    /// (sin, cos) of the deformed tangent at sample `k`.
    fn child_angle(&self, k: usize) -> (f64, f64) {
        self.child_angles
            .as_ref()
            .or(self.parent_angles.as_ref())
            .map(|a| (a.sin[k], a.cos[k]))
            .unwrap_or((0.0, 1.0))
    }

    /// Force of `load` (attached at sample `a`) in the global frame.
    ///
    /// Follower loads on a rotated beam turn by the angle between the
    /// parent and child tangents at their attachment sample.
    fn applied_force(&self, load: &ConcentratedLoad, a: usize) -> [f64; 2] {
        let [fx, fy] = load.force;
        match (&self.parent_angles, load.follower && self.options.rotated) {
            (Some(parent), true) => {
                let (sc, cc) = self.child_angle(a);
                let (sp, cp) = (parent.sin[a], parent.cos[a]);
                let sin_d = sc * cp - cc * sp;
                let cos_d = cc * cp + sc * sp;
                [cos_d * fx - sin_d * fy, sin_d * fx + cos_d * fy]
            }
            _ => [fx, fy],
        }
    }

    /// Bending moment at sample `i` from everything outboard of it.
    ///
    /// Arm convention: `M += (x_a − x_i)·f_y − (y_a − y_i)·f_x`.
    pub fn moment_at(&self, i: usize) -> f64 {
        let x = &self.state.x;
        let y = &self.state.y;
        let s = self.grid.as_slice();
        let n = s.len();
        let mut m = self.loads.torque;

        for (load, &a) in self.loads.concentrated.iter().zip(&self.load_indices) {
            if a < i {
                continue;
            }
            let [fx, fy] = self.applied_force(load, a);
            m += (x[a] - x[i]) * fy - (y[a] - y[i]) * fx;
        }

        if let Some(w) = &self.loads.distributed {
            let end = if self.options.ignore_ends { n - 1 } else { n };
            if i + 1 < end {
                let integrand: Vec<f64> = (i..end)
                    .map(|k| {
                        let wk = w.intensity(s[k]);
                        let (dx, dy) = (x[k] - x[i], y[k] - y[i]);
                        if self.loads.distributed_follower {
                            let (sin, cos) = self.child_angle(k);
                            wk * (cos * dx + sin * dy)
                        } else {
                            wk * dx
                        }
                    })
                    .collect();
                m += trapz(&integrand, &s[i..end]);
            }
        }
        m
    }

    pub fn compute_moment(&mut self) {
        let moment = (0..self.grid.len()).map(|i| self.moment_at(i)).collect();
        self.state.moment = moment;
    }

    // ─────────────────────────────────────────────────────────
    //  Rotation, deflection and re-gridding (fixed-point pieces)
    // ─────────────────────────────────────────────────────────

    /// G[i] = (1/EI)·∫ M dx over x[0..=i]
    pub fn compute_rotation(&mut self) {
        let ei = self.material.flexural_rigidity();
        self.state.rotation = cumtrapz(&self.state.moment, &self.state.x)
            .into_iter()
            .map(|v| v / ei)
            .collect();
    }

    /// y[i] = y_root + ∫ G/√(1−G²) dx over x[0..=i]
    pub fn compute_deflection(&mut self) -> Result<()> {
        let slopes: Vec<f64> = self
            .state
            .rotation
            .iter()
            .map(|g| g / (1.0 - g * g).sqrt())
            .collect();
        if slopes.iter().any(|v| !v.is_finite()) {
            return Err(BeamError::NumericDivergence { stage: "deflection" });
        }
        let root = self.parent_y[0];
        self.state.y = cumtrapz(&slopes, &self.state.x)
            .into_iter()
            .map(|v| root + v)
            .collect();
        Ok(())
    }

    /// Move each x[i] so that the deformed arclength ∫ dx/√(1−G²) over
    /// x[0..=i] equals s[i] − s[0].
    ///
    /// With G = sin θ the integrand is sec θ, so every segment keeps its
    /// material length Δs. Samples are placed in order; each one is
    /// bracketed from the previous sample, with the grid spacing as the
    /// first guess, and located by a Brent search on the absolute mismatch.
    pub fn compute_x_from_arclength(&mut self) -> Result<()> {
        let secant: Vec<f64> = self
            .state
            .rotation
            .iter()
            .map(|g| 1.0 / (1.0 - g * g).sqrt())
            .collect();
        if secant.iter().any(|v| !v.is_finite()) {
            return Err(BeamError::NumericDivergence { stage: "arclength" });
        }
        let s = self.grid.as_slice();
        let tolerance = self.solver.scalar_tolerance;
        let mut x = self.state.x.clone();

        for i in 1..s.len() {
            let target = s[i] - s[i - 1];
            let (k0, k1) = (secant[i - 1], secant[i]);
            let x_prev = x[i - 1];
            let mismatch = |xi: f64| 0.5 * (xi - x_prev) * (k0 + k1) - target;

            let mut width = target.max(f64::EPSILON);
            let mut expansions = 0;
            while mismatch(x_prev + width) < 0.0 {
                width *= 2.0;
                expansions += 1;
                if expansions > MAX_BRACKET_EXPANSIONS {
                    return Err(BeamError::NumericDivergence { stage: "arclength" });
                }
            }
            let found = minimize_scalar(|xi| mismatch(xi).abs(), x_prev, x_prev + width, tolerance)?;
            x[i] = found.x;
        }
        self.state.x = x;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────
    //  Residual
    // ─────────────────────────────────────────────────────────

    /// r[i] = |M[i]/EI − (ρ_child[i] − ρ_parent[i])|,  R = |∫ r ds|.
    ///
    /// With `ignore_ends` the first and last samples are left out of R.
    /// A non-finite R is replaced by [`SENTINEL_RESIDUAL`] and flagged.
    pub fn compute_residual(&mut self) -> f64 {
        let ei = self.material.flexural_rigidity();
        let n = self.grid.len();
        self.state.error = (0..n)
            .map(|i| {
                (self.state.moment[i] / ei - (self.child_curvature[i] - self.parent_curvature[i])).abs()
            })
            .collect();

        let range = if self.options.ignore_ends && n > 2 { 1..n - 1 } else { 0..n };
        let total = trapz(&self.state.error[range.clone()], &self.grid.as_slice()[range]).abs();

        if total.is_finite() {
            self.state.residual = total;
            self.state.diverged = false;
        } else {
            warn!(sentinel = SENTINEL_RESIDUAL, "residual is not finite, substituting sentinel");
            self.state.residual = SENTINEL_RESIDUAL;
            self.state.diverged = true;
        }
        self.state.residual
    }

    // ─────────────────────────────────────────────────────────
    //  Fixed-point path
    // ─────────────────────────────────────────────────────────

    /// Solve from the identity guess: x follows the arclength, y the parent.
    pub fn iterative_solve(&mut self, control: &SolveControl) -> Result<FixedPointReport> {
        let s = self.grid.as_slice();
        let (s0, x0) = (s[0], self.parent_x[0]);
        self.state.x = s.iter().map(|&si| x0 + (si - s0)).collect();
        self.state.y = self.state.x.iter().map(|&x| self.parent.height(x)).collect();
        self.child_angles = self.parent_angles.clone();
        self.refine(control)
    }

    /// Continue the fixed-point loop from the current state.
    ///
    /// Each iteration:
    ///   1. Moment on the current shape, rotation G from it
    ///   2. Re-grid x so the deformed beam keeps its arclength
    ///   3. Follower angles from G (`rotated` only)
    ///   4. Moment on the new grid, deflection y from G
    ///
    /// Stops when √Σ(Δx² + Δy²) drops below `state_tolerance`.
    pub fn refine(&mut self, control: &SolveControl) -> Result<FixedPointReport> {
        let tolerance = self.solver.state_tolerance;
        let cap = self.solver.max_fixed_point_iters;
        let mut x_prev = self.state.x.clone();
        let mut y_prev = self.state.y.clone();
        let mut trace = Vec::new();
        let mut delta = f64::INFINITY;

        for iteration in 1..=cap {
            control.check()?;

            self.compute_moment();
            self.compute_rotation();
            self.compute_x_from_arclength()?;
            if self.options.rotated {
                self.child_angles = Some(RotationAngles::from_rotation(&self.state.rotation));
            }
            self.compute_moment();
            self.compute_deflection()?;

            delta = self
                .state
                .x
                .iter()
                .zip(&x_prev)
                .chain(self.state.y.iter().zip(&y_prev))
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            trace.push(delta);
            debug!(iteration, delta, "fixed-point iteration");

            if delta < tolerance {
                info!(iterations = iteration, delta, "fixed-point iteration converged");
                return Ok(FixedPointReport {
                    iterations: iteration,
                    delta,
                    trace,
                });
            }
            x_prev.clone_from(&self.state.x);
            y_prev.clone_from(&self.state.y);
        }

        warn!(iterations = cap, delta, "fixed-point iteration hit its cap");
        Err(BeamError::NonConvergence {
            iterations: cap,
            delta,
        })
    }

    // ─────────────────────────────────────────────────────────
    //  Parameterised path
    // ─────────────────────────────────────────────────────────

    /// Re-grid and re-shape the state from the child geometry.
    fn refresh_child_fields(&mut self) {
        let x = self.child.x_from_arclength(self.grid.as_slice(), self.options.origin);
        self.state.y = x.iter().map(|&v| self.child.height(v)).collect();
        self.child_curvature = self.child.curvature(&x);
        if self.loads.has_follower() {
            self.child_angles = Some(self.child.rotation_angles(&x));
        }
        self.state.x = x;
    }

    /// Residual of the child with coefficients `coefficients`.
    ///
    /// Leaves the child geometry and the state at that trial point.
    pub fn evaluate_coefficients(&mut self, coefficients: &[f64]) -> f64 {
        self.child.set_coefficients(coefficients);
        self.refresh_child_fields();
        self.compute_moment();
        self.compute_residual()
    }

    /// Search the free vector A (full coefficients `map.expand(A)`) that
    /// minimises the residual, inside `±bound` on every free entry and
    /// subject to `constraints`.
    ///
    /// The child is left at the optimum with its state recomputed.
    pub fn parameterized_solve<M: CoefficientMap + ?Sized>(
        &mut self,
        map: &M,
        x0: &[f64],
        constraints: &[Constraint<'_>],
        al: &ALSettings,
        control: &SolveControl,
    ) -> Result<ParameterizedReport> {
        let bounds = Bounds::symmetric(x0.len(), self.solver.bound);
        let options = self.solver.clone();
        let result = {
            let mut problem = SingleBeamProblem {
                model: &mut *self,
                map,
                constraints,
            };
            minimize(&mut problem, x0, &bounds, &options, al, control)?
        };

        let coefficients = map.expand(&result.x);
        let residual = self.evaluate_coefficients(&coefficients);
        let status = SolveStatus::classify(
            result.converged,
            self.state.diverged,
            result.constraint_max_violation,
            al.constraint_tol,
        );
        if status.is_converged() {
            info!(residual, iterations = result.iterations, "parameterized solve converged");
        } else {
            warn!(residual, ?status, "parameterized solve finished without converging");
        }

        Ok(ParameterizedReport {
            free: result.x,
            coefficients,
            residual,
            status,
            iterations: result.iterations,
            constraint_max_violation: result.constraint_max_violation,
            trace: result.trace,
        })
    }
}

struct SingleBeamProblem<'m, 'c, G: Geometry, M: ?Sized> {
    model: &'m mut BeamModel<G>,
    map: &'m M,
    constraints: &'m [Constraint<'c>],
}

impl<G: Geometry, M: CoefficientMap + ?Sized> OptimizationProblem for SingleBeamProblem<'_, '_, G, M> {
    fn cost(&mut self, a: &[f64]) -> f64 {
        let coefficients = self.map.expand(a);
        self.model.evaluate_coefficients(&coefficients)
    }

    fn equality_constraints(&mut self, a: &[f64]) -> Vec<f64> {
        self.constraints
            .iter()
            .filter_map(|c| match c {
                Constraint::Equality(h) => Some(h(a)),
                Constraint::Inequality(_) => None,
            })
            .collect()
    }

    fn inequality_constraints(&mut self, a: &[f64]) -> Vec<f64> {
        self.constraints
            .iter()
            .filter_map(|c| match c {
                Constraint::Inequality(g) => Some(g(a)),
                Constraint::Equality(_) => None,
            })
            .collect()
    }
}
