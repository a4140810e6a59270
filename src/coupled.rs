//! Upper and lower skins joined by spars.
//!
//! Each spar keeps the distance between the two skins at its arclength
//! equal to the undeformed distance (one equality constraint per spar).
//! Shear carried by the lower skin is handed to the upper skin as a
//! concentrated reaction before every upper residual evaluation.

use crate::beam::BeamModel;
use crate::control::SolveControl;
use crate::geometry::Geometry;
use crate::gradients::{derivative, DifferenceScheme};
use crate::layout::JointCoefficientMap;
use crate::optimizer::{minimize, OptimizationProblem};
use crate::types::{
    ALSettings, BeamError, BeamState, Bounds, CoupledObjective, CoupledReport, Result,
    SolveStatus, SolverOptions,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Lower-skin sample whose shear is applied at an upper-skin sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReactionLink {
    pub lower_s: f64,
    pub upper_s: f64,
}

impl ReactionLink {
    /// Shear taken and applied at the same spar arclength.
    pub fn at_spar(s: f64) -> Self {
        Self { lower_s: s, upper_s: s }
    }
}

#[derive(Debug, Clone, Copy)]
struct ResolvedLink {
    lower_index: usize,
    upper_slot: usize,
    base_force: [f64; 2],
}

/// Snapshot of both skins plus spar geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoupledState {
    pub upper: BeamState,
    pub lower: BeamState,
    pub spars: Vec<f64>,
    /// Unit vector from the lower to the upper skin at each spar.
    pub spar_directions: Vec<[f64; 2]>,
    pub spar_values: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct CoupledBeamSystem<G: Geometry> {
    upper: BeamModel<G>,
    lower: BeamModel<G>,
    spars: Vec<f64>,
    /// (upper index, lower index) of each spar.
    spar_indices: Vec<(usize, usize)>,
    spar_directions: Vec<[f64; 2]>,
    spar_values: Vec<f64>,
    links: Vec<ResolvedLink>,
    reactions: Vec<[f64; 2]>,
}

impl<G: Geometry> CoupledBeamSystem<G> {
    /// Pair two skins sharing a root, with spars at arclengths `spars`
    /// (each must be a sample of both grids). One reaction link per spar.
    pub fn new(upper: BeamModel<G>, lower: BeamModel<G>, spars: Vec<f64>) -> Result<Self> {
        let (ou, ol) = (upper.options().origin, lower.options().origin);
        if ou != ol {
            return Err(BeamError::IncompatibleBeams(format!(
                "upper origin {ou} differs from lower origin {ol}"
            )));
        }
        let spar_indices = spars
            .iter()
            .map(|&s| -> Result<(usize, usize)> {
                Ok((upper.grid().require_index(s)?, lower.grid().require_index(s)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let links: Vec<ReactionLink> = spars.iter().map(|&s| ReactionLink::at_spar(s)).collect();

        let mut system = Self {
            upper,
            lower,
            spars,
            spar_indices,
            spar_directions: Vec::new(),
            spar_values: Vec::new(),
            links: Vec::new(),
            reactions: Vec::new(),
        };
        system.set_reaction_links(&links)?;
        system.spar_values = system.spar_constraints();
        Ok(system)
    }

    /// Replace the default per-spar links.
    pub fn with_reaction_links(mut self, links: &[ReactionLink]) -> Result<Self> {
        self.set_reaction_links(links)?;
        Ok(self)
    }

    fn set_reaction_links(&mut self, links: &[ReactionLink]) -> Result<()> {
        for old in self.links.drain(..) {
            self.upper.set_load_force(old.upper_slot, old.base_force);
        }
        for link in links {
            let lower_index = self.lower.grid().require_index(link.lower_s)?;
            let upper_index = self.upper.grid().require_index(link.upper_s)?;
            let upper_slot = self.upper.ensure_load_at(upper_index);
            let base_force = self.upper.loads().concentrated[upper_slot].force;
            self.links.push(ResolvedLink {
                lower_index,
                upper_slot,
                base_force,
            });
        }
        self.reactions = vec![[0.0; 2]; self.links.len()];
        Ok(())
    }

    pub fn upper(&self) -> &BeamModel<G> {
        &self.upper
    }

    pub fn lower(&self) -> &BeamModel<G> {
        &self.lower
    }

    pub fn spars(&self) -> &[f64] {
        &self.spars
    }

    pub fn spar_directions(&self) -> &[[f64; 2]] {
        &self.spar_directions
    }

    /// Reaction currently applied by each link.
    pub fn reactions(&self) -> &[[f64; 2]] {
        &self.reactions
    }

    /// Apply `options` to both skins.
    pub fn set_solver_options(&mut self, options: SolverOptions) {
        self.lower.set_solver_options(options.clone());
        self.upper.set_solver_options(options);
    }

    pub fn state(&self) -> CoupledState {
        CoupledState {
            upper: self.upper.state().clone(),
            lower: self.lower.state().clone(),
            spars: self.spars.clone(),
            spar_directions: self.spar_directions.clone(),
            spar_values: self.spar_values.clone(),
        }
    }

    /// Deformed minus undeformed skin-to-skin distance at each spar.
    ///
    /// Also refreshes the unit spar directions (lower → upper).
    pub fn spar_constraints(&mut self) -> Vec<f64> {
        let (upper, lower) = (self.upper.state(), self.lower.state());
        let mut values = Vec::with_capacity(self.spar_indices.len());
        self.spar_directions.clear();
        for &(iu, il) in &self.spar_indices {
            let (dx, dy) = (upper.x[iu] - lower.x[il], upper.y[iu] - lower.y[il]);
            let deformed = dx.hypot(dy);
            let parent = (self.upper.parent_x()[iu] - self.lower.parent_x()[il])
                .hypot(self.upper.parent_y()[iu] - self.lower.parent_y()[il]);
            self.spar_directions.push(if deformed > 0.0 {
                [dx / deformed, dy / deformed]
            } else {
                [0.0, 0.0]
            });
            values.push(deformed - parent);
        }
        values
    }

    /// Shear V = d/dx [EI (ρ_child − ρ_parent)] on the lower skin at each
    /// link, decomposed along the lower tangent and written into the upper
    /// skin's load as `base + (V sin, −V cos)`.
    pub fn calculate_resultants(&mut self) {
        let step = self.upper.solver_options().resultant_step;
        let ei = self.lower.material().flexural_rigidity();
        let (child, parent) = (self.lower.child(), self.lower.parent());

        self.reactions = self
            .links
            .iter()
            .map(|link| {
                let x = self.lower.state().x[link.lower_index];
                let shear = derivative(
                    |v| ei * (child.curvature_at(v) - parent.curvature_at(v)),
                    x,
                    step,
                    DifferenceScheme::Central,
                );
                let angles = child.rotation_angles(&[x]);
                [shear * angles.sin[0], -shear * angles.cos[0]]
            })
            .collect();

        // links sharing an upper load add up on top of its base force
        let mut totals: Vec<(usize, [f64; 2])> = Vec::new();
        for (link, reaction) in self.links.iter().zip(&self.reactions) {
            match totals.iter_mut().find(|(slot, _)| *slot == link.upper_slot) {
                Some((_, force)) => {
                    force[0] += reaction[0];
                    force[1] += reaction[1];
                }
                None => totals.push((
                    link.upper_slot,
                    [link.base_force[0] + reaction[0], link.base_force[1] + reaction[1]],
                )),
            }
        }
        for (slot, force) in totals {
            self.upper.set_load_force(slot, force);
        }
    }

    /// Objective at full coefficient vectors for both skins.
    ///
    /// Order matters: the lower skin is shaped first, its shear is handed
    /// over, then the upper residual is evaluated and the spars measured.
    pub fn evaluate(&mut self, upper: &[f64], lower: &[f64]) -> f64 {
        let lower_residual = self.lower.evaluate_coefficients(lower);
        self.calculate_resultants();
        let upper_residual = self.upper.evaluate_coefficients(upper);
        self.spar_values = self.spar_constraints();
        match self.upper.solver_options().coupled_objective {
            CoupledObjective::UpperResidual => upper_residual,
            CoupledObjective::Combined => upper_residual + lower_residual,
        }
    }

    fn objective_diverged(&self) -> bool {
        match self.upper.solver_options().coupled_objective {
            CoupledObjective::UpperResidual => self.upper.state().diverged,
            CoupledObjective::Combined => self.upper.state().diverged || self.lower.state().diverged,
        }
    }

    /// Search the joint free vector under one equality constraint per spar.
    ///
    /// Infeasible spars come back as [`SolveStatus::ConstraintInfeasible`].
    pub fn parameterized_solve<M: JointCoefficientMap + ?Sized>(
        &mut self,
        map: &M,
        x0: &[f64],
        al: &ALSettings,
        control: &SolveControl,
    ) -> Result<CoupledReport> {
        let options = self.upper.solver_options().clone();
        let bounds = Bounds::symmetric(x0.len(), options.bound);
        let result = {
            let mut problem = CoupledProblem {
                system: &mut *self,
                map,
            };
            minimize(&mut problem, x0, &bounds, &options, al, control)?
        };

        let (upper_coefficients, lower_coefficients) = map.split(&result.x);
        let objective = self.evaluate(&upper_coefficients, &lower_coefficients);
        debug!(spar_values = ?self.spar_values, "spar constraints at optimum");

        let status = SolveStatus::classify(
            result.converged,
            self.objective_diverged(),
            result.constraint_max_violation,
            al.constraint_tol,
        );
        if status.is_converged() {
            info!(objective, iterations = result.iterations, "coupled solve converged");
        } else {
            warn!(objective, ?status, "coupled solve finished without converging");
        }

        Ok(CoupledReport {
            free: result.x,
            upper_coefficients,
            lower_coefficients,
            objective,
            upper_residual: self.upper.state().residual,
            lower_residual: self.lower.state().residual,
            spar_values: self.spar_values.clone(),
            status,
            iterations: result.iterations,
            constraint_max_violation: result.constraint_max_violation,
            trace: result.trace,
        })
    }
}

struct CoupledProblem<'m, G: Geometry, M: ?Sized> {
    system: &'m mut CoupledBeamSystem<G>,
    map: &'m M,
}

impl<G: Geometry, M: JointCoefficientMap + ?Sized> OptimizationProblem for CoupledProblem<'_, G, M> {
    fn cost(&mut self, a: &[f64]) -> f64 {
        let (upper, lower) = self.map.split(a);
        self.system.evaluate(&upper, &lower)
    }

    /// Spar values measured by the preceding `cost` call.
    fn equality_constraints(&mut self, _a: &[f64]) -> Vec<f64> {
        self.system.spar_values.clone()
    }
}
