//! Minimum total potential energy for a cantilever under a single load.
//!
//! The child shape is searched directly on `Π = U − W`, with the chord
//! adjusted at every trial so the beam keeps its undeformed arclength.

use crate::control::SolveControl;
use crate::geometry::Geometry;
use crate::layout::CoefficientMap;
use crate::optimizer::{minimize, minimize_scalar, OptimizationProblem};
use crate::quadrature::trapz;
use crate::types::{
    ALSettings, Bounds, MaterialProperties, PotentialReport, Result, SampleGrid, SolveStatus,
    SolverOptions, CHORD_SNAP_TOLERANCE,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PotentialLoad {
    /// Vertical tip force P.
    Concentrated(f64),
    /// Uniform vertical intensity q.
    Distributed(f64),
}

#[derive(Debug, Clone)]
pub struct PotentialEnergySolver<G: Geometry> {
    parent: G,
    child: G,
    material: MaterialProperties,
    load: PotentialLoad,
    grid: SampleGrid,
    solver: SolverOptions,
    arc_length: f64,
    parent_x: Vec<f64>,
    child_x: Vec<f64>,
    strain: Vec<f64>,
    energy_density: Vec<f64>,
    strain_energy: f64,
    work: f64,
    residual: f64,
}

impl<G: Geometry> PotentialEnergySolver<G> {
    pub fn new(
        parent: &G,
        child: &G,
        material: MaterialProperties,
        load: PotentialLoad,
        grid: SampleGrid,
    ) -> Result<Self> {
        material.validate()?;
        let parent = parent.clone();
        let (arc_length, _) = parent.arclength(0.0, parent.chord());
        let parent_x = parent.x_from_arclength(grid.as_slice(), 0.0);
        let mut solver = Self {
            child: child.clone(),
            parent,
            material,
            load,
            grid,
            solver: SolverOptions::default(),
            arc_length,
            parent_x,
            child_x: Vec::new(),
            strain: Vec::new(),
            energy_density: Vec::new(),
            strain_energy: 0.0,
            work: 0.0,
            residual: 0.0,
        };
        solver.update();
        Ok(solver)
    }

    pub fn with_solver_options(mut self, solver: SolverOptions) -> Self {
        self.solver = solver;
        self
    }

    pub fn child(&self) -> &G {
        &self.child
    }

    pub fn parent(&self) -> &G {
        &self.parent
    }

    pub fn child_x(&self) -> &[f64] {
        &self.child_x
    }

    /// B = y''_child − y''_parent at each sample.
    pub fn bending_strain(&self) -> &[f64] {
        &self.strain
    }

    /// φ = (EI/2)·B²
    pub fn energy_density(&self) -> &[f64] {
        &self.energy_density
    }

    /// U = ∫ φ ds
    pub fn strain_energy(&self) -> f64 {
        self.strain_energy
    }

    pub fn work(&self) -> f64 {
        self.work
    }

    /// Π = U − W
    pub fn residual(&self) -> f64 {
        self.residual
    }

    /// Vertical displacement of the child from the parent at each sample.
    pub fn displacement(&self) -> Vec<f64> {
        self.child_x
            .iter()
            .zip(&self.parent_x)
            .map(|(&xc, &xp)| self.child.height(xc) - self.parent.height(xp))
            .collect()
    }

    /// Recompute grid, strain, energy, work and Π for the current child.
    pub fn update(&mut self) {
        let s = self.grid.as_slice();
        self.child_x = self.child.x_from_arclength(s, 0.0);

        self.strain = self
            .child_x
            .iter()
            .zip(&self.parent_x)
            .map(|(&xc, &xp)| self.child.derivative(xc, 2) - self.parent.derivative(xp, 2))
            .collect();

        let ei = self.material.flexural_rigidity();
        self.energy_density = self.strain.iter().map(|b| 0.5 * ei * b * b).collect();
        self.strain_energy = trapz(&self.energy_density, s);

        let u = self.displacement();
        self.work = match self.load {
            PotentialLoad::Concentrated(p) => p * u.last().copied().unwrap_or(0.0),
            PotentialLoad::Distributed(q) => {
                let qu: Vec<f64> = u.iter().map(|v| q * v).collect();
                trapz(&qu, &self.child_x)
            }
        };
        self.residual = self.strain_energy - self.work;
    }

    /// Find the child chord whose arclength equals `target` (the undeformed
    /// arclength by default), searching `bracket` (half to one and a half
    /// parent chords by default). Snaps to the parent chord when within
    /// [`CHORD_SNAP_TOLERANCE`].
    pub fn update_chord(&mut self, target: Option<f64>, bracket: Option<(f64, f64)>) -> Result<f64> {
        let target = target.unwrap_or(self.arc_length);
        let parent_chord = self.parent.chord();
        let (lo, hi) = bracket.unwrap_or((0.5 * parent_chord, 1.5 * parent_chord));

        let mut probe = self.child.clone();
        let found = minimize_scalar(
            |c| {
                probe.set_chord(c);
                (target - probe.arclength(0.0, c).0).abs()
            },
            lo,
            hi,
            self.solver.scalar_tolerance,
        )?;

        let chord = if (found.x - parent_chord).abs() < CHORD_SNAP_TOLERANCE {
            parent_chord
        } else {
            found.x
        };
        self.child.set_chord(chord);
        Ok(chord)
    }

    /// One trial: set coefficients, fit the chord, recompute Π.
    pub fn evaluate_coefficients(&mut self, coefficients: &[f64]) -> Result<f64> {
        self.child.set_coefficients(coefficients);
        self.update_chord(None, None)?;
        self.update();
        Ok(self.residual)
    }

    /// Closed-form Euler–Bernoulli shape written into the child.
    ///
    /// Tip force P:       D = P/(6EI)  · [0, 0, 3L, −1]
    /// Uniform load q:    D = q/(24EI) · [0, 0, 6L², −4L, 1]
    pub fn analytical_solution(&mut self) -> Vec<f64> {
        let ei = self.material.flexural_rigidity();
        let l = self.parent.chord();
        let coefficients = match self.load {
            PotentialLoad::Concentrated(p) => {
                let k = p / (6.0 * ei);
                vec![0.0, 0.0, 3.0 * l * k, -k]
            }
            PotentialLoad::Distributed(q) => {
                let k = q / (24.0 * ei);
                vec![0.0, 0.0, 6.0 * l * l * k, -4.0 * l * k, k]
            }
        };
        self.child.set_coefficients(&coefficients);
        self.update();
        coefficients
    }

    /// Minimise Π over the free vector inside `±potential_bound`.
    pub fn minimize_potential<M: CoefficientMap + ?Sized>(
        &mut self,
        map: &M,
        x0: &[f64],
        control: &SolveControl,
    ) -> Result<PotentialReport> {
        let options = self.solver.clone();
        let bounds = Bounds::symmetric(x0.len(), options.potential_bound);
        let result = {
            let mut problem = PotentialProblem {
                solver: &mut *self,
                map,
            };
            minimize(&mut problem, x0, &bounds, &options, &ALSettings::default(), control)?
        };

        let coefficients = map.expand(&result.x);
        let residual = self.evaluate_coefficients(&coefficients)?;
        let status = SolveStatus::classify(result.converged, !residual.is_finite(), 0.0, f64::INFINITY);
        if status.is_converged() {
            info!(residual, chord = self.child.chord(), "potential minimised");
        } else {
            warn!(residual, ?status, "potential minimisation finished without converging");
        }

        Ok(PotentialReport {
            free: result.x,
            coefficients,
            residual,
            strain_energy: self.strain_energy,
            work: self.work,
            chord: self.child.chord(),
            status,
            iterations: result.iterations,
            trace: result.trace,
        })
    }
}

struct PotentialProblem<'m, G: Geometry, M: ?Sized> {
    solver: &'m mut PotentialEnergySolver<G>,
    map: &'m M,
}

impl<G: Geometry, M: CoefficientMap + ?Sized> OptimizationProblem for PotentialProblem<'_, G, M> {
    fn cost(&mut self, a: &[f64]) -> f64 {
        let coefficients = self.map.expand(a);
        // a failed chord fit ranks as the sentinel
        self.solver.evaluate_coefficients(&coefficients).unwrap_or(f64::NAN)
    }
}
