//! **aerobeam**: finite-rotation curvilinear beam statics with
//! spar-coupled airfoil skins.
//!
//! This crate implements the complete equilibrium pipeline:
//!
//! 1. **Geometry** (`geometry`): parametric centrelines, curvature, arclength.
//! 2. **Quadrature** (`quadrature`): trapezoidal and adaptive Gauss–Legendre rules.
//! 3. **Beam** (`beam`): moment, rotation, arclength-preserving re-gridding,
//!    fixed-point and coefficient-search solves.
//! 4. **Coupled** (`coupled`): upper/lower skins tied by spar constraints and
//!    shear transfer.
//! 5. **Potential** (`potential`): minimum total potential energy solve.
//! 6. **Optimiser** (`optimizer`): Nelder–Mead / L-BFGS / Brent via `argmin`,
//!    augmented Lagrangian constraints.
//! 7. **Config** (`config`): JSON solver settings.

pub mod types;
pub mod geometry;
pub mod quadrature;
pub mod objectives;
pub mod gradients;
pub mod optimizer;
pub mod layout;
pub mod control;
pub mod beam;
pub mod coupled;
pub mod potential;
pub mod config;

pub use beam::{BeamModel, BeamOptions};
pub use control::SolveControl;
pub use coupled::{CoupledBeamSystem, CoupledState, ReactionLink};
pub use geometry::{Geometry, Polynomial, RotationAngles};
pub use layout::{CoefficientLayout, CoefficientMap, JointCoefficientMap, JointLayout};
pub use potential::{PotentialEnergySolver, PotentialLoad};
pub use types::{BeamError, Result};
