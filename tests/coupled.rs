//! Coupled-skin tests: spar constraints, shear transfer and reaction links.

use aerobeam::types::*;
use aerobeam::{BeamModel, BeamOptions, CoupledBeamSystem, Polynomial, ReactionLink};
use approx::assert_relative_eq;

// ─────────────────────────────────────────────────────────────
//  Helpers
// ─────────────────────────────────────────────────────────────

fn skin(offset: f64, loads: LoadSpec) -> BeamModel<Polynomial> {
    BeamModel::new(
        &Polynomial::new(vec![offset, 0.0, 0.0, 0.0], 1.0),
        MaterialProperties::default(),
        loads,
        SampleGrid::uniform(0.0, 1.0, 21).unwrap(),
        BeamOptions::default(),
    )
    .unwrap()
}

fn tip_loaded() -> LoadSpec {
    LoadSpec::new().with_concentrated(ConcentratedLoad::fixed(1.0, 0.0, -0.01))
}

// ─────────────────────────────────────────────────────────────
//  Tests
// ─────────────────────────────────────────────────────────────

#[test]
fn undeformed_spars_are_satisfied() {
    let mut system =
        CoupledBeamSystem::new(skin(0.05, tip_loaded()), skin(-0.05, LoadSpec::new()), vec![0.5]).unwrap();
    let values = system.spar_constraints();
    assert_eq!(values.len(), 1);
    assert!(values[0].abs() < 1e-12);
    assert_relative_eq!(system.spar_directions()[0][1], 1.0, epsilon = 1e-12);
    assert!(system.state().spar_values[0].abs() < 1e-12);
}

#[test]
fn spar_off_grid_is_rejected() {
    let err = CoupledBeamSystem::new(skin(0.05, LoadSpec::new()), skin(-0.05, LoadSpec::new()), vec![0.33])
        .unwrap_err();
    assert!(matches!(err, BeamError::InvalidSampleLookup { .. }));
}

#[test]
fn mismatched_roots_are_rejected() {
    let lower = BeamModel::new(
        &Polynomial::new(vec![-0.05, 0.0, 0.0, 0.0], 1.0),
        MaterialProperties::default(),
        LoadSpec::new(),
        SampleGrid::uniform(0.0, 1.0, 21).unwrap(),
        BeamOptions {
            origin: 0.1,
            ..BeamOptions::default()
        },
    )
    .unwrap();
    let err = CoupledBeamSystem::new(skin(0.05, LoadSpec::new()), lower, vec![0.5]).unwrap_err();
    assert!(matches!(err, BeamError::IncompatibleBeams(_)));
}

#[test]
fn spar_link_creates_upper_load_entry() {
    let system =
        CoupledBeamSystem::new(skin(0.05, tip_loaded()), skin(-0.05, LoadSpec::new()), vec![0.5]).unwrap();
    let loads = &system.upper().loads().concentrated;
    assert_eq!(loads.len(), 2);
    assert_relative_eq!(loads[1].s, 0.5, epsilon = 1e-15);
    assert_eq!(loads[1].force, [0.0, 0.0]);
    assert_eq!(system.upper().load_indices(), &[20, 10]);
}

#[test]
fn resultant_is_lower_shear_along_its_tangent() {
    let mut system =
        CoupledBeamSystem::new(skin(0.05, tip_loaded()), skin(-0.05, LoadSpec::new()), vec![0.5]).unwrap();
    let a = 0.5;
    system.evaluate(&[0.05, 0.0, 0.0, 0.0], &[-0.05, 0.0, a, 0.0]);

    let x = system.lower().state().x[10];
    // d/dx of 2a / (1 + 4a²x²)^{3/2}
    let shear = -24.0 * a.powi(3) * x * (1.0 + 4.0 * a * a * x * x).powf(-2.5);
    let slope = 2.0 * a * x;
    let norm = (1.0 + slope * slope).sqrt();
    let expected = [shear * slope / norm, -shear / norm];

    let r = system.reactions()[0];
    assert_relative_eq!(r[0], expected[0], max_relative = 1e-4);
    assert_relative_eq!(r[1], expected[1], max_relative = 1e-4);
    let applied = system.upper().loads().concentrated[1].force;
    assert_eq!(applied, r);
}

#[test]
fn explicit_link_adds_to_existing_tip_load() {
    let mut system =
        CoupledBeamSystem::new(skin(0.05, tip_loaded()), skin(-0.05, LoadSpec::new()), vec![0.5])
            .unwrap()
            .with_reaction_links(&[ReactionLink { lower_s: 0.5, upper_s: 1.0 }])
            .unwrap();
    system.evaluate(&[0.05, 0.0, 0.0, 0.0], &[-0.05, 0.0, 0.5, 0.0]);
    let r = system.reactions()[0];
    let tip = system.upper().loads().concentrated[0].force;
    assert_relative_eq!(tip[0], r[0], epsilon = 1e-15);
    assert_relative_eq!(tip[1], -0.01 + r[1], epsilon = 1e-15);
    // the default spar link was dropped and its entry restored
    assert_eq!(system.upper().loads().concentrated[1].force, [0.0, 0.0]);
}

#[test]
fn combined_objective_sums_residuals() {
    let mut system =
        CoupledBeamSystem::new(skin(0.05, tip_loaded()), skin(-0.05, tip_loaded()), vec![0.5]).unwrap();
    let upper_only = system.evaluate(&[0.05, 0.0, 0.0, 0.0], &[-0.05, 0.0, 0.0, 0.0]);
    system.set_solver_options(SolverOptions {
        coupled_objective: CoupledObjective::Combined,
        ..SolverOptions::default()
    });
    let combined = system.evaluate(&[0.05, 0.0, 0.0, 0.0], &[-0.05, 0.0, 0.0, 0.0]);
    assert_relative_eq!(combined, upper_only + system.lower().state().residual, epsilon = 1e-14);
    assert!(combined > upper_only);
}
