//! Single-beam tests: moment assembly, the fixed-point loop and the
//! coefficient search on straight and singular-ended cantilevers.

use aerobeam::types::*;
use aerobeam::{BeamModel, BeamOptions, CoefficientLayout, Geometry, Polynomial, SolveControl};
use approx::assert_relative_eq;

// ─────────────────────────────────────────────────────────────
//  Helpers
// ─────────────────────────────────────────────────────────────

fn cantilever(p: f64, n: usize) -> BeamModel<Polynomial> {
    let loads = LoadSpec::new().with_concentrated(ConcentratedLoad::fixed(1.0, 0.0, p));
    BeamModel::new(
        &Polynomial::straight(1.0, 3),
        MaterialProperties::default(),
        loads,
        SampleGrid::uniform(0.0, 1.0, n).unwrap(),
        BeamOptions::default(),
    )
    .unwrap()
}

/// Straight beam whose derivatives are undefined exactly at both ends.
#[derive(Debug, Clone)]
struct SingularEnds(Polynomial);

impl Geometry for SingularEnds {
    fn coefficients(&self) -> &[f64] {
        self.0.coefficients()
    }
    fn set_coefficients(&mut self, coefficients: &[f64]) {
        self.0.set_coefficients(coefficients)
    }
    fn chord(&self) -> f64 {
        self.0.chord()
    }
    fn set_chord(&mut self, chord: f64) {
        self.0.set_chord(chord)
    }
    fn height(&self, x: f64) -> f64 {
        self.0.height(x)
    }
    fn derivative(&self, x: f64, order: u8) -> f64 {
        if x == 0.0 || x == self.0.chord() {
            f64::NAN
        } else {
            self.0.derivative(x, order)
        }
    }
}

// ─────────────────────────────────────────────────────────────
//  Tests
// ─────────────────────────────────────────────────────────────

#[test]
fn tip_load_moment_is_linear() {
    let mut beam = cantilever(-1.0, 11);
    beam.compute_moment();
    let m = &beam.state().moment;
    assert_relative_eq!(m[0], -1.0, epsilon = 1e-12);
    assert_relative_eq!(m[5], -0.5, epsilon = 1e-12);
    assert_eq!(m[10], 0.0);
}

#[test]
fn horizontal_force_uses_vertical_arm() {
    let loads = LoadSpec::new().with_concentrated(ConcentratedLoad::fixed(1.0, 2.0, 0.0));
    let mut beam = BeamModel::new(
        &Polynomial::new(vec![0.0, 0.0, 0.5], 1.0),
        MaterialProperties::default(),
        loads,
        SampleGrid::uniform(0.0, 1.0, 5).unwrap(),
        BeamOptions::default(),
    )
    .unwrap();
    beam.compute_moment();
    let tip = beam.state().tip();
    let m0 = beam.state().moment[0];
    assert_relative_eq!(m0, -(tip[1] - beam.state().y[0]) * 2.0, epsilon = 1e-12);
}

#[test]
fn uniform_distributed_load_moment() {
    let loads = LoadSpec::new().with_distributed(DistributedLoad::uniform(-1.0), false);
    let mut beam = BeamModel::new(
        &Polynomial::straight(1.0, 4),
        MaterialProperties::default(),
        loads,
        SampleGrid::uniform(0.0, 1.0, 101).unwrap(),
        BeamOptions::default(),
    )
    .unwrap();
    beam.compute_moment();
    // M(0) = −qL²/2
    assert_relative_eq!(beam.state().moment[0], -0.5, epsilon = 1e-10);
}

#[test]
fn torque_adds_everywhere() {
    let loads = LoadSpec::new().with_torque(0.25);
    let mut beam = BeamModel::new(
        &Polynomial::straight(1.0, 3),
        MaterialProperties::default(),
        loads,
        SampleGrid::uniform(0.0, 1.0, 5).unwrap(),
        BeamOptions::default(),
    )
    .unwrap();
    beam.compute_moment();
    assert!(beam.state().moment.iter().all(|&m| m == 0.25));
}

#[test]
fn unmatched_load_arclength_is_rejected() {
    let loads = LoadSpec::new().with_concentrated(ConcentratedLoad::fixed(0.55, 0.0, -1.0));
    let err = BeamModel::new(
        &Polynomial::straight(1.0, 3),
        MaterialProperties::default(),
        loads,
        SampleGrid::uniform(0.0, 1.0, 11).unwrap(),
        BeamOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, BeamError::InvalidSampleLookup { .. }));
}

#[test]
fn zero_stiffness_is_rejected() {
    let material = MaterialProperties { young: 0.0, ..MaterialProperties::default() };
    let err = BeamModel::new(
        &Polynomial::straight(1.0, 3),
        material,
        LoadSpec::new(),
        SampleGrid::uniform(0.0, 1.0, 11).unwrap(),
        BeamOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, BeamError::InvalidMaterial(_)));
}

#[test]
fn small_load_fixed_point_matches_euler_bernoulli() {
    let p = -0.01;
    let mut beam = cantilever(p, 51);
    let report = beam.iterative_solve(&SolveControl::unbounded()).unwrap();
    assert!(report.delta < 1e-8);
    assert_eq!(report.trace.len(), report.iterations);
    let tip = beam.state().tip();
    assert_relative_eq!(tip[1], p / 3.0, max_relative = 1e-3);
}

#[test]
fn converged_state_is_a_fixed_point() {
    let mut beam = cantilever(-0.5, 31);
    let control = SolveControl::unbounded();
    beam.iterative_solve(&control).unwrap();
    let before = beam.state().clone();
    let again = beam.refine(&control).unwrap();
    assert_eq!(again.iterations, 1);
    for (a, b) in beam.state().x.iter().zip(&before.x) {
        assert!((a - b).abs() < 1e-8);
    }
    for (a, b) in beam.state().y.iter().zip(&before.y) {
        assert!((a - b).abs() < 1e-8);
    }
}

/// Length of the deformed polyline through the sampled (x, y).
fn polyline_length(state: &BeamState) -> f64 {
    state
        .x
        .windows(2)
        .zip(state.y.windows(2))
        .map(|(x, y)| (x[1] - x[0]).hypot(y[1] - y[0]))
        .sum()
}

#[test]
fn fixed_point_preserves_arclength() {
    for p in [-0.1, -0.5, -1.0] {
        let mut beam = cantilever(p, 201);
        beam.iterative_solve(&SolveControl::unbounded()).unwrap();
        let length = polyline_length(beam.state());
        assert_relative_eq!(length, 1.0, max_relative = 1e-4);
        assert!(beam.state().tip()[0] < 1.0);
    }
}

#[test]
fn unit_tip_load_large_rotation() {
    let mut beam = cantilever(-1.0, 51);
    beam.iterative_solve(&SolveControl::unbounded()).unwrap();
    let tip = beam.state().tip();
    // elastica tip for PL²/EI = 1 sits near (0.944, −0.302)
    assert!((tip[0] - 0.944).abs() < 5e-3, "tip x {}", tip[0]);
    assert!((tip[1] + 0.302).abs() < 5e-3, "tip y {}", tip[1]);
}

#[test]
fn divergent_rotation_is_reported() {
    let mut beam = cantilever(-10.0, 21);
    let err = beam.iterative_solve(&SolveControl::unbounded()).unwrap_err();
    assert!(matches!(err, BeamError::NumericDivergence { .. }));
}

#[test]
fn iteration_cap_is_reported() {
    let mut beam = cantilever(-0.5, 21);
    beam.set_solver_options(SolverOptions {
        max_fixed_point_iters: 2,
        ..SolverOptions::default()
    });
    let err = beam.iterative_solve(&SolveControl::unbounded()).unwrap_err();
    assert!(matches!(err, BeamError::NonConvergence { iterations: 2, .. }));
}

#[test]
fn exact_euler_bernoulli_coefficients_give_small_residual() {
    let p = -0.01;
    let mut beam = cantilever(p, 51);
    let undeformed = beam.evaluate_coefficients(&[0.0; 4]);
    let exact = beam.evaluate_coefficients(&[0.0, 0.0, p / 2.0, -p / 6.0]);
    assert!(exact < 1e-2 * undeformed);
    assert!(!beam.state().diverged);
}

#[test]
fn parameterized_solve_recovers_cantilever_shape() {
    let p = -0.01;
    let mut beam = cantilever(p, 51);
    let layout = CoefficientLayout::clamped_root(4);
    let report = beam
        .parameterized_solve(
            &layout,
            &[0.0, 0.0],
            &[],
            &ALSettings::default(),
            &SolveControl::unbounded(),
        )
        .unwrap();
    assert_eq!(report.coefficients[0], 0.0);
    assert_eq!(report.coefficients[1], 0.0);
    assert!(report.residual.is_finite());
    assert!(report.free.iter().all(|v| v.abs() <= 0.2));
    assert_eq!(beam.child().coefficients(), report.coefficients.as_slice());
    let tip = beam.state().tip();
    assert_relative_eq!(tip[1], p / 3.0, max_relative = 1e-3);
}

#[test]
fn child_grid_preserves_arclength() {
    let mut beam = cantilever(-0.01, 21);
    beam.evaluate_coefficients(&[0.0, 0.0, -0.3, 0.1]);
    let x_tip = beam.state().tip()[0];
    let (length, _) = beam.child().arclength(0.0, x_tip);
    assert_relative_eq!(length, 1.0, epsilon = 1e-6);
}

#[test]
fn singular_ends_without_guard_hit_sentinel() {
    let geometry = SingularEnds(Polynomial::straight(1.0, 3));
    let loads = LoadSpec::new().with_concentrated(ConcentratedLoad::fixed(1.0, 0.0, -0.01));
    let mut beam = BeamModel::new(
        &geometry,
        MaterialProperties::default(),
        loads,
        SampleGrid::uniform(0.0, 1.0, 11).unwrap(),
        BeamOptions::default(),
    )
    .unwrap();
    let r = beam.evaluate_coefficients(&[0.0; 4]);
    assert_eq!(r, SENTINEL_RESIDUAL);
    assert!(beam.state().diverged);
}

#[test]
fn ignore_ends_guards_singular_endpoints() {
    let geometry = SingularEnds(Polynomial::straight(1.0, 3));
    let loads = LoadSpec::new().with_concentrated(ConcentratedLoad::fixed(1.0, 0.0, -0.01));
    let mut beam = BeamModel::new(
        &geometry,
        MaterialProperties::default(),
        loads,
        SampleGrid::uniform(0.0, 1.0, 11).unwrap(),
        BeamOptions {
            ignore_ends: true,
            ..BeamOptions::default()
        },
    )
    .unwrap();
    assert_eq!(beam.grid().len(), 13);
    assert_relative_eq!(beam.grid().as_slice()[1], 1e-6);
    assert_relative_eq!(beam.grid().as_slice()[11], 1.0 - 1e-6);
    // the tip load still resolves to the last sample
    assert_eq!(beam.load_indices(), &[12]);
    let r = beam.evaluate_coefficients(&[0.0; 4]);
    assert!(r.is_finite());
    assert!(!beam.state().diverged);
}

#[test]
fn follower_load_turns_with_the_tip() {
    let options = BeamOptions {
        rotated: true,
        ..BeamOptions::default()
    };
    let grid = SampleGrid::uniform(0.0, 1.0, 31).unwrap();
    let fixed = LoadSpec::new().with_concentrated(ConcentratedLoad::fixed(1.0, 0.0, -0.5));
    let follower = LoadSpec::new().with_concentrated(ConcentratedLoad::follower(1.0, 0.0, -0.5));
    let geometry = Polynomial::straight(1.0, 3);
    let control = SolveControl::unbounded();

    let mut a = BeamModel::new(&geometry, MaterialProperties::default(), fixed, grid.clone(), options).unwrap();
    let mut b = BeamModel::new(&geometry, MaterialProperties::default(), follower, grid, options).unwrap();
    a.iterative_solve(&control).unwrap();
    b.iterative_solve(&control).unwrap();
    // the follower keeps acting normal to the bent tip, so it bends more
    assert!(b.state().tip()[1] < a.state().tip()[1]);
}
