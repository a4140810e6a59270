//! Finite-difference checks.
//!
//! Central differences stand in for analytic derivatives in two places:
//! the L-BFGS gradient of an objective and the shear estimate handed from
//! the lower to the upper skin. Both are compared here against closed
//! forms:
//!
//!     dΠ/dD_k     for the cubic cantilever energy
//!     d(EIρ)/dx   for a polynomial centreline
//!     dS/dx       for the arclength of a polynomial

use aerobeam::gradients::{central_difference_gradient, derivative, DifferenceScheme};
use aerobeam::types::*;
use aerobeam::{Geometry, Polynomial, PotentialEnergySolver, PotentialLoad};

// ─────────────────────────────────────────────────────────────
//  Helpers
// ─────────────────────────────────────────────────────────────

fn compare(label: &str, analytic: &[f64], fd: &[f64], tol_abs: f64, tol_rel: f64) {
    eprintln!("──────────────────────────────────────────────");
    eprintln!("FD check: {label}");
    for i in 0..analytic.len() {
        let abs_err = (analytic[i] - fd[i]).abs();
        let denom = fd[i].abs().max(analytic[i].abs()).max(1e-14);
        let rel_err = abs_err / denom;
        let flag = if abs_err > tol_abs && rel_err > tol_rel { " <<<" } else { "" };
        eprintln!(
            "  [{i}]  analytic={:+12.6e}  fd={:+12.6e}  abs={:.2e}  rel={:.2e}{flag}",
            analytic[i], fd[i], abs_err, rel_err,
        );
    }
    eprintln!("──────────────────────────────────────────────");

    for i in 0..analytic.len() {
        let abs_err = (analytic[i] - fd[i]).abs();
        let denom = fd[i].abs().max(analytic[i].abs()).max(1e-14);
        let rel_err = abs_err / denom;
        assert!(
            abs_err < tol_abs || rel_err < tol_rel,
            "Component {i}: analytic={:.8e}, fd={:.8e}, abs_err={:.3e}, rel_err={:.3e}",
            analytic[i], fd[i], abs_err, rel_err,
        );
    }
}

// ─────────────────────────────────────────────────────────────
//  Tests
// ─────────────────────────────────────────────────────────────

/// Π(D2, D3) = ½∫(2D2 + 6D3 x)² dx − P(D2 + D3) for a unit cantilever
/// (up to the chord correction, which is second order here).
#[test]
fn fd_potential_energy_gradient() {
    let p = -0.01;
    let straight = Polynomial::straight(1.0, 3);
    let mut solver = PotentialEnergySolver::new(
        &straight,
        &straight,
        MaterialProperties::default(),
        PotentialLoad::Concentrated(p),
        SampleGrid::uniform(0.0, 1.0, 201).unwrap(),
    )
    .unwrap();

    let a = [0.004, -0.002];
    let fd = central_difference_gradient(
        |v| solver.evaluate_coefficients(&[0.0, 0.0, v[0], v[1]]).unwrap(),
        &a,
        1e-6,
    );
    let analytic = [4.0 * a[0] + 6.0 * a[1] - p, 6.0 * a[0] + 12.0 * a[1] - p];
    compare("potential energy", &analytic, &fd, 1e-7, 1e-3);
}

/// The coupled load transfer differentiates EI·ρ along the lower skin.
#[test]
fn fd_shear_from_curvature() {
    // y = 0.2 x² − 0.1 x³
    let g = Polynomial::new(vec![0.0, 0.0, 0.2, -0.1], 1.0);
    let rho_prime = |x: f64| {
        let d1 = 0.4 * x - 0.3 * x * x;
        let d2 = 0.4 - 0.6 * x;
        let d3 = -0.6;
        let q = 1.0 + d1 * d1;
        d3 / q.powf(1.5) - 3.0 * d1 * d2 * d2 / q.powf(2.5)
    };

    let xs = [0.1, 0.35, 0.6, 0.9];
    let analytic: Vec<f64> = xs.iter().map(|&x| rho_prime(x)).collect();
    let central: Vec<f64> = xs
        .iter()
        .map(|&x| derivative(|v| g.curvature_at(v), x, DEFAULT_RESULTANT_STEP, DifferenceScheme::Central))
        .collect();
    compare("shear (central)", &analytic, &central, 1e-8, 1e-5);

    let forward: Vec<f64> = xs
        .iter()
        .map(|&x| derivative(|v| g.curvature_at(v), x, DEFAULT_RESULTANT_STEP, DifferenceScheme::Forward))
        .collect();
    compare("shear (forward)", &analytic, &forward, 1e-4, 1e-2);
}

/// dS/dx = √(1 + y'²)
#[test]
fn fd_arclength_rate() {
    let g = Polynomial::new(vec![0.0, 0.3, -0.4, 0.2], 1.0);
    let xs = [0.05, 0.5, 0.95];
    let analytic: Vec<f64> = xs
        .iter()
        .map(|&x| {
            let d = g.derivative(x, 1);
            (1.0 + d * d).sqrt()
        })
        .collect();
    let fd: Vec<f64> = xs
        .iter()
        .map(|&x| derivative(|v| g.arclength(0.0, v).0, x, 1e-5, DifferenceScheme::Central))
        .collect();
    compare("arclength rate", &analytic, &fd, 1e-8, 1e-7);
}
