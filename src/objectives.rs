//! Penalty terms layered on top of a raw residual.
//!
//! The beam objectives themselves live with their models (`beam`,
//! `coupled`, `potential`); what is shared is the machinery that turns
//! them into an unconstrained problem for argmin: box projection with a
//! quadratic excess penalty and the augmented Lagrangian terms.

use crate::types::ALState;

/// Weight of the quadratic penalty on the distance between a trial point
/// and its projection onto the box.
pub const OUT_OF_BOUNDS_WEIGHT: f64 = 1e4;

// ─────────────────────────────────────────────────────────────
//  Bound penalties
// ─────────────────────────────────────────────────────────────

/// `w · ‖θ − clamp(θ)‖²`, zero inside the box.
///
/// The objective itself is evaluated at the clamped point, so this term
/// only steers the minimiser back inside.
pub fn bounds_penalty(theta: &[f64], clamped: &[f64]) -> f64 {
    OUT_OF_BOUNDS_WEIGHT
        * theta
            .iter()
            .zip(clamped)
            .map(|(t, c)| (t - c) * (t - c))
            .sum::<f64>()
}

// ─────────────────────────────────────────────────────────────
//  Augmented Lagrangian
// ─────────────────────────────────────────────────────────────

/// Equalities:   Σ_k λ_k h_k + (μ/2) h_k²
/// Inequalities: Σ_k (μ/2) [max(0, λ_k/μ + g_k)]²
pub fn augmented_lagrangian_penalty(h: &[f64], g: &[f64], al: &ALState) -> f64 {
    let mu = al.mu;
    let eq: f64 = h
        .iter()
        .zip(&al.equality)
        .map(|(&hk, &lk)| lk * hk + 0.5 * mu * hk * hk)
        .sum();
    let ineq: f64 = g
        .iter()
        .zip(&al.inequality)
        .map(|(&gk, &lk)| {
            let shifted = (lk / mu + gk).max(0.0);
            0.5 * mu * shifted * shifted
        })
        .sum();
    eq + ineq
}

/// Multiplier update after an inner solve.
///
///   λ_eq ← λ_eq + μ h
///   λ_in ← max(0, λ_in + μ g)
pub fn update_multipliers(al: &mut ALState, h: &[f64], g: &[f64]) {
    for (l, &hk) in al.equality.iter_mut().zip(h) {
        *l += al.mu * hk;
    }
    for (l, &gk) in al.inequality.iter_mut().zip(g) {
        *l = (*l + al.mu * gk).max(0.0);
    }
}

/// Violation of each constraint: |h_k| for equalities, g_k⁺ for inequalities.
pub fn constraint_violations(h: &[f64], g: &[f64]) -> Vec<f64> {
    h.iter()
        .map(|v| v.abs())
        .chain(g.iter().map(|v| v.max(0.0)))
        .collect()
}

/// Largest entry of `violations` (0 when empty). NaN propagates as ∞.
pub fn max_violation(violations: &[f64]) -> f64 {
    violations.iter().fold(0.0_f64, |m, &v| {
        if v.is_nan() {
            f64::INFINITY
        } else {
            m.max(v)
        }
    })
}
