//! Numerical integration used by the beam engine.
//!
//! Sampled data is integrated with the trapezoidal rule (`trapz`,
//! `cumtrapz`); smooth integrands given as closures go through an adaptive
//! Gauss–Legendre rule that never evaluates the interval endpoints, so a
//! geometry whose derivative blows up exactly at `x = 0` or at the chord
//! still integrates.

// 5-point Gauss–Legendre nodes and weights on [-1, 1]
const GL_NODES: [f64; 5] = [
    -0.906_179_845_938_664_0,
    -0.538_469_310_105_683_1,
    0.0,
    0.538_469_310_105_683_1,
    0.906_179_845_938_664_0,
];
const GL_WEIGHTS: [f64; 5] = [
    0.236_926_885_056_189_1,
    0.478_628_670_499_366_5,
    0.568_888_888_888_888_9,
    0.478_628_670_499_366_5,
    0.236_926_885_056_189_1,
];

const GL_MAX_DEPTH: u32 = 40;

/// Trapezoidal integral of samples `y` over abscissae `x`.
///
/// Fewer than two samples integrate to zero. Lengths must agree; the
/// shorter one wins otherwise.
pub fn trapz(y: &[f64], x: &[f64]) -> f64 {
    let n = y.len().min(x.len());
    if n < 2 {
        return 0.0;
    }
    (0..n - 1)
        .map(|k| 0.5 * (x[k + 1] - x[k]) * (y[k] + y[k + 1]))
        .sum()
}

/// Running trapezoidal integral: `out[i] = trapz(y[..=i], x[..=i])`.
pub fn cumtrapz(y: &[f64], x: &[f64]) -> Vec<f64> {
    let n = y.len().min(x.len());
    let mut out = Vec::with_capacity(n);
    let mut acc = 0.0;
    for k in 0..n {
        if k > 0 {
            acc += 0.5 * (x[k] - x[k - 1]) * (y[k] + y[k - 1]);
        }
        out.push(acc);
    }
    out
}

fn gl_panel<F: FnMut(f64) -> f64>(f: &mut F, a: f64, b: f64) -> f64 {
    let half = 0.5 * (b - a);
    let mid = 0.5 * (a + b);
    GL_NODES
        .iter()
        .zip(GL_WEIGHTS.iter())
        .map(|(&t, &w)| w * f(mid + half * t))
        .sum::<f64>()
        * half
}

fn gl_adaptive<F: FnMut(f64) -> f64>(
    f: &mut F,
    a: f64,
    b: f64,
    whole: f64,
    tol: f64,
    depth: u32,
) -> (f64, f64) {
    let mid = 0.5 * (a + b);
    let left = gl_panel(f, a, mid);
    let right = gl_panel(f, mid, b);
    let refined = left + right;
    let err = (refined - whole).abs();
    if err <= tol || depth >= GL_MAX_DEPTH || !refined.is_finite() || mid <= a || mid >= b {
        return (refined, err);
    }
    let (l, el) = gl_adaptive(f, a, mid, left, 0.5 * tol, depth + 1);
    let (r, er) = gl_adaptive(f, mid, b, right, 0.5 * tol, depth + 1);
    (l + r, el + er)
}

/// Adaptive Gauss–Legendre integral of `f` over `[a, b]`.
///
/// Returns `(value, error_estimate)`. The rule is open: `f(a)` and `f(b)`
/// are never evaluated. A reversed interval yields the negated integral.
pub fn gauss_legendre<F: FnMut(f64) -> f64>(mut f: F, a: f64, b: f64, tol: f64) -> (f64, f64) {
    if a == b {
        return (0.0, 0.0);
    }
    if b < a {
        let (v, e) = gauss_legendre(f, b, a, tol);
        return (-v, e);
    }
    let whole = gl_panel(&mut f, a, b);
    gl_adaptive(&mut f, a, b, whole, tol.max(f64::EPSILON), 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn trapz_is_exact_for_linear_data() {
        let x = [0.0, 0.25, 0.5, 1.0];
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        assert_relative_eq!(trapz(&y, &x), 2.0, epsilon = 1e-14);
        assert_eq!(trapz(&[3.0], &[0.0]), 0.0);
    }

    #[test]
    fn cumtrapz_matches_prefix_trapz() {
        let x: Vec<f64> = (0..11).map(|k| k as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|v| v * v).collect();
        let c = cumtrapz(&y, &x);
        assert_eq!(c.len(), 11);
        assert_eq!(c[0], 0.0);
        for i in 1..11 {
            assert_relative_eq!(c[i], trapz(&y[..=i], &x[..=i]), epsilon = 1e-14);
        }
    }

    #[test]
    fn gauss_legendre_integrates_smooth_functions() {
        let (v, err) = gauss_legendre(|x: f64| x.sin(), 0.0, std::f64::consts::PI, 1e-12);
        assert_relative_eq!(v, 2.0, epsilon = 1e-10);
        assert!(err < 1e-8);

        let (v, _) = gauss_legendre(|x| x * x, 1.0, 0.0, 1e-12);
        assert_relative_eq!(v, -1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn gauss_legendre_skips_endpoint_singularities() {
        // 1/sqrt(x) is infinite at 0; integral over [0, 1] is 2
        let (v, _) = gauss_legendre(
            |x: f64| if x == 0.0 { f64::NAN } else { 1.0 / x.sqrt() },
            0.0,
            1.0,
            1e-10,
        );
        assert!(v.is_finite());
        assert_relative_eq!(v, 2.0, epsilon = 1e-3);
    }
}
