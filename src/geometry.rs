//! Parametric beam centrelines.
//!
//! The engine only needs a handful of capabilities from a curve: its
//! height and first two derivatives, its chord, and a mutable coefficient
//! vector. Everything else (curvature, arclength, inverse arclength,
//! tangent direction cosines) is provided on top of those.

use crate::quadrature::gauss_legendre;
use serde::{Deserialize, Serialize};
use std::fmt;

const ARCLENGTH_TOLERANCE: f64 = 1e-12;
const INVERSE_ARCLENGTH_MAX_ITERS: usize = 100;

/// Direction cosines of the local tangent at each sample.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RotationAngles {
    pub sin: Vec<f64>,
    pub cos: Vec<f64>,
}

impl RotationAngles {
    /// From tangent slopes `dy/dx`.
    pub fn from_slopes(slopes: impl IntoIterator<Item = f64>) -> Self {
        let (sin, cos) = slopes
            .into_iter()
            .map(|p| {
                let norm = (1.0 + p * p).sqrt();
                (p / norm, 1.0 / norm)
            })
            .unzip();
        Self { sin, cos }
    }

    /// From the rotation proxy G of the fixed-point loop (sin θ = G).
    pub fn from_rotation(g: &[f64]) -> Self {
        Self {
            sin: g.to_vec(),
            cos: g.iter().map(|v| (1.0 - v * v).sqrt()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.sin.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sin.is_empty()
    }
}

/// A planar curve `y(x)` on `[origin, chord]` driven by a coefficient vector.
///
/// `derivative` may return NaN or ±∞ at the domain boundary; callers
/// guard against that (see `BeamOptions::ignore_ends`).
pub trait Geometry: Clone + fmt::Debug {
    fn coefficients(&self) -> &[f64];

    fn set_coefficients(&mut self, coefficients: &[f64]);

    fn chord(&self) -> f64;

    fn set_chord(&mut self, chord: f64);

    fn height(&self, x: f64) -> f64;

    /// `order` 1 or 2. Other orders yield NaN.
    fn derivative(&self, x: f64, order: u8) -> f64;

    /// ρ = y'' / (1 + y'²)^{3/2}
    fn curvature_at(&self, x: f64) -> f64 {
        let dy = self.derivative(x, 1);
        let ddy = self.derivative(x, 2);
        ddy / (1.0 + dy * dy).powf(1.5)
    }

    fn curvature(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.curvature_at(x)).collect()
    }

    /// Arclength between `from` and `to`, with its quadrature error estimate.
    fn arclength(&self, from: f64, to: f64) -> (f64, f64) {
        gauss_legendre(
            |x| {
                let dy = self.derivative(x, 1);
                (1.0 + dy * dy).sqrt()
            },
            from,
            to,
            ARCLENGTH_TOLERANCE,
        )
    }

    /// Invert the arclength map: for every `s[i]` (measured from `origin`)
    /// find `x[i]` with `arclength(origin, x[i]) = s[i]`.
    ///
    /// Samples are solved in order, each one from the previous root.
    /// Newton steps on `ds/dx = √(1 + y'²)` are used while they stay in the
    /// bracket `[x_prev, x_prev + Δs]`; bisection otherwise.
    fn x_from_arclength(&self, s: &[f64], origin: f64) -> Vec<f64> {
        let mut out = Vec::with_capacity(s.len());
        let mut x_prev = origin;
        let mut s_prev = 0.0;
        for &target in s {
            let gap = target - s_prev;
            if gap.abs() <= ARCLENGTH_TOLERANCE {
                out.push(x_prev);
                continue;
            }
            // the curve is at least as long as its projection, so the root
            // lies between x_prev and x_prev + gap
            let (mut lo, mut hi) = if gap > 0.0 {
                (x_prev, x_prev + gap)
            } else {
                (x_prev + gap, x_prev)
            };
            let residual = |x: f64| self.arclength(x_prev, x).0 - gap;
            let mut x = hi.min(lo.max(x_prev + gap));
            for _ in 0..INVERSE_ARCLENGTH_MAX_ITERS {
                let f = residual(x);
                if !f.is_finite() {
                    x = f64::NAN;
                    break;
                }
                if f.abs() <= ARCLENGTH_TOLERANCE {
                    break;
                }
                if f > 0.0 {
                    hi = x;
                } else {
                    lo = x;
                }
                let dy = self.derivative(x, 1);
                let slope = (1.0 + dy * dy).sqrt();
                let newton = x - f / slope;
                x = if newton.is_finite() && newton > lo && newton < hi {
                    newton
                } else {
                    0.5 * (lo + hi)
                };
                if hi - lo <= f64::EPSILON * x.abs().max(1.0) {
                    break;
                }
            }
            out.push(x);
            x_prev = x;
            s_prev = target;
        }
        out
    }

    fn rotation_angles(&self, xs: &[f64]) -> RotationAngles {
        RotationAngles::from_slopes(xs.iter().map(|&x| self.derivative(x, 1)))
    }
}

/// `y(x) = Σ D_k x^k` on `[0, chord]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polynomial {
    coefficients: Vec<f64>,
    chord: f64,
}

impl Polynomial {
    pub fn new(coefficients: Vec<f64>, chord: f64) -> Self {
        Self { coefficients, chord }
    }

    /// Straight beam of length `chord` along +x.
    pub fn straight(chord: f64, degree: usize) -> Self {
        Self::new(vec![0.0; degree + 1], chord)
    }

    fn horner(coefficients: &[f64], x: f64) -> f64 {
        coefficients.iter().rev().fold(0.0, |acc, &d| acc * x + d)
    }
}

impl Geometry for Polynomial {
    fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    fn set_coefficients(&mut self, coefficients: &[f64]) {
        self.coefficients = coefficients.to_vec();
    }

    fn chord(&self) -> f64 {
        self.chord
    }

    fn set_chord(&mut self, chord: f64) {
        self.chord = chord;
    }

    fn height(&self, x: f64) -> f64 {
        Self::horner(&self.coefficients, x)
    }

    fn derivative(&self, x: f64, order: u8) -> f64 {
        match order {
            1 => {
                let d1: Vec<f64> = self
                    .coefficients
                    .iter()
                    .enumerate()
                    .skip(1)
                    .map(|(k, &d)| k as f64 * d)
                    .collect();
                Self::horner(&d1, x)
            }
            2 => {
                let d2: Vec<f64> = self
                    .coefficients
                    .iter()
                    .enumerate()
                    .skip(2)
                    .map(|(k, &d)| (k * (k - 1)) as f64 * d)
                    .collect();
                Self::horner(&d2, x)
            }
            _ => f64::NAN,
        }
    }
}
