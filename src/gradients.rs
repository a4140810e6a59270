//! Finite-difference derivatives.
//!
//! The beam residual runs a root-finding reparameterisation and a scalar
//! minimisation per trial point, so there is no closed-form gradient.
//! L-BFGS and the coupled load transfer use the difference quotients
//! below instead.

/// Which one-sided or central quotient to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DifferenceScheme {
    #[default]
    Central,
    Forward,
    Backward,
}

/// Derivative of a scalar function at `a` with step `h`.
pub fn derivative<F: FnMut(f64) -> f64>(mut f: F, a: f64, h: f64, scheme: DifferenceScheme) -> f64 {
    match scheme {
        DifferenceScheme::Central => (f(a + h) - f(a - h)) / (2.0 * h),
        DifferenceScheme::Forward => (f(a + h) - f(a)) / h,
        DifferenceScheme::Backward => (f(a) - f(a - h)) / h,
    }
}

/// Central-difference gradient of a fallible objective.
///
/// Coordinate `i` is perturbed by `step · max(1, |x_i|)`.
pub fn try_central_difference_gradient<E, F>(mut f: F, x: &[f64], step: f64) -> Result<Vec<f64>, E>
where
    F: FnMut(&[f64]) -> Result<f64, E>,
{
    let mut grad = vec![0.0; x.len()];
    let mut probe = x.to_vec();
    for i in 0..x.len() {
        let h = step * x[i].abs().max(1.0);
        probe[i] = x[i] + h;
        let fp = f(&probe)?;
        probe[i] = x[i] - h;
        let fm = f(&probe)?;
        probe[i] = x[i];
        grad[i] = (fp - fm) / (2.0 * h);
    }
    Ok(grad)
}

pub fn central_difference_gradient<F: FnMut(&[f64]) -> f64>(mut f: F, x: &[f64], step: f64) -> Vec<f64> {
    let result: Result<Vec<f64>, std::convert::Infallible> =
        try_central_difference_gradient(|p| Ok(f(p)), x, step);
    match result {
        Ok(g) => g,
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn schemes_on_a_cubic() {
        let f = |x: f64| x * x * x;
        let h = 1e-4;
        assert_relative_eq!(derivative(f, 2.0, h, DifferenceScheme::Central), 12.0, epsilon = 1e-7);
        assert_relative_eq!(derivative(f, 2.0, h, DifferenceScheme::Forward), 12.0, epsilon = 1e-2);
        assert_relative_eq!(derivative(f, 2.0, h, DifferenceScheme::Backward), 12.0, epsilon = 1e-2);
    }

    #[test]
    fn gradient_of_a_quadratic_form() {
        let f = |x: &[f64]| 3.0 * x[0] * x[0] + x[0] * x[1] - 2.0 * x[1];
        let g = central_difference_gradient(f, &[1.0, -2.0], 1e-6);
        assert_relative_eq!(g[0], 6.0 - 2.0, epsilon = 1e-6);
        assert_relative_eq!(g[1], 1.0 - 2.0, epsilon = 1e-6);
    }

    #[test]
    fn errors_short_circuit() {
        let r: Result<Vec<f64>, &str> =
            try_central_difference_gradient(|_| Err("boom"), &[0.0, 0.0], 1e-6);
        assert_eq!(r, Err("boom"));
    }
}
