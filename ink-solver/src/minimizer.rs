//! The numeric minimizer contract, and a default quasi-Newton implementation.

use faer::{ColRef, Mat};

use crate::{Config, error::MinimizerError};

/// Why the minimizer stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Found a local minimum (within tolerance).
    Converged,
    /// Ran out of iterations. The solution is not trustworthy.
    IterationLimit,
}

/// Result of a minimization.
#[derive(Clone, Debug, PartialEq)]
pub struct Minimum {
    /// Best point found, same length as the initial guess.
    pub solution: Vec<f64>,
    /// Why the minimizer stopped.
    pub stop: StopReason,
    /// How many iterations it took.
    pub iterations: usize,
}

/// Anything that can minimize a scalar function of N variables.
/// The solver calls this once per cluster per solve.
pub trait Minimizer {
    /// Find a local minimum of `f`, starting from `initial`.
    fn minimize(
        &mut self,
        f: &mut dyn FnMut(&[f64]) -> f64,
        initial: &[f64],
    ) -> Result<Minimum, MinimizerError>;
}

/// BFGS quasi-Newton minimizer with finite-difference gradients and a
/// backtracking line search.
#[derive(Clone, Copy, Debug, Default)]
pub struct Bfgs {
    config: Config,
}

impl Bfgs {
    /// A minimizer tuned by `config`.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Central-difference gradient.
    fn gradient(&self, f: &mut dyn FnMut(&[f64]) -> f64, x: &[f64]) -> Vec<f64> {
        let h = self.config.finite_difference_step;
        let mut probe = x.to_vec();
        (0..x.len())
            .map(|i| {
                probe[i] = x[i] + h;
                let forward = f(&probe);
                probe[i] = x[i] - h;
                let backward = f(&probe);
                probe[i] = x[i];
                (forward - backward) / (2.0 * h)
            })
            .collect()
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(a, b)| a * b).sum()
}

fn inf_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x.abs()).fold(0.0, libm::fmax)
}

fn all_finite(v: &[f64]) -> bool {
    v.iter().all(|x| x.is_finite())
}

impl Minimizer for Bfgs {
    fn minimize(
        &mut self,
        f: &mut dyn FnMut(&[f64]) -> f64,
        initial: &[f64],
    ) -> Result<Minimum, MinimizerError> {
        let n = initial.len();
        let mut x0 = initial.to_vec();
        let mut f0 = f(&x0);
        if !f0.is_finite() {
            return Err(MinimizerError::NonFiniteStart);
        }
        let mut g0 = self.gradient(f, &x0);
        // Approximate inverse Hessian.
        let mut h = Mat::<f64>::identity(n, n);

        for iteration in 0..self.config.max_iterations {
            if !all_finite(&g0) {
                return Err(MinimizerError::NonFiniteGradient);
            }
            if inf_norm(&g0) < self.config.gradient_tolerance {
                return Ok(Minimum {
                    solution: x0,
                    stop: StopReason::Converged,
                    iterations: iteration,
                });
            }

            let hg = h.as_ref() * ColRef::from_slice(&g0);
            let step: Vec<f64> = hg.iter().map(|v| -v).collect();
            if !all_finite(&step) {
                return Err(MinimizerError::NonFiniteStep);
            }
            let step_norm = inf_norm(&step);
            if step_norm < self.config.step_tolerance {
                return Ok(Minimum {
                    solution: x0,
                    stop: StopReason::Converged,
                    iterations: iteration,
                });
            }

            // Backtrack until the Armijo condition holds.
            let df0 = dot(&g0, &step);
            let mut t = 1.0;
            let mut s: Vec<f64> = step.clone();
            let mut x1: Vec<f64> = x0.clone();
            let mut f1 = f0;
            while t * step_norm >= self.config.step_tolerance {
                s = step.iter().map(|d| d * t).collect();
                x1 = x0.iter().zip(&s).map(|(x, s)| x + s).collect();
                f1 = f(&x1);
                if f1.is_finite() && f1 - f0 < 0.1 * t * df0 {
                    break;
                }
                t *= 0.5;
            }
            if t * step_norm < self.config.step_tolerance {
                return Ok(Minimum {
                    solution: x0,
                    stop: StopReason::Converged,
                    iterations: iteration,
                });
            }

            let g1 = self.gradient(f, &x1);
            let y: Vec<f64> = g1.iter().zip(&g0).map(|(a, b)| a - b).collect();
            let ys = dot(&y, &s);
            if ys.abs() > f64::EPSILON {
                let hy: Vec<f64> = (h.as_ref() * ColRef::from_slice(&y))
                    .iter()
                    .copied()
                    .collect();
                let yhy = dot(&y, &hy);
                let ss_scale = (ys + yhy) / (ys * ys);
                h = Mat::from_fn(n, n, |i, j| {
                    h[(i, j)] + ss_scale * s[i] * s[j] - (hy[i] * s[j] + s[i] * hy[j]) / ys
                });
            }

            x0 = x1;
            f0 = f1;
            g0 = g1;
        }
        Ok(Minimum {
            solution: x0,
            stop: StopReason::IterationLimit,
            iterations: self.config.max_iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::assert_nearly_eq;

    #[test]
    fn quadratic_bowl() {
        let mut f = |x: &[f64]| (x[0] - 3.0).powi(2) + 10.0 * (x[1] + 1.0).powi(2);
        let min = Bfgs::default().minimize(&mut f, &[0.0, 0.0]).unwrap();
        assert_eq!(min.stop, StopReason::Converged);
        assert!((min.solution[0] - 3.0).abs() < 1e-4);
        assert!((min.solution[1] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn rosenbrock() {
        let mut f = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let min = Bfgs::default().minimize(&mut f, &[-1.2, 1.0]).unwrap();
        assert_eq!(min.stop, StopReason::Converged);
        assert!((min.solution[0] - 1.0).abs() < 1e-3);
        assert!((min.solution[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn already_at_minimum() {
        let mut calls = 0;
        let mut f = |x: &[f64]| {
            calls += 1;
            x[0] * x[0]
        };
        let min = Bfgs::default().minimize(&mut f, &[0.0]).unwrap();
        assert_eq!(min.iterations, 0);
        assert_nearly_eq(min.solution[0], 0.0);
        // One evaluation plus a central-difference gradient.
        assert_eq!(calls, 3);
    }

    #[test]
    fn iteration_limit() {
        let config = Config {
            max_iterations: 1,
            ..Default::default()
        };
        let mut f = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let min = Bfgs::new(config).minimize(&mut f, &[-1.2, 1.0]).unwrap();
        assert_eq!(min.stop, StopReason::IterationLimit);
    }

    #[test]
    fn non_finite_start() {
        let mut f = |_: &[f64]| f64::NAN;
        assert_eq!(
            Bfgs::default().minimize(&mut f, &[1.0]),
            Err(MinimizerError::NonFiniteStart)
        );
    }
}
