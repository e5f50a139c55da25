//! Bounded Levenberg–Marquardt least squares.
//!
//! Minimises `Σ r_i(p)²` for a small parameter vector `p` constrained to a box
//! `[lower, upper]`. Every voxel of a run calls this once, so the routine:
//!
//! - is deterministic (no randomness, fixed iteration order)
//! - never panics on bad data: non-finite residuals make a trial step fail
//!   and a non-finite start returns immediately with `converged = false`
//! - reports non-convergence instead of failing
//!
//! The Jacobian is estimated by forward differences (stepping backwards at the
//! upper bound) and the damped normal equations
//! `(JᵀJ + λ·diag(JᵀJ)) δ = -Jᵀr` are solved with nalgebra (Cholesky, LU
//! fallback). Trial points are projected back into the box.

use nalgebra::{DMatrix, DVector};

/// Tuning knobs for the optimiser.
#[derive(Debug, Clone)]
pub struct LmConfig {
    /// Maximum number of outer (Jacobian) iterations.
    pub max_iterations: usize,
    /// Stop when an accepted step lowers the cost by less than this fraction.
    pub ftol: f64,
    /// Stop when no parameter changes by more than this relative amount.
    pub xtol: f64,
    /// Stop once the cost falls below this absolute floor.
    pub cost_floor: f64,
    pub initial_lambda: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
    /// Give up searching for a better step once damping exceeds this.
    pub max_lambda: f64,
    /// Relative forward-difference step.
    pub diff_step: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            ftol: 1e-12,
            xtol: 1e-10,
            cost_floor: 1e-24,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
            max_lambda: 1e12,
            diff_step: 1e-7,
        }
    }
}

/// Result of a bounded L-M minimisation.
#[derive(Debug, Clone)]
pub struct LmResult {
    pub params: Vec<f64>,
    /// Final sum of squared residuals.
    pub cost: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Minimise the residual function `residuals(p)` inside `[lower, upper]`.
///
/// `start`, `lower` and `upper` must have equal lengths (the model schema
/// checks this once at construction).
pub fn minimize<F>(residuals: F, start: &[f64], lower: &[f64], upper: &[f64], config: &LmConfig) -> LmResult
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let n = start.len();
    let mut params: Vec<f64> = (0..n).map(|j| start[j].clamp(lower[j], upper[j])).collect();
    let mut r = residuals(&params);
    let mut cost = sum_of_squares(&r);

    if !cost.is_finite() {
        return LmResult {
            params,
            cost,
            iterations: 0,
            converged: false,
        };
    }
    if cost <= config.cost_floor {
        return LmResult {
            params,
            cost,
            iterations: 0,
            converged: true,
        };
    }

    let mut lambda = config.initial_lambda;
    let mut converged = false;
    let mut iterations = 0;

    while iterations < config.max_iterations {
        iterations += 1;

        let Some(jac) = jacobian(&residuals, &params, &r, upper, config.diff_step) else {
            break;
        };
        let jtj = jac.transpose() * &jac;
        let jtr = jac.transpose() * DVector::from_column_slice(&r);

        let mut accepted = None;
        while lambda < config.max_lambda {
            let mut damped = jtj.clone();
            for j in 0..n {
                damped[(j, j)] += lambda * jtj[(j, j)].max(1e-12);
            }
            let Some(delta) = solve(damped, -jtr.clone()) else {
                lambda *= config.lambda_up;
                continue;
            };

            let trial: Vec<f64> = (0..n)
                .map(|j| (params[j] + delta[j]).clamp(lower[j], upper[j]))
                .collect();
            let trial_r = residuals(&trial);
            let trial_cost = sum_of_squares(&trial_r);

            if trial_cost.is_finite() && trial_cost < cost {
                accepted = Some((trial, trial_r, trial_cost));
                lambda = (lambda * config.lambda_down).max(1e-12);
                break;
            }
            lambda *= config.lambda_up;
        }

        let Some((trial, trial_r, trial_cost)) = accepted else {
            // No damped step improves the cost: stationary to working precision.
            converged = true;
            break;
        };

        let step = trial
            .iter()
            .zip(params.iter())
            .map(|(&q, &p)| (q - p).abs() / (p.abs() + 1e-12))
            .fold(0.0_f64, f64::max);
        let decrease = (cost - trial_cost) / cost.max(f64::MIN_POSITIVE);

        params = trial;
        r = trial_r;
        cost = trial_cost;

        if decrease < config.ftol || step < config.xtol || cost <= config.cost_floor {
            converged = true;
            break;
        }
    }

    LmResult {
        params,
        cost,
        iterations,
        converged,
    }
}

pub fn sum_of_squares(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}

/// Root-sum-square of a residual vector.
pub fn rss_norm(values: &[f64]) -> f64 {
    sum_of_squares(values).sqrt()
}

fn jacobian<F>(residuals: &F, params: &[f64], r0: &[f64], upper: &[f64], rel_step: f64) -> Option<DMatrix<f64>>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let m = r0.len();
    let n = params.len();
    let mut jac = DMatrix::<f64>::zeros(m, n);
    let mut shifted = params.to_vec();
    for j in 0..n {
        let mut h = rel_step * params[j].abs().max(1e-3);
        if params[j] + h > upper[j] {
            h = -h;
        }
        shifted[j] = params[j] + h;
        let r1 = residuals(&shifted);
        shifted[j] = params[j];
        if r1.len() != m {
            return None;
        }
        for i in 0..m {
            let d = (r1[i] - r0[i]) / h;
            if !d.is_finite() {
                return None;
            }
            jac[(i, j)] = d;
        }
    }
    Some(jac)
}

fn solve(a: DMatrix<f64>, b: DVector<f64>) -> Option<DVector<f64>> {
    let x = match a.clone().cholesky() {
        Some(chol) => chol.solve(&b),
        None => a.lu().solve(&b)?,
    };
    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decay(p: &[f64], t: &[f64]) -> Vec<f64> {
        t.iter().map(|&t| p[0] * (-t / p[1]).exp()).collect()
    }

    #[test]
    fn recovers_exponential_decay() {
        let t: Vec<f64> = (0..12).map(|i| 0.01 * i as f64).collect();
        let y = decay(&[2.0, 0.04], &t);
        let res = minimize(
            |p| decay(p, &t).iter().zip(&y).map(|(s, y)| y - s).collect(),
            &[1.0, 0.1],
            &[0.0, 0.001],
            &[10.0, 1.0],
            &LmConfig::default(),
        );
        assert!(res.converged);
        assert!((res.params[0] - 2.0).abs() < 1e-4, "{:?}", res.params);
        assert!((res.params[1] - 0.04).abs() < 1e-6, "{:?}", res.params);
    }

    #[test]
    fn stays_inside_bounds() {
        let t: Vec<f64> = (0..8).map(|i| 0.01 * i as f64).collect();
        let y = decay(&[5.0, 0.04], &t);
        let res = minimize(
            |p| decay(p, &t).iter().zip(&y).map(|(s, y)| y - s).collect(),
            &[1.0, 0.04],
            &[0.0, 0.001],
            &[3.0, 1.0],
            &LmConfig::default(),
        );
        assert!(res.params[0] <= 3.0);
        assert!(res.params[1] >= 0.001 && res.params[1] <= 1.0);
    }

    #[test]
    fn non_finite_data_reports_non_convergence() {
        let res = minimize(
            |p| vec![f64::NAN - p[0]],
            &[1.0],
            &[0.0],
            &[2.0],
            &LmConfig::default(),
        );
        assert!(!res.converged);
        assert_eq!(res.iterations, 0);
        assert_eq!(res.params, vec![1.0]);
    }

    #[test]
    fn iteration_cap_is_respected() {
        let t: Vec<f64> = (0..12).map(|i| 0.01 * i as f64).collect();
        let y = decay(&[2.0, 0.04], &t);
        let config = LmConfig {
            max_iterations: 1,
            ..LmConfig::default()
        };
        let res = minimize(
            |p| decay(p, &t).iter().zip(&y).map(|(s, y)| y - s).collect(),
            &[1.0, 0.5],
            &[0.0, 0.001],
            &[10.0, 1.0],
            &config,
        );
        assert_eq!(res.iterations, 1);
        assert!(!res.converged);
    }
}
