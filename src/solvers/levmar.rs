//! Levenberg-Marquardt solver with box bounds
//!
//! Damped normal-equations least squares for two-parameter curve models.
//! Candidate steps are clamped into [lower, upper], so estimates stay
//! feasible throughout and a fit may legitimately terminate at a bound.
//!
//! Reference:
//! Marquardt, "An Algorithm for Least-Squares Estimation of Nonlinear
//! Parameters", J. SIAM 11(2), 1963.

/// Solver options
pub struct LevMarOptions {
    /// Maximum outer iterations
    pub max_iter: usize,
    /// Relative step-size tolerance for convergence
    pub xtol: f64,
    /// Relative cost-reduction tolerance for convergence
    pub ftol: f64,
    /// Initial damping factor
    pub lambda_init: f64,
    /// Damping multiplier after a rejected step
    pub lambda_up: f64,
    /// Damping multiplier after an accepted step
    pub lambda_down: f64,
    /// Damping ceiling; exceeding it without convergence is a failure
    pub lambda_max: f64,
}

impl Default for LevMarOptions {
    fn default() -> Self {
        LevMarOptions {
            max_iter: 100,
            xtol: 1e-8,
            ftol: 1e-8,
            lambda_init: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
            lambda_max: 1e10,
        }
    }
}

/// Result of a converged fit
pub struct LevMarFit {
    /// Fitted parameters, within [lower, upper]
    pub params: [f64; 2],
    /// Final sum of squared residuals
    pub cost: f64,
    /// Outer iterations used
    pub iterations: usize,
}

/// Fit a two-parameter model to observations by bounded Levenberg-Marquardt
///
/// Minimizes the sum of squared residuals between `model(t, params)` and
/// `ys` over the box [lower, upper]. The normal-equations diagonal is
/// damped by (1 + lambda); lambda rises on rejected steps and falls on
/// accepted ones.
///
/// # Arguments
/// * `model` - Model value at one sample point
/// * `jacobian` - Partial derivatives of the model at one sample point
/// * `ts` - Sample points (same length as `ys`, at least 2)
/// * `ys` - Observations
/// * `init` - Initial parameters (clamped into the bounds)
/// * `lower`, `upper` - Box bounds; each lower must be strictly below upper
/// * `opts` - Solver options
///
/// # Returns
/// The converged parameters, or an error on invalid bounds, non-finite
/// values, a singular system, or failure to converge.
pub fn levmar_fit_2<F, J>(
    model: F,
    jacobian: J,
    ts: &[f64],
    ys: &[f64],
    init: [f64; 2],
    lower: [f64; 2],
    upper: [f64; 2],
    opts: &LevMarOptions,
) -> Result<LevMarFit, String>
where
    F: Fn(f64, &[f64; 2]) -> f64,
    J: Fn(f64, &[f64; 2]) -> [f64; 2],
{
    if ts.len() != ys.len() {
        return Err(format!(
            "Sample/observation length mismatch: {} vs {}",
            ts.len(),
            ys.len()
        ));
    }
    if ts.len() < 2 {
        return Err(format!("Need at least 2 observations, got {}", ts.len()));
    }
    for i in 0..2 {
        if !(lower[i] < upper[i]) {
            return Err(format!(
                "Invalid bounds for parameter {}: [{}, {}]",
                i, lower[i], upper[i]
            ));
        }
    }
    if ys.iter().any(|y| !y.is_finite()) {
        return Err("Non-finite observation".to_string());
    }

    let cost_at = |p: &[f64; 2]| -> f64 {
        let mut sum = 0.0;
        for (&t, &y) in ts.iter().zip(ys.iter()) {
            let r = y - model(t, p);
            sum += r * r;
        }
        sum
    };

    let mut params = [
        init[0].clamp(lower[0], upper[0]),
        init[1].clamp(lower[1], upper[1]),
    ];
    let mut cost = cost_at(&params);
    if !cost.is_finite() {
        return Err("Non-finite model value at initial parameters".to_string());
    }
    if cost == 0.0 {
        return Ok(LevMarFit {
            params,
            cost,
            iterations: 0,
        });
    }

    let mut lambda = opts.lambda_init;

    for iter in 0..opts.max_iter {
        // Accumulate normal equations: JᵀJ (symmetric 2x2) and Jᵀr
        let mut h00 = 0.0;
        let mut h01 = 0.0;
        let mut h11 = 0.0;
        let mut g0 = 0.0;
        let mut g1 = 0.0;
        for (&t, &y) in ts.iter().zip(ys.iter()) {
            let row = jacobian(t, &params);
            let r = y - model(t, &params);
            if !row[0].is_finite() || !row[1].is_finite() || !r.is_finite() {
                return Err("Non-finite model value during iteration".to_string());
            }
            h00 += row[0] * row[0];
            h01 += row[0] * row[1];
            h11 += row[1] * row[1];
            g0 += row[0] * r;
            g1 += row[1] * r;
        }

        // Damped trial steps until one is accepted or the step collapses
        loop {
            let a00 = h00 * (1.0 + lambda);
            let a11 = h11 * (1.0 + lambda);
            let det = a00 * a11 - h01 * h01;

            if !det.is_finite() || det.abs() < 1e-20 {
                lambda *= opts.lambda_up;
                if lambda > opts.lambda_max {
                    return Err("Singular normal equations".to_string());
                }
                continue;
            }

            let d0 = (a11 * g0 - h01 * g1) / det;
            let d1 = (a00 * g1 - h01 * g0) / det;

            let candidate = [
                (params[0] + d0).clamp(lower[0], upper[0]),
                (params[1] + d1).clamp(lower[1], upper[1]),
            ];
            let step0 = candidate[0] - params[0];
            let step1 = candidate[1] - params[1];
            let step_small = step0.abs() < opts.xtol * params[0].abs().max(1.0)
                && step1.abs() < opts.xtol * params[1].abs().max(1.0);

            let new_cost = cost_at(&candidate);
            if new_cost.is_finite() && new_cost < cost {
                let reduction = cost - new_cost;
                let converged = step_small || reduction <= opts.ftol * cost;
                params = candidate;
                cost = new_cost;
                lambda *= opts.lambda_down;
                if converged {
                    return Ok(LevMarFit {
                        params,
                        cost,
                        iterations: iter + 1,
                    });
                }
                break;
            }

            // Rejected: a vanishing step that cannot improve means a
            // stationary point (possibly at a bound)
            if step_small {
                return Ok(LevMarFit {
                    params,
                    cost,
                    iterations: iter + 1,
                });
            }

            lambda *= opts.lambda_up;
            if lambda > opts.lambda_max {
                return Err("Did not converge (damping limit reached)".to_string());
            }
        }
    }

    Err(format!("Did not converge in {} iterations", opts.max_iter))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(t: f64, p: &[f64; 2]) -> f64 {
        p[0] * t + p[1]
    }

    fn line_jac(t: f64, _p: &[f64; 2]) -> [f64; 2] {
        [t, 1.0]
    }

    fn exp_decay(t: f64, p: &[f64; 2]) -> f64 {
        p[0] * (-t / p[1]).exp()
    }

    fn exp_decay_jac(t: f64, p: &[f64; 2]) -> [f64; 2] {
        let e = (-t / p[1]).exp();
        [e, p[0] * e * t / (p[1] * p[1])]
    }

    #[test]
    fn test_line_fit_exact() {
        let ts: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let ys: Vec<f64> = ts.iter().map(|&t| 2.0 * t + 1.0).collect();

        let fit = levmar_fit_2(
            line,
            line_jac,
            &ts,
            &ys,
            [1.0, 0.0],
            [-10.0, -10.0],
            [10.0, 10.0],
            &LevMarOptions::default(),
        )
        .unwrap();

        assert!((fit.params[0] - 2.0).abs() < 1e-6, "slope: {}", fit.params[0]);
        assert!((fit.params[1] - 1.0).abs() < 1e-6, "offset: {}", fit.params[1]);
        assert!(fit.cost < 1e-10);
    }

    #[test]
    fn test_exp_decay_fit() {
        let ts = [50.0, 200.0, 500.0, 1000.0, 2000.0, 3000.0];
        let truth = [1200.0, 900.0];
        let ys: Vec<f64> = ts.iter().map(|&t| exp_decay(t, &truth)).collect();

        let fit = levmar_fit_2(
            exp_decay,
            exp_decay_jac,
            &ts,
            &ys,
            [800.0, 1500.0],
            [0.0, 100.0],
            [1e4, 1e4],
            &LevMarOptions::default(),
        )
        .unwrap();

        assert!(
            (fit.params[0] - truth[0]).abs() / truth[0] < 1e-4,
            "amplitude: {}",
            fit.params[0]
        );
        assert!(
            (fit.params[1] - truth[1]).abs() / truth[1] < 1e-4,
            "time constant: {}",
            fit.params[1]
        );
    }

    #[test]
    fn test_fit_with_noise() {
        let ts: Vec<f64> = (0..20).map(|i| i as f64 * 0.5).collect();
        // Deterministic perturbation around the line 3t + 2
        let ys: Vec<f64> = ts
            .iter()
            .enumerate()
            .map(|(i, &t)| 3.0 * t + 2.0 + 0.05 * ((i * 7 % 5) as f64 - 2.0))
            .collect();

        let fit = levmar_fit_2(
            line,
            line_jac,
            &ts,
            &ys,
            [1.0, 0.0],
            [-100.0, -100.0],
            [100.0, 100.0],
            &LevMarOptions::default(),
        )
        .unwrap();

        assert!((fit.params[0] - 3.0).abs() < 0.05, "slope: {}", fit.params[0]);
        assert!((fit.params[1] - 2.0).abs() < 0.1, "offset: {}", fit.params[1]);
    }

    #[test]
    fn test_bound_saturation_is_success() {
        // True slope 2.0 but slope bounded at 1.0: converges clamped
        let ts: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let ys: Vec<f64> = ts.iter().map(|&t| 2.0 * t).collect();

        let fit = levmar_fit_2(
            line,
            line_jac,
            &ts,
            &ys,
            [0.5, 0.0],
            [0.0, -1.0],
            [1.0, 1.0],
            &LevMarOptions::default(),
        )
        .unwrap();

        assert!(
            (fit.params[0] - 1.0).abs() < 1e-6,
            "slope should sit at the upper bound, got {}",
            fit.params[0]
        );
    }

    #[test]
    fn test_perfect_init_converges() {
        let ts: Vec<f64> = (0..5).map(|i| i as f64).collect();
        let ys: Vec<f64> = ts.iter().map(|&t| 4.0 * t - 1.0).collect();

        let fit = levmar_fit_2(
            line,
            line_jac,
            &ts,
            &ys,
            [4.0, -1.0],
            [-10.0, -10.0],
            [10.0, 10.0],
            &LevMarOptions::default(),
        )
        .unwrap();

        assert_eq!(fit.iterations, 0, "zero-cost init should return immediately");
        assert!((fit.params[0] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_bounds() {
        let ts = [0.0, 1.0, 2.0];
        let ys = [0.0, 1.0, 2.0];

        let result = levmar_fit_2(
            line,
            line_jac,
            &ts,
            &ys,
            [0.0, 0.0],
            [5.0, -1.0],
            [5.0, 1.0],
            &LevMarOptions::default(),
        );
        match result {
            Err(err) => assert!(err.contains("Invalid bounds"), "got: {}", err),
            Ok(_) => panic!("Equal lower and upper bounds should be rejected"),
        }
    }

    #[test]
    fn test_non_finite_observation() {
        let ts = [0.0, 1.0, 2.0];
        let ys = [0.0, f64::NAN, 2.0];

        let result = levmar_fit_2(
            line,
            line_jac,
            &ts,
            &ys,
            [1.0, 0.0],
            [-10.0, -10.0],
            [10.0, 10.0],
            &LevMarOptions::default(),
        );
        assert!(result.is_err(), "NaN observation should fail the fit");
    }

    #[test]
    fn test_too_few_observations() {
        let result = levmar_fit_2(
            line,
            line_jac,
            &[1.0],
            &[2.0],
            [1.0, 0.0],
            [-10.0, -10.0],
            [10.0, 10.0],
            &LevMarOptions::default(),
        );
        assert!(result.is_err(), "A single observation should be rejected");
    }
}
