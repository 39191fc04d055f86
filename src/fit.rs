//! Saturation-recovery T1 model fitting
//!
//! Fits signal(t) = M0 * (1 - exp(-t / T1)) independently at every in-mask
//! voxel across its inversion-time series, using bounded Levenberg-Marquardt.
//! The acquisition saturates rather than inverts the readout volume after
//! preparation, so the model carries no inversion (x2) term.
//!
//! Per voxel: M0 starts at the maximum observed signal with bounds
//! [M0, 5*M0]; T1 starts at a nominal 1700 ms with bounds [500, 6000] ms.
//! A voxel whose fit fails keeps (0, 0) in both maps and the run continues.

use rayon::prelude::*;

use crate::roi::MaskedSeries;
use crate::solvers::{levmar_fit_2, LevMarOptions};

/// Nominal T1 initial guess (ms)
pub const T1_INIT_MS: f64 = 1700.0;
/// T1 lower bound (ms)
pub const T1_MIN_MS: f64 = 500.0;
/// T1 upper bound (ms)
pub const T1_MAX_MS: f64 = 6000.0;
/// M0 upper bound as a multiple of the initial guess
pub const M0_BOUND_FACTOR: f64 = 5.0;

/// Saturation-recovery signal at inversion time `t` (ms)
#[inline]
pub fn t1_model(t: f64, params: &[f64; 2]) -> f64 {
    params[0] * (1.0 - (-t / params[1]).exp())
}

/// Partial derivatives of the model with respect to (M0, T1)
#[inline]
fn t1_model_jacobian(t: f64, params: &[f64; 2]) -> [f64; 2] {
    let e = (-t / params[1]).exp();
    [1.0 - e, -params[0] * e * t / (params[1] * params[1])]
}

/// Fit one voxel's time-series
///
/// Returns the fitted (M0, T1) pair, or an error when the series cannot be
/// fit (all signal non-positive, non-finite values, or no convergence).
pub fn fit_voxel(tis: &[f64], series: &[f64]) -> Result<(f64, f64), String> {
    let m0_init = series.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

    let fit = levmar_fit_2(
        t1_model,
        t1_model_jacobian,
        tis,
        series,
        [m0_init, T1_INIT_MS],
        [m0_init, T1_MIN_MS],
        [m0_init * M0_BOUND_FACTOR, T1_MAX_MS],
        &LevMarOptions::default(),
    )?;

    Ok((fit.params[0], fit.params[1]))
}

/// Per-voxel parameter estimates for the masked region
pub struct FitResult {
    /// Fitted M0 per in-mask voxel (0 where the fit failed)
    pub m0: Vec<f64>,
    /// Fitted T1 per in-mask voxel in ms (0 where the fit failed)
    pub t1: Vec<f64>,
    /// In-mask voxel index and error message of every failed fit
    pub failures: Vec<(usize, String)>,
}

/// Fit every in-mask voxel's time-series
///
/// Voxel fits are independent, so the loop runs in parallel; each result
/// lands in its own slot and failures are reported in voxel order.
pub fn fit_masked_series(tis: &[f64], masked: &MaskedSeries) -> FitResult {
    let per_voxel: Vec<Result<(f64, f64), String>> = masked
        .data
        .par_chunks_exact(masked.n_timepoints)
        .map(|series| fit_voxel(tis, series))
        .collect();

    let mut m0 = vec![0.0; masked.n_voxels];
    let mut t1 = vec![0.0; masked.n_voxels];
    let mut failures = Vec::new();
    for (v, result) in per_voxel.into_iter().enumerate() {
        match result {
            Ok((m0_fit, t1_fit)) => {
                m0[v] = m0_fit;
                t1[v] = t1_fit;
            }
            Err(err) => failures.push((v, err)),
        }
    }

    FitResult { m0, t1, failures }
}
