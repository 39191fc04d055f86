//! The M0 fitting stage
//!
//! Staged batch run: load the multi-TI signal and brain mask, fit the
//! saturation-recovery model at every in-mask voxel, scatter the fitted
//! parameters back into full volumes and write the M0 and T1 maps.

use std::time::Instant;

use crate::config::RunConfig;
use crate::fit::fit_masked_series;
use crate::nifti_io::{read_nifti_file, read_nifti_series_file, save_nifti_to_file};
use crate::roi::{binarize_mask, extract_masked_series, scatter_masked};

/// Outcome of a completed run
pub struct RunSummary {
    /// Number of configured inversion times
    pub n_tis: usize,
    /// Number of in-mask voxels
    pub n_voxels: usize,
    /// Number of voxels whose fit failed (zero-filled in the maps)
    pub n_failed: usize,
    /// Whether the two output maps were written
    pub wrote_outputs: bool,
}

/// Run the full fitting stage
///
/// Progress goes to stdout. A time-series/TI-count mismatch is reported
/// and ends the run early without writing outputs; the surrounding
/// pipeline treats that as a clean stop, not a process failure.
pub fn run(config: &RunConfig) -> Result<RunSummary, String> {
    let total_start = Instant::now();

    println!("START M0 FITTING");

    // Create output directory
    let fitting_dir = config.fitting_dir();
    std::fs::create_dir_all(&fitting_dir)
        .map_err(|e| format!("Failed to create output dir '{}': {e}", fitting_dir.display()))?;

    // ========================================================================
    // Load signal and mask
    // ========================================================================
    println!("[INFO] Loading NIfTI data...");
    let start = Instant::now();

    let signal = read_nifti_series_file(&config.signal_path())?;
    let mask_nii = read_nifti_file(&config.mask_path())?;

    let (nx, ny, nz, nt) = signal.dims;
    let n_spatial = nx * ny * nz;

    if mask_nii.dims != signal.spatial_dims() {
        return Err(format!(
            "Mask dimensions {:?} do not match signal dimensions {:?}",
            mask_nii.dims,
            signal.spatial_dims()
        ));
    }

    println!("[INFO] Loaded in {:.2?}", start.elapsed());
    println!("[INFO] Volume: {}x{}x{}, {} timepoints", nx, ny, nz, nt);

    // ========================================================================
    // Extract masked voxels
    // ========================================================================
    let mask = binarize_mask(&mask_nii.data);
    let masked = extract_masked_series(&signal.data, n_spatial, nt, &mask);

    if masked.n_timepoints != config.tis.len() {
        println!(
            "NUMBER OF MEASUREMENTS {} NOT EQUAL TO NUMBER OF TIS {} !!!",
            masked.n_timepoints,
            config.tis.len()
        );
        return Ok(RunSummary {
            n_tis: config.tis.len(),
            n_voxels: masked.n_voxels,
            n_failed: 0,
            wrote_outputs: false,
        });
    }

    println!(
        "[INFO] {} TIs and {} voxels to be fitted",
        config.tis.len(),
        masked.n_voxels
    );

    // ========================================================================
    // Per-voxel saturation-recovery fit
    // ========================================================================
    let start = Instant::now();
    let fit = fit_masked_series(&config.tis, &masked);
    println!("[INFO] Fitting completed in {:.2?}", start.elapsed());

    for (voxel, err) in &fit.failures {
        println!("[WARN] Fit failed for voxel {voxel}: {err}");
    }
    if !fit.failures.is_empty() {
        println!(
            "[INFO] {} of {} voxel fits failed (zero-filled)",
            fit.failures.len(),
            masked.n_voxels
        );
    }

    // ========================================================================
    // Scatter results and write maps
    // ========================================================================
    let m0_map = scatter_masked(&fit.m0, &mask);
    let t1_map = scatter_masked(&fit.t1, &mask);

    let dims = signal.spatial_dims();
    save_nifti_to_file(
        &config.m0_map_path(),
        &m0_map,
        dims,
        signal.voxel_size,
        &signal.affine,
    )?;
    save_nifti_to_file(
        &config.t1_map_path(),
        &t1_map,
        dims,
        signal.voxel_size,
        &signal.affine,
    )?;
    println!("[INFO] Saved m0_map.nii.gz, t1_map.nii.gz");

    // ========================================================================
    // Summary
    // ========================================================================
    println!("\n{}", "=".repeat(60));
    println!("M0 Fitting Complete!");
    println!("Total time: {:.2?}", total_start.elapsed());
    println!(
        "Fitted {} voxels ({} failed)",
        masked.n_voxels - fit.failures.len(),
        fit.failures.len()
    );
    println!("{}", "=".repeat(60));
    println!("\nOutputs saved to {}:", fitting_dir.display());
    println!("  m0_map.nii.gz  - Equilibrium signal map");
    println!("  t1_map.nii.gz  - T1 relaxation map (ms)");
    println!("END M0 FITTING");

    Ok(RunSummary {
        n_tis: config.tis.len(),
        n_voxels: masked.n_voxels,
        n_failed: fit.failures.len(),
        wrote_outputs: true,
    })
}
