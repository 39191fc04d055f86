//! Common test utilities for the fitting-stage integration tests

use std::path::PathBuf;

use m0fit::config::RunConfig;
use m0fit::fit::t1_model;
use m0fit::nifti_io::{save_nifti_series_to_file, save_nifti_to_file};

/// Compute RMSE between two arrays, only within mask (non-zero values)
pub fn rmse(a: &[f64], b: &[f64], mask: &[u8]) -> f64 {
    let mut sum_sq = 0.0;
    let mut count = 0usize;
    for i in 0..a.len() {
        if mask[i] > 0 {
            let diff = a[i] - b[i];
            sum_sq += diff * diff;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    (sum_sq / count as f64).sqrt()
}

/// Synthetic phantom: ground-truth parameter maps and the 4D signal
/// generated from them
pub struct Phantom {
    /// Mask volume data (1.0 in-mask, 0.0 outside)
    pub mask_data: Vec<f64>,
    /// Binary mask
    pub mask: Vec<u8>,
    /// Ground-truth M0 per voxel (0 outside mask)
    pub m0: Vec<f64>,
    /// Ground-truth T1 per voxel in ms (0 outside mask)
    pub t1: Vec<f64>,
    /// 4D signal, Fortran order (index = pos + t*nx*ny*nz)
    pub signal: Vec<f64>,
}

/// Build a phantom with smoothly varying M0/T1 inside an interior box mask
///
/// The one-voxel border stays outside the mask, so scatter behavior at
/// mask edges is always exercised. Signal outside the mask is zero.
pub fn make_phantom(dims: (usize, usize, usize), tis: &[f64]) -> Phantom {
    let (nx, ny, nz) = dims;
    let n_spatial = nx * ny * nz;
    let nt = tis.len();

    let mut mask_data = vec![0.0; n_spatial];
    let mut mask = vec![0u8; n_spatial];
    let mut m0 = vec![0.0; n_spatial];
    let mut t1 = vec![0.0; n_spatial];
    let mut signal = vec![0.0; n_spatial * nt];

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let interior = i > 0 && i + 1 < nx && j > 0 && j + 1 < ny && k > 0 && k + 1 < nz;
                if !interior {
                    continue;
                }
                let pos = i + j * nx + k * nx * ny;
                mask_data[pos] = 1.0;
                mask[pos] = 1;

                // Parameters comfortably inside the fit bounds
                m0[pos] = 800.0 + 40.0 * i as f64 + 25.0 * j as f64;
                t1[pos] = 900.0 + 120.0 * k as f64 + 60.0 * i as f64;

                for (t, &ti) in tis.iter().enumerate() {
                    signal[pos + t * n_spatial] = t1_model(ti, &[m0[pos], t1[pos]]);
                }
            }
        }
    }

    Phantom {
        mask_data,
        mask,
        m0,
        t1,
        signal,
    }
}

/// A synthetic subject folder on disk, laid out like the real pipeline tree
pub struct TestSubject {
    pub root: PathBuf,
    pub config: RunConfig,
}

impl TestSubject {
    /// Write the signal series and mask under a fresh temp folder
    ///
    /// `tis` is the configured TI list, which may deliberately disagree
    /// with the number of timepoints in `signal`.
    pub fn write(
        name: &str,
        signal: &[f64],
        dims4: (usize, usize, usize, usize),
        voxel_size: (f64, f64, f64),
        affine: &[f64; 16],
        mask_data: &[f64],
        tis: Vec<f64>,
    ) -> Result<TestSubject, String> {
        let root = std::env::temp_dir().join(format!("m0fit_{}", name));
        let _ = std::fs::remove_dir_all(&root);

        let results_dir = root.join("m0/reg_m0_to_asl/m0_results");
        let mask_dir = root.join("mask");
        std::fs::create_dir_all(&results_dir)
            .map_err(|e| format!("Failed to create '{}': {}", results_dir.display(), e))?;
        std::fs::create_dir_all(&mask_dir)
            .map_err(|e| format!("Failed to create '{}': {}", mask_dir.display(), e))?;

        save_nifti_series_to_file(
            &results_dir.join("m0_RL_merged.nii.gz"),
            signal,
            dims4,
            voxel_size,
            affine,
        )?;
        save_nifti_to_file(
            &mask_dir.join("asl_mask.nii.gz"),
            mask_data,
            (dims4.0, dims4.1, dims4.2),
            voxel_size,
            affine,
        )?;

        Ok(TestSubject {
            config: RunConfig {
                folder_nifti: root.clone(),
                tis,
            },
            root,
        })
    }

    pub fn cleanup(&self) {
        std::fs::remove_dir_all(&self.root).ok();
    }
}
