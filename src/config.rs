//! Run configuration
//!
//! The stage is driven by two required environment variables:
//! - `folder_nifti`: base folder of the subject's NIfTI tree
//! - `M0_TI_VALUES`: comma-separated inversion times in ms
//!
//! All input and output locations are fixed paths under the base folder.

use std::path::PathBuf;

/// Configuration for one fitting run
pub struct RunConfig {
    /// Base folder of the subject's NIfTI tree
    pub folder_nifti: PathBuf,
    /// Inversion times in ms, aligned with the 4th axis of the signal volume
    pub tis: Vec<f64>,
}

impl RunConfig {
    /// Read configuration from the process environment
    ///
    /// Both variables are required; a missing one fails the run.
    pub fn from_env() -> Result<RunConfig, String> {
        let folder = std::env::var("folder_nifti")
            .map_err(|_| "Environment variable 'folder_nifti' is not set".to_string())?;
        let ti_values = std::env::var("M0_TI_VALUES")
            .map_err(|_| "Environment variable 'M0_TI_VALUES' is not set".to_string())?;

        Ok(RunConfig {
            folder_nifti: PathBuf::from(folder),
            tis: parse_ti_values(&ti_values)?,
        })
    }

    /// Path of the 4D multi-TI signal volume
    pub fn signal_path(&self) -> PathBuf {
        self.folder_nifti
            .join("m0/reg_m0_to_asl/m0_results/m0_RL_merged.nii.gz")
    }

    /// Path of the binary brain mask
    pub fn mask_path(&self) -> PathBuf {
        self.folder_nifti.join("mask/asl_mask.nii.gz")
    }

    /// Output directory for the fitted maps
    pub fn fitting_dir(&self) -> PathBuf {
        self.folder_nifti.join("m0/reg_m0_to_asl/m0_fitting")
    }

    /// Output path of the M0 map
    pub fn m0_map_path(&self) -> PathBuf {
        self.fitting_dir().join("m0_map.nii.gz")
    }

    /// Output path of the T1 map
    pub fn t1_map_path(&self) -> PathBuf {
        self.fitting_dir().join("t1_map.nii.gz")
    }
}

/// Parse a comma-separated list of inversion times (ms)
pub fn parse_ti_values(s: &str) -> Result<Vec<f64>, String> {
    let mut tis = Vec::new();
    for token in s.split(',') {
        let token = token.trim();
        let value: f64 = token
            .parse()
            .map_err(|_| format!("Invalid inversion time '{}' in M0_TI_VALUES", token))?;
        if !value.is_finite() || value <= 0.0 {
            return Err(format!(
                "Inversion times must be positive, got '{}'",
                token
            ));
        }
        tis.push(value);
    }

    if tis.len() < 2 {
        return Err(format!(
            "At least 2 inversion times are required, got {}",
            tis.len()
        ));
    }

    Ok(tis)
}
