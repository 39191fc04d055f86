//! M0-Fit: saturation-recovery M0/T1 map fitting
//!
//! One stage of an ASL/M0 perfusion pipeline. Fits the saturation-recovery
//! relaxation model `signal(t) = M0 * (1 - exp(-t / T1))` at every voxel of
//! a brain mask, across the inversion-time series of a registered 4D M0
//! acquisition, and writes the fitted M0 and T1 maps.
//!
//! # Modules
//! - `fit`: Saturation-recovery model and per-voxel fitting
//! - `roi`: Mask-based voxel extraction and scatter
//! - `solvers`: Bounded Levenberg-Marquardt
//! - `config`: Environment-driven run configuration
//! - `nifti_io`: NIfTI-1 volume reading and writing
//! - `pipeline`: The staged batch run

// Core modules
pub mod fit;
pub mod roi;
pub mod solvers;

// I/O and configuration
pub mod config;
pub mod nifti_io;

// Pipeline driver
pub mod pipeline;
