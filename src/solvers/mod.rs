//! Iterative solvers
//!
//! Numerical solvers used by the voxelwise model fitting:
//! - `levmar`: Damped least-squares (Levenberg-Marquardt) with box bounds

pub mod levmar;

pub use levmar::{levmar_fit_2, LevMarFit, LevMarOptions};
