//! Saturation-recovery M0/T1 fitting stage
//!
//! Reads its configuration from the environment (`folder_nifti`,
//! `M0_TI_VALUES`) and writes the fitted M0 and T1 maps next to the
//! registered M0 results.

use m0fit::config::RunConfig;
use m0fit::pipeline;

fn main() -> Result<(), String> {
    dotenvy::dotenv().ok();

    let config = RunConfig::from_env()?;
    pipeline::run(&config)?;

    Ok(())
}
