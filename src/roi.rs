//! Mask-based voxel extraction and scatter
//!
//! Pulls the time-series of every in-mask voxel out of a flat 4D volume
//! into a compact voxel-major pack, and scatters per-voxel results back to
//! their original positions. Both directions walk the mask in the same
//! Fortran scan order, so extract followed by scatter is an exact
//! round-trip.

/// Binarize a volume into a mask (value > 0 is in-mask)
pub fn binarize_mask(volume: &[f64]) -> Vec<u8> {
    volume.iter().map(|&v| if v > 0.0 { 1 } else { 0 }).collect()
}

/// Time-series of all in-mask voxels, packed voxel-major
///
/// `data` holds `n_voxels * n_timepoints` values with each voxel's series
/// contiguous, ordered by the mask's Fortran scan order.
pub struct MaskedSeries {
    pub data: Vec<f64>,
    pub n_voxels: usize,
    pub n_timepoints: usize,
}

impl MaskedSeries {
    /// The time-series of the v-th in-mask voxel
    pub fn series(&self, v: usize) -> &[f64] {
        let start = v * self.n_timepoints;
        &self.data[start..start + self.n_timepoints]
    }
}

/// Extract the time-series of every in-mask voxel from a flat 4D volume
///
/// `series` is Fortran-order 4D data (index = pos + t*n_spatial) with
/// `n_spatial` voxels per timepoint; `mask` has `n_spatial` entries.
pub fn extract_masked_series(
    series: &[f64],
    n_spatial: usize,
    n_timepoints: usize,
    mask: &[u8],
) -> MaskedSeries {
    let n_voxels = mask.iter().filter(|&&m| m > 0).count();

    let mut data = Vec::with_capacity(n_voxels * n_timepoints);
    for (pos, &m) in mask.iter().enumerate() {
        if m == 0 {
            continue;
        }
        for t in 0..n_timepoints {
            data.push(series[pos + t * n_spatial]);
        }
    }

    MaskedSeries {
        data,
        n_voxels,
        n_timepoints,
    }
}

/// Scatter per-voxel values back into a full volume (zeros elsewhere)
///
/// `values` must hold one value per in-mask voxel, in the same Fortran scan
/// order used by [`extract_masked_series`].
pub fn scatter_masked(values: &[f64], mask: &[u8]) -> Vec<f64> {
    let mut volume = vec![0.0; mask.len()];
    let mut v = 0;
    for (pos, &m) in mask.iter().enumerate() {
        if m > 0 {
            volume[pos] = values[v];
            v += 1;
        }
    }
    volume
}
