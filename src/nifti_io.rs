//! NIfTI-1 file I/O
//!
//! Reading of 3D volumes and 4D time-series into flat Fortran-order arrays,
//! and writing of 3D/4D float32 volumes with the source geometry. Gzip
//! compression (.nii.gz) is auto-detected on read and chosen by file
//! extension on write.

use std::io::Cursor;
use std::path::Path;

use flate2::read::GzDecoder;
use ndarray::Array;
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};

/// A 3D volume with its geometry
pub struct NiftiVolume {
    /// Voxel data, Fortran order: index = x + y*nx + z*nx*ny
    pub data: Vec<f64>,
    /// Dimensions (nx, ny, nz)
    pub dims: (usize, usize, usize),
    /// Voxel sizes in mm
    pub voxel_size: (f64, f64, f64),
    /// Affine transformation matrix (4x4, row-major)
    pub affine: [f64; 16],
}

/// A 4D time-series volume with its geometry
///
/// One 3D volume per timepoint, timepoints stacked along the 4th axis.
pub struct NiftiSeries {
    /// Voxel data, Fortran order: index = x + y*nx + z*nx*ny + t*nx*ny*nz
    pub data: Vec<f64>,
    /// Dimensions (nx, ny, nz, nt)
    pub dims: (usize, usize, usize, usize),
    /// Voxel sizes in mm
    pub voxel_size: (f64, f64, f64),
    /// Affine transformation matrix (4x4, row-major)
    pub affine: [f64; 16],
}

impl NiftiSeries {
    /// Spatial dimensions (nx, ny, nz) without the time axis
    pub fn spatial_dims(&self) -> (usize, usize, usize) {
        (self.dims.0, self.dims.1, self.dims.2)
    }
}

/// Check if bytes are gzip compressed
fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Parse a NIfTI object from raw or gzipped bytes
fn read_object(bytes: &[u8]) -> Result<InMemNiftiObject, String> {
    if is_gzip(bytes) {
        let decoder = GzDecoder::new(Cursor::new(bytes));
        InMemNiftiObject::from_reader(decoder)
            .map_err(|e| format!("Failed to read gzipped NIfTI: {}", e))
    } else {
        InMemNiftiObject::from_reader(Cursor::new(bytes))
            .map_err(|e| format!("Failed to read NIfTI: {}", e))
    }
}

/// Load a 3D NIfTI volume from bytes
///
/// Supports both .nii and .nii.gz (gzip is auto-detected). A 4D file
/// yields its first timepoint.
pub fn load_nifti(bytes: &[u8]) -> Result<NiftiVolume, String> {
    let obj = read_object(bytes)?;

    let header = obj.header();
    let ndim = header.dim[0] as usize;
    if ndim < 3 {
        return Err(format!("Expected at least 3D volume, got {}D", ndim));
    }

    let pixdim = header.pixdim;
    let voxel_size = (pixdim[1] as f64, pixdim[2] as f64, pixdim[3] as f64);
    let affine = get_affine(header);

    let array: Array<f64, _> = obj
        .into_volume()
        .into_ndarray()
        .map_err(|e| format!("Failed to convert to ndarray: {}", e))?;

    let shape = array.shape();
    if shape.len() < 3 {
        return Err(format!("Expected at least 3D array, got {}D", shape.len()));
    }
    let (nx, ny, nz) = (shape[0], shape[1], shape[2]);

    // Extract in Fortran order (x varies fastest) to match NIfTI convention
    let mut data = Vec::with_capacity(nx * ny * nz);
    if shape.len() == 3 {
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    data.push(array[[i, j, k]]);
                }
            }
        }
    } else {
        // 4D or higher: take the first timepoint
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    data.push(array[[i, j, k, 0]]);
                }
            }
        }
    }

    Ok(NiftiVolume {
        data,
        dims: (nx, ny, nz),
        voxel_size,
        affine,
    })
}

/// Load a 4D NIfTI time-series from bytes
///
/// A 3D file is accepted as a degenerate series with a single timepoint.
pub fn load_nifti_series(bytes: &[u8]) -> Result<NiftiSeries, String> {
    let obj = read_object(bytes)?;

    let header = obj.header();
    let ndim = header.dim[0] as usize;
    if ndim < 3 {
        return Err(format!("Expected at least 3D volume, got {}D", ndim));
    }

    let pixdim = header.pixdim;
    let voxel_size = (pixdim[1] as f64, pixdim[2] as f64, pixdim[3] as f64);
    let affine = get_affine(header);

    let array: Array<f64, _> = obj
        .into_volume()
        .into_ndarray()
        .map_err(|e| format!("Failed to convert to ndarray: {}", e))?;

    let shape = array.shape();
    if shape.len() < 3 {
        return Err(format!("Expected at least 3D array, got {}D", shape.len()));
    }
    let (nx, ny, nz) = (shape[0], shape[1], shape[2]);
    let nt = if shape.len() >= 4 { shape[3] } else { 1 };

    // Fortran order per volume, volumes stacked along t:
    // index = x + y*nx + z*nx*ny + t*nx*ny*nz
    let mut data = Vec::with_capacity(nx * ny * nz * nt);
    if shape.len() == 3 {
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    data.push(array[[i, j, k]]);
                }
            }
        }
    } else {
        for t in 0..nt {
            for k in 0..nz {
                for j in 0..ny {
                    for i in 0..nx {
                        data.push(array[[i, j, k, t]]);
                    }
                }
            }
        }
    }

    Ok(NiftiSeries {
        data,
        dims: (nx, ny, nz, nt),
        voxel_size,
        affine,
    })
}

/// Get affine transformation matrix from header
fn get_affine(header: &NiftiHeader) -> [f64; 16] {
    // Prefer sform if available (sform_code > 0)
    if header.sform_code > 0 {
        let s = &header.srow_x;
        let t = &header.srow_y;
        let u = &header.srow_z;
        [
            s[0] as f64, s[1] as f64, s[2] as f64, s[3] as f64,
            t[0] as f64, t[1] as f64, t[2] as f64, t[3] as f64,
            u[0] as f64, u[1] as f64, u[2] as f64, u[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        ]
    } else {
        // Fall back to identity with voxel scaling
        let vsx = header.pixdim[1] as f64;
        let vsy = header.pixdim[2] as f64;
        let vsz = header.pixdim[3] as f64;
        [
            vsx, 0.0, 0.0, 0.0,
            0.0, vsy, 0.0, 0.0,
            0.0, 0.0, vsz, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ]
    }
}

/// Assemble a NIfTI-1 header (348 bytes) for float32 data
fn build_header(dim: [i16; 8], pixdim: [f32; 8], affine: &[f64; 16]) -> [u8; 348] {
    let mut header = [0u8; 348];

    // sizeof_hdr = 348
    header[0..4].copy_from_slice(&348i32.to_le_bytes());

    // dim[0..7]
    for (i, &d) in dim.iter().enumerate() {
        let offset = 40 + i * 2;
        header[offset..offset + 2].copy_from_slice(&d.to_le_bytes());
    }

    // datatype = 16 (FLOAT32)
    header[70..72].copy_from_slice(&16i16.to_le_bytes());

    // bitpix = 32
    header[72..74].copy_from_slice(&32i16.to_le_bytes());

    // pixdim[0..7]
    for (i, &p) in pixdim.iter().enumerate() {
        let offset = 76 + i * 4;
        header[offset..offset + 4].copy_from_slice(&p.to_le_bytes());
    }

    // vox_offset = 352 (header + 4 bytes extension)
    header[108..112].copy_from_slice(&352.0f32.to_le_bytes());

    // scl_slope = 1.0
    header[112..116].copy_from_slice(&1.0f32.to_le_bytes());

    // scl_inter = 0.0
    header[116..120].copy_from_slice(&0.0f32.to_le_bytes());

    // sform_code = 1 (scanner anat)
    header[254..256].copy_from_slice(&1i16.to_le_bytes());

    // srow_x, srow_y, srow_z
    for i in 0..4 {
        let offset = 280 + i * 4;
        header[offset..offset + 4].copy_from_slice(&(affine[i] as f32).to_le_bytes());
    }
    for i in 0..4 {
        let offset = 296 + i * 4;
        header[offset..offset + 4].copy_from_slice(&(affine[4 + i] as f32).to_le_bytes());
    }
    for i in 0..4 {
        let offset = 312 + i * 4;
        header[offset..offset + 4].copy_from_slice(&(affine[8 + i] as f32).to_le_bytes());
    }

    // magic = "n+1\0" for NIfTI-1 single file
    header[344..348].copy_from_slice(b"n+1\0");

    header
}

/// Serialize a header plus float32 voxel data into .nii bytes
fn write_nifti_bytes(header: &[u8; 348], data: &[f64]) -> Result<Vec<u8>, String> {
    use std::io::Write;

    let mut buffer = Vec::with_capacity(352 + data.len() * 4);
    buffer
        .write_all(header)
        .map_err(|e| format!("Write header failed: {}", e))?;

    // Extension flag (4 bytes, all zeros = no extension)
    buffer
        .write_all(&[0u8; 4])
        .map_err(|e| format!("Write extension failed: {}", e))?;

    for &val in data {
        buffer
            .write_all(&(val as f32).to_le_bytes())
            .map_err(|e| format!("Write data failed: {}", e))?;
    }

    Ok(buffer)
}

/// Gzip-compress a byte buffer
fn gzip_bytes(bytes: &[u8]) -> Result<Vec<u8>, String> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| format!("Gzip compression failed: {}", e))?;
    encoder
        .finish()
        .map_err(|e| format!("Gzip finish failed: {}", e))
}

/// Save a 3D volume as NIfTI bytes
///
/// Writes an uncompressed .nii buffer with float32 voxels.
pub fn save_nifti(
    data: &[f64],
    dims: (usize, usize, usize),
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> Result<Vec<u8>, String> {
    let (nx, ny, nz) = dims;
    let (vsx, vsy, vsz) = voxel_size;
    let dim: [i16; 8] = [3, nx as i16, ny as i16, nz as i16, 1, 1, 1, 1];
    let pixdim: [f32; 8] = [1.0, vsx as f32, vsy as f32, vsz as f32, 1.0, 1.0, 1.0, 1.0];

    let header = build_header(dim, pixdim, affine);
    write_nifti_bytes(&header, data)
}

/// Save a 4D time-series as NIfTI bytes
///
/// Writes an uncompressed .nii buffer with float32 voxels, one volume per
/// timepoint along the 4th axis.
pub fn save_nifti_series(
    data: &[f64],
    dims: (usize, usize, usize, usize),
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> Result<Vec<u8>, String> {
    let (nx, ny, nz, nt) = dims;
    let (vsx, vsy, vsz) = voxel_size;
    let dim: [i16; 8] = [4, nx as i16, ny as i16, nz as i16, nt as i16, 1, 1, 1];
    let pixdim: [f32; 8] = [1.0, vsx as f32, vsy as f32, vsz as f32, 1.0, 1.0, 1.0, 1.0];

    let header = build_header(dim, pixdim, affine);
    write_nifti_bytes(&header, data)
}

/// Save a 3D volume as gzipped NIfTI bytes (.nii.gz)
pub fn save_nifti_gz(
    data: &[f64],
    dims: (usize, usize, usize),
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> Result<Vec<u8>, String> {
    let uncompressed = save_nifti(data, dims, voxel_size, affine)?;
    gzip_bytes(&uncompressed)
}

/// Read a 3D NIfTI volume from a filesystem path
///
/// Supports both .nii and .nii.gz files.
pub fn read_nifti_file(path: &Path) -> Result<NiftiVolume, String> {
    let bytes = std::fs::read(path)
        .map_err(|e| format!("Failed to read file '{}': {}", path.display(), e))?;
    load_nifti(&bytes)
}

/// Read a 4D NIfTI time-series from a filesystem path
///
/// Supports both .nii and .nii.gz files.
pub fn read_nifti_series_file(path: &Path) -> Result<NiftiSeries, String> {
    let bytes = std::fs::read(path)
        .map_err(|e| format!("Failed to read file '{}': {}", path.display(), e))?;
    load_nifti_series(&bytes)
}

/// Save a 3D volume to a file
///
/// If the path ends with .nii.gz, the file is gzip compressed. Otherwise it
/// is saved as uncompressed .nii.
pub fn save_nifti_to_file(
    path: &Path,
    data: &[f64],
    dims: (usize, usize, usize),
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> Result<(), String> {
    let uncompressed = save_nifti(data, dims, voxel_size, affine)?;
    let bytes = if path.to_string_lossy().ends_with(".nii.gz") {
        gzip_bytes(&uncompressed)?
    } else {
        uncompressed
    };

    std::fs::write(path, &bytes)
        .map_err(|e| format!("Failed to write file '{}': {}", path.display(), e))
}

/// Save a 4D time-series to a file
///
/// If the path ends with .nii.gz, the file is gzip compressed. Otherwise it
/// is saved as uncompressed .nii.
pub fn save_nifti_series_to_file(
    path: &Path,
    data: &[f64],
    dims: (usize, usize, usize, usize),
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> Result<(), String> {
    let uncompressed = save_nifti_series(data, dims, voxel_size, affine)?;
    let bytes = if path.to_string_lossy().ends_with(".nii.gz") {
        gzip_bytes(&uncompressed)?
    } else {
        uncompressed
    };

    std::fs::write(path, &bytes)
        .map_err(|e| format!("Failed to write file '{}': {}", path.display(), e))
}
