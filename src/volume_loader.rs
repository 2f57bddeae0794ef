use crate::normalizer::{RawVolume, VolumeMetadata};

use dicom::object::{DefaultDicomObject, open_file};
use nifti::volume::ndarray::IntoNdArray;
use nifti::{NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;
use thiserror::Error;
use tracing::info;

const TIME_UNIT_MASK: u8 = 0x38;
const UNITS_MSEC: u8 = 16;
const UNITS_USEC: u8 = 24;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("NIfTI error: {0}")]
    Nifti(#[from] nifti::NiftiError),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from a `.nii` or `.nii.gz` file
    ///
    /// Intensities are scaled by the header's slope and intercept. Spacing is
    /// taken from `pixdim`, and the frame interval is converted to
    /// milliseconds when the file has more than one frame.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or its data type is unsupported
    pub fn load_nifti(path: impl AsRef<Path>) -> Result<RawVolume, VolumeLoaderError> {
        let object = ReaderOptions::new().read_file(path.as_ref())?;
        let metadata = Self::get_metadata(object.header());
        let data = object.into_volume().into_ndarray::<f64>()?;

        info!(
            path = %path.as_ref().display(),
            shape = ?data.shape(),
            spacing = ?metadata.spacing,
            "Loaded volume"
        );
        Ok(RawVolume::new(data, metadata))
    }

    /// Load the DICOM instance whose header seeds the new series
    pub fn load_template(path: impl AsRef<Path>) -> Result<DefaultDicomObject, VolumeLoaderError> {
        Ok(open_file(path.as_ref())?)
    }

    fn get_metadata(header: &NiftiHeader) -> VolumeMetadata {
        let pixdim = header.pixdim;
        let spacing = (
            f64::from(pixdim[1]),
            f64::from(pixdim[2]),
            f64::from(pixdim[3]),
        );

        let has_frames = header.dim[0] >= 4 && header.dim[4] > 1;
        let temporal_spacing = (has_frames && pixdim[4] > 0.0)
            .then(|| Self::to_milliseconds(f64::from(pixdim[4]), header.xyzt_units));

        VolumeMetadata {
            spacing,
            temporal_spacing,
        }
    }

    fn to_milliseconds(value: f64, xyzt_units: u8) -> f64 {
        match xyzt_units & TIME_UNIT_MASK {
            UNITS_MSEC => value,
            UNITS_USEC => value / 1000.0,
            // seconds, or unspecified
            _ => value * 1000.0,
        }
    }
}
