use ndarray::{Array4, ArrayD, ArrayView2, Axis, Ix4, Zip, s};
use rayon::prelude::*;
use tracing::warn;

use crate::enums::{OverflowPolicy, TemporalPolicy};
use crate::error::SeriesError;

const BACKGROUND: f64 = -1.0;
const PIXEL_MAX: f64 = u16::MAX as f64;

/// Voxel spacing of a volume in millimeters, plus the optional frame interval.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeMetadata {
    pub spacing: (f64, f64, f64),
    /// Time between frames in milliseconds
    pub temporal_spacing: Option<f64>,
}

impl VolumeMetadata {
    pub fn isotropic(spacing: f64) -> Self {
        Self {
            spacing: (spacing, spacing, spacing),
            temporal_spacing: None,
        }
    }

    fn validate(&self) -> Result<(), SeriesError> {
        let (x, y, z) = self.spacing;
        let axes = [Some(x), Some(y), Some(z), self.temporal_spacing];
        for (axis, value) in axes.into_iter().enumerate() {
            if let Some(value) = value.filter(|v| !(v.is_finite() && *v > 0.0)) {
                return Err(SeriesError::InvalidSpacing { axis, value });
            }
        }
        Ok(())
    }
}

/// Reconstructed intensities indexed `[x, y, z]` or `[x, y, z, frame]`.
#[derive(Clone, Debug)]
pub struct RawVolume {
    pub data: ArrayD<f64>,
    pub metadata: VolumeMetadata,
}

impl RawVolume {
    pub fn new(data: ArrayD<f64>, metadata: VolumeMetadata) -> Self {
        Self { data, metadata }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VolumeShape {
    pub x: usize,
    pub y: usize,
    pub z: usize,
    pub frames: usize,
}

impl VolumeShape {
    /// Number of frames that produce instances under `policy`
    pub fn emitted_frames(&self, policy: TemporalPolicy) -> usize {
        match policy {
            TemporalPolicy::AllFrames => self.frames,
            TemporalPolicy::FirstFrame => 1,
        }
    }

    pub fn instance_count(&self, policy: TemporalPolicy) -> usize {
        self.z * self.emitted_frames(policy)
    }
}

/// A volume narrowed to unsigned 16-bit pixels, always four dimensional.
#[derive(Clone, Debug)]
pub struct NormalizedVolume {
    pub data: Array4<u16>,
    pub metadata: VolumeMetadata,
    /// Voxels that did not fit and were wrapped or clamped
    pub out_of_range: usize,
}

impl NormalizedVolume {
    pub fn shape(&self) -> VolumeShape {
        let (x, y, z, frames) = self.data.dim();
        VolumeShape { x, y, z, frames }
    }

    /// The `(x, y)` plane at slice `z` of frame `frame`
    pub fn slice(&self, z: usize, frame: usize) -> ArrayView2<'_, u16> {
        self.data.slice(s![.., .., z, frame])
    }

    /// Row-major little endian bytes of one plane, the layout of native 16-bit pixel data
    pub fn slice_bytes(&self, z: usize, frame: usize) -> Vec<u8> {
        self.slice(z, frame)
            .iter()
            .flat_map(|value| value.to_le_bytes())
            .collect()
    }

    /// Smallest and largest pixel value over the first `frames` frames
    pub fn value_range(&self, frames: usize) -> Option<(u16, u16)> {
        let frames = self.data.slice(s![.., .., .., ..frames]);
        let min = frames.into_par_iter().copied().min()?;
        let max = frames.into_par_iter().copied().max()?;
        Some((min, max))
    }
}

/// Background substitution and narrowing to 16-bit pixels.
#[derive(Clone, Copy, Debug)]
pub struct VolumeNormalizer {
    /// Value marking voxels without data, written as 0
    pub background: f64,
    pub overflow: OverflowPolicy,
}

impl Default for VolumeNormalizer {
    fn default() -> Self {
        Self {
            background: BACKGROUND,
            overflow: OverflowPolicy::default(),
        }
    }
}

impl VolumeNormalizer {
    pub fn new(overflow: OverflowPolicy) -> Self {
        Self {
            overflow,
            ..Default::default()
        }
    }

    /// Normalize a raw volume for pixel encoding
    ///
    /// # Errors
    ///
    /// Returns an error if the volume is not 3-D or 4-D, has an empty axis,
    /// invalid spacing or non-finite voxels. With [`OverflowPolicy::Reject`]
    /// the first voxel outside the 16-bit range is reported.
    pub fn normalize(&self, volume: &RawVolume) -> Result<NormalizedVolume, SeriesError> {
        volume.metadata.validate()?;

        let ndim = volume.data.ndim();
        let view = match ndim {
            3 => volume.data.view().insert_axis(Axis(3)),
            4 => volume.data.view(),
            n => return Err(SeriesError::Dimensionality(n)),
        };
        let view = view
            .into_dimensionality::<Ix4>()
            .map_err(|_| SeriesError::Dimensionality(ndim))?;

        if view.is_empty() {
            return Err(SeriesError::EmptyVolume);
        }

        let mut out_of_range = 0;
        for (index, &value) in view.indexed_iter() {
            if !value.is_finite() {
                return Err(SeriesError::NonFinite {
                    index: index_vec(index, ndim),
                });
            }
            if !self.fits(value) {
                if self.overflow == OverflowPolicy::Reject {
                    return Err(SeriesError::Range {
                        value,
                        index: index_vec(index, ndim),
                    });
                }
                out_of_range += 1;
            }
        }

        if out_of_range > 0 {
            warn!(
                count = out_of_range,
                policy = ?self.overflow,
                "Voxel values outside the 16-bit pixel range"
            );
        }

        let data = Zip::from(&view).par_map_collect(|&value| self.narrow(value));

        Ok(NormalizedVolume {
            data,
            metadata: volume.metadata,
            out_of_range,
        })
    }

    fn substitute(&self, value: f64) -> f64 {
        if value == self.background { 0.0 } else { value }
    }

    fn fits(&self, value: f64) -> bool {
        (0.0..=PIXEL_MAX).contains(&self.substitute(value).trunc())
    }

    fn narrow(&self, value: f64) -> u16 {
        let truncated = self.substitute(value).trunc();
        match self.overflow {
            OverflowPolicy::Wrap => (truncated as i64).rem_euclid(1 << 16) as u16,
            OverflowPolicy::Clamp | OverflowPolicy::Reject => truncated as u16,
        }
    }
}

fn index_vec((x, y, z, f): (usize, usize, usize, usize), ndim: usize) -> Vec<usize> {
    let mut index = vec![x, y, z, f];
    index.truncate(ndim);
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, IxDyn};

    fn raw(data: Array3<f64>) -> RawVolume {
        RawVolume::new(data.into_dyn(), VolumeMetadata::isotropic(1.25))
    }

    #[test]
    fn background_becomes_zero() {
        let mut data = Array3::from_elem((4, 4, 2), 7.0);
        data[[1, 2, 1]] = -1.0;

        let normalized = VolumeNormalizer::default().normalize(&raw(data)).unwrap();

        assert_eq!(normalized.data[[1, 2, 1, 0]], 0);
        assert_eq!(normalized.data[[1, 2, 0, 0]], 7);
        assert_eq!(normalized.data.iter().filter(|&&v| v == 0).count(), 1);
    }

    #[test]
    fn three_axes_get_single_frame() {
        let normalized = VolumeNormalizer::default()
            .normalize(&raw(Array3::zeros((3, 5, 2))))
            .unwrap();

        assert_eq!(
            normalized.shape(),
            VolumeShape {
                x: 3,
                y: 5,
                z: 2,
                frames: 1
            }
        );
    }

    #[test]
    fn four_axes_keep_frames() {
        let data = ArrayD::<f64>::zeros(IxDyn(&[2, 2, 3, 4]));
        let normalized = VolumeNormalizer::default()
            .normalize(&RawVolume::new(data, VolumeMetadata::isotropic(1.0)))
            .unwrap();

        let shape = normalized.shape();
        assert_eq!(shape.frames, 4);
        assert_eq!(shape.instance_count(TemporalPolicy::AllFrames), 12);
        assert_eq!(shape.instance_count(TemporalPolicy::FirstFrame), 3);
    }

    #[test]
    fn other_dimensionalities_are_rejected() {
        let data = ArrayD::<f64>::zeros(IxDyn(&[4, 4]));
        let err = VolumeNormalizer::default()
            .normalize(&RawVolume::new(data, VolumeMetadata::isotropic(1.0)))
            .unwrap_err();
        assert!(matches!(err, SeriesError::Dimensionality(2)));
    }

    #[test]
    fn empty_axis_is_rejected() {
        let err = VolumeNormalizer::default()
            .normalize(&raw(Array3::zeros((4, 0, 2))))
            .unwrap_err();
        assert!(matches!(err, SeriesError::EmptyVolume));
    }

    #[test]
    fn non_positive_spacing_is_rejected() {
        let mut volume = raw(Array3::zeros((2, 2, 2)));
        volume.metadata.spacing.2 = 0.0;

        let err = VolumeNormalizer::default().normalize(&volume).unwrap_err();
        assert!(matches!(err, SeriesError::InvalidSpacing { axis: 2, .. }));
    }

    #[test]
    fn non_finite_voxels_are_rejected() {
        let mut data = Array3::zeros((2, 2, 2));
        data[[0, 1, 1]] = f64::NAN;

        let err = VolumeNormalizer::default().normalize(&raw(data)).unwrap_err();
        match err {
            SeriesError::NonFinite { index } => assert_eq!(index, vec![0, 1, 1]),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn fractions_truncate_toward_zero() {
        let mut data = Array3::zeros((2, 1, 1));
        data[[0, 0, 0]] = 12.9;
        data[[1, 0, 0]] = -0.5;

        let normalized = VolumeNormalizer::default().normalize(&raw(data)).unwrap();
        assert_eq!(normalized.data[[0, 0, 0, 0]], 12);
        assert_eq!(normalized.data[[1, 0, 0, 0]], 0);
        assert_eq!(normalized.out_of_range, 0);
    }

    #[test]
    fn overflow_policies() {
        let mut data = Array3::zeros((3, 1, 1));
        data[[0, 0, 0]] = 65_537.0;
        data[[1, 0, 0]] = -2.0;
        data[[2, 0, 0]] = 65_535.0;

        let wrapped = VolumeNormalizer::new(OverflowPolicy::Wrap)
            .normalize(&raw(data.clone()))
            .unwrap();
        assert_eq!(wrapped.data[[0, 0, 0, 0]], 1);
        assert_eq!(wrapped.data[[1, 0, 0, 0]], 65_534);
        assert_eq!(wrapped.data[[2, 0, 0, 0]], 65_535);
        assert_eq!(wrapped.out_of_range, 2);

        let clamped = VolumeNormalizer::new(OverflowPolicy::Clamp)
            .normalize(&raw(data.clone()))
            .unwrap();
        assert_eq!(clamped.data[[0, 0, 0, 0]], u16::MAX);
        assert_eq!(clamped.data[[1, 0, 0, 0]], 0);

        let err = VolumeNormalizer::new(OverflowPolicy::Reject)
            .normalize(&raw(data))
            .unwrap_err();
        assert!(matches!(err, SeriesError::Range { value, .. } if value == 65_537.0));
    }

    #[test]
    fn slice_bytes_are_row_major_little_endian() {
        let data = Array3::from_shape_fn((2, 3, 1), |(x, y, _)| (x * 3 + y) as f64 + 256.0);
        let normalized = VolumeNormalizer::default().normalize(&raw(data)).unwrap();

        let bytes = normalized.slice_bytes(0, 0);
        let values: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        assert_eq!(values, vec![256, 257, 258, 259, 260, 261]);
        assert_eq!(normalized.value_range(1), Some((256, 261)));
        assert_eq!(normalized.value_range(0), None);
    }
}
