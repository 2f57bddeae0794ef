/// How a 4-D volume's frame axis maps onto output instances.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TemporalPolicy {
    /// One instance per (slice, frame) pair, slice varying slower.
    #[default]
    AllFrames,
    /// One instance per slice, taken from the first frame.
    FirstFrame,
}

/// What happens to voxel values that do not fit in an unsigned 16-bit pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Wrap modulo 2^16, logging how many voxels were affected.
    #[default]
    Wrap,
    /// Saturate to `0..=u16::MAX`.
    Clamp,
    /// Fail the run with [`SeriesError::Range`](crate::error::SeriesError::Range).
    Reject,
}

/// Source of the VOI window written to every instance.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Windowing {
    #[default]
    None,
    Fixed {
        center: f64,
        width: f64,
    },
    /// Window spanning the minimum and maximum of the normalized volume.
    FromData,
}
