use thiserror::Error;

/// Boxed error returned by an [`InstanceSink`](crate::sink::InstanceSink).
pub type SinkError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("Template is missing required attribute {keyword}")]
    MissingAttribute { keyword: &'static str },

    #[error("Expected a 3-D or 4-D volume, got {0} axes")]
    Dimensionality(usize),

    #[error("Volume has an empty axis")]
    EmptyVolume,

    #[error("A {rows}x{columns} plane does not fit in 16-bit Rows/Columns")]
    PlaneTooLarge { rows: usize, columns: usize },

    #[error("Spacing along axis {axis} must be finite and positive, got {value}")]
    InvalidSpacing { axis: usize, value: f64 },

    #[error("Voxel {index:?} is not a finite number")]
    NonFinite { index: Vec<usize> },

    #[error("Voxel {index:?} with value {value} does not fit in 16 bits")]
    Range { value: f64, index: Vec<usize> },

    #[error("Failed to persist instance {instance_number} (slice {slice_index}) as {name}: {source}")]
    Persist {
        instance_number: u32,
        slice_index: u32,
        name: String,
        #[source]
        source: SinkError,
    },
}
