//! # DICOM-series library
//!
//! This crate writes a reconstructed volume (for example the output of a
//! slice-to-volume reconstruction) as a series of single-frame MR Image
//! Storage instances, reusing patient and study attributes from a DICOM
//! instance that was acquired in the same study.
//!
//! A conversion runs in three stages:
//!  - [`TemplateFields`] pulls the attributes copied into every instance out
//!    of the template
//!  - [`VolumeNormalizer`] replaces background voxels (-1) with 0 and narrows
//!    intensities to unsigned 16-bit pixels
//!  - [`SeriesSynthesizer`] walks the slices in order, assigns instance
//!    numbers and UIDs, and hands each instance to an [`InstanceSink`]
//!
//! The geometry written to the instances is deliberately simple: axial
//! identity orientation and a fixed in-plane position. A different
//! [`GeometryPolicy`] can be supplied without touching the slice loop.
//!
//! 4-D volumes emit one instance per slice and frame by default, see
//! [`TemporalPolicy`].
//!
//! # Examples
//!
//! ## Writing a NIfTI volume next to its template
//!
//! ```no_run
//! # use dicom_series::{VolumeLoader, VolumeNormalizer, SeriesSynthesizer, SeriesConfig, DirectorySink, convert};
//! let template = VolumeLoader::load_template("dicom/IM_0001")
//!     .expect("should have loaded the template");
//! let volume = VolumeLoader::load_nifti("SVR-output-brain.nii.gz")
//!     .expect("should have loaded the volume");
//!
//! let mut synthesizer = SeriesSynthesizer::new(SeriesConfig::default());
//! let mut sink = DirectorySink::new("dcm-svr");
//! let report = convert(
//!     &template,
//!     &volume,
//!     &VolumeNormalizer::default(),
//!     &mut synthesizer,
//!     &mut sink,
//! )
//! .expect("should have written the series");
//! println!("{} instances", report.instance_count());
//! ```

pub mod enums;
pub mod error;
pub mod geometry;
pub mod normalizer;
pub mod sink;
pub mod slice_table;
pub mod synthesizer;
pub mod template;
pub mod uid;
pub mod volume_loader;

pub use enums::{OverflowPolicy, TemporalPolicy, Windowing};
pub use error::SeriesError;
pub use geometry::{GeometryPolicy, PlaceholderGeometry};
pub use normalizer::{NormalizedVolume, RawVolume, VolumeMetadata, VolumeNormalizer};
pub use sink::{DirectorySink, InstanceSink, MemorySink};
pub use synthesizer::{SeriesConfig, SeriesReport, SeriesSynthesizer, convert};
pub use template::{TemplateAttributes, TemplateFields};
pub use uid::{UidGenerator, UuidUidGenerator};
pub use volume_loader::VolumeLoader;
