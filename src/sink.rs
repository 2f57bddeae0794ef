use std::fs;
use std::path::{Path, PathBuf};

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use dicom::transfer_syntax::entries::IMPLICIT_VR_LITTLE_ENDIAN;
use dicom_dictionary_std::tags;
use tracing::debug;

use crate::error::SinkError;

const IMPLEMENTATION_CLASS_UID: &str = "2.25.302240089898831264476504700058305624529";
const IMPLEMENTATION_VERSION_NAME: &str = "DICOM_SERIES_01";

/// Destination for synthesized instances.
///
/// `attributes` holds every data element of the instance except Pixel Data,
/// which is passed separately as native little endian bytes.
pub trait InstanceSink {
    fn persist(
        &mut self,
        attributes: &InMemDicomObject,
        pixel_data: &[u8],
        name: &str,
    ) -> Result<(), SinkError>;
}

impl<S: InstanceSink + ?Sized> InstanceSink for &mut S {
    fn persist(
        &mut self,
        attributes: &InMemDicomObject,
        pixel_data: &[u8],
        name: &str,
    ) -> Result<(), SinkError> {
        (**self).persist(attributes, pixel_data, name)
    }
}

/// Writes each instance as a Part 10 file in Implicit VR Little Endian.
///
/// An instance is written under `<name>.part` and renamed once complete, so
/// a failed write never leaves a file under the instance's name.
#[derive(Clone, Debug)]
pub struct DirectorySink {
    directory: PathBuf,
}

impl DirectorySink {
    /// The directory must already exist
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl InstanceSink for DirectorySink {
    fn persist(
        &mut self,
        attributes: &InMemDicomObject,
        pixel_data: &[u8],
        name: &str,
    ) -> Result<(), SinkError> {
        let sop_class_uid = attributes.element(tags::SOP_CLASS_UID)?.to_str()?;
        let sop_instance_uid = attributes.element(tags::SOP_INSTANCE_UID)?.to_str()?;

        let meta = FileMetaTableBuilder::new()
            .transfer_syntax(IMPLICIT_VR_LITTLE_ENDIAN.uid())
            .media_storage_sop_class_uid(sop_class_uid.to_string())
            .media_storage_sop_instance_uid(sop_instance_uid.to_string())
            .implementation_class_uid(IMPLEMENTATION_CLASS_UID)
            .implementation_version_name(IMPLEMENTATION_VERSION_NAME)
            .build()?;

        let mut object = attributes.clone();
        object.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OW,
            PrimitiveValue::from(pixel_data.to_vec()),
        ));

        let path = self.directory.join(name);
        let partial = self.directory.join(format!("{name}.part"));
        let written = object
            .with_exact_meta(meta)
            .write_to_file(&partial)
            .map_err(SinkError::from)
            .and_then(|()| fs::rename(&partial, &path).map_err(SinkError::from));
        if let Err(err) = written {
            // may not exist if the file could not be created
            let _ = fs::remove_file(&partial);
            return Err(err);
        }
        debug!(path = %path.display(), "Wrote instance");
        Ok(())
    }
}

/// An instance collected by [`MemorySink`].
#[derive(Clone, Debug)]
pub struct StoredInstance {
    pub name: String,
    pub attributes: InMemDicomObject,
    pub pixel_data: Vec<u8>,
}

/// Keeps every instance in memory, in the order they were persisted.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    pub instances: Vec<StoredInstance>,
}

impl InstanceSink for MemorySink {
    fn persist(
        &mut self,
        attributes: &InMemDicomObject,
        pixel_data: &[u8],
        name: &str,
    ) -> Result<(), SinkError> {
        self.instances.push(StoredInstance {
            name: name.to_string(),
            attributes: attributes.clone(),
            pixel_data: pixel_data.to_vec(),
        });
        Ok(())
    }
}
