use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::object::InMemDicomObject;
use dicom_dictionary_std::{tags, uids};
use tracing::{debug, info, warn};

use crate::enums::{TemporalPolicy, Windowing};
use crate::error::SeriesError;
use crate::geometry::{GeometryPolicy, PlaceholderGeometry};
use crate::normalizer::{NormalizedVolume, RawVolume, VolumeNormalizer};
use crate::sink::InstanceSink;
use crate::slice_table::{SliceEntry, SliceParameterTable};
use crate::template::{TemplateAttributes, TemplateFields};
use crate::uid::{UidGenerator, UuidUidGenerator};

const PRIVATE_CREATOR: Tag = Tag(0x2001, 0x0010);
const SLICE_NUMBER_MR: Tag = Tag(0x2001, 0x100A);
const PRIVATE_CREATOR_NAME: &str = "Philips Imaging DD 001";

const BITS_ALLOCATED: u16 = 16;

/// Series level settings shared by every instance of a run.
#[derive(Clone, Debug)]
pub struct SeriesConfig {
    pub series_number: i32,
    pub series_description: Option<String>,
    pub temporal: TemporalPolicy,
    pub windowing: Windowing,
    /// Output names are the prefix followed by the zero padded instance number
    pub file_prefix: String,
    pub name_width: usize,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            series_number: 2001,
            series_description: None,
            temporal: TemporalPolicy::default(),
            windowing: Windowing::default(),
            file_prefix: "IM_".to_string(),
            name_width: 4,
        }
    }
}

impl SeriesConfig {
    pub fn with_series_number(mut self, series_number: i32) -> Self {
        self.series_number = series_number;
        self
    }

    pub fn with_series_description(mut self, description: impl Into<String>) -> Self {
        self.series_description = Some(description.into());
        self
    }

    pub fn with_temporal(mut self, temporal: TemporalPolicy) -> Self {
        self.temporal = temporal;
        self
    }

    pub fn with_windowing(mut self, windowing: Windowing) -> Self {
        self.windowing = windowing;
        self
    }

    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    /// Destination name of the instance with the given number
    pub fn file_name(&self, instance_number: u32) -> String {
        format!(
            "{}{:0width$}",
            self.file_prefix,
            instance_number,
            width = self.name_width
        )
    }
}

/// Attributes fixed for the whole run, before any per-instance field is set.
#[derive(Clone, Debug)]
pub struct SeriesDefaults {
    pub attributes: InMemDicomObject,
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub frame_of_reference_uid: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SeriesReport {
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub frame_of_reference_uid: String,
    /// Names handed to the sink, in emission order
    pub names: Vec<String>,
}

impl SeriesReport {
    pub fn instance_count(&self) -> usize {
        self.names.len()
    }
}

/// Turns a normalized volume into one single-frame instance per slice.
///
/// Instances are emitted strictly in order. Instance numbers and UIDs are
/// assigned before the instance is handed to the sink, and the run stops at
/// the first instance the sink rejects. Instances persisted before a failure
/// are left in place.
pub struct SeriesSynthesizer<G = PlaceholderGeometry, U = UuidUidGenerator> {
    config: SeriesConfig,
    geometry: G,
    uids: U,
}

impl SeriesSynthesizer {
    pub fn new(config: SeriesConfig) -> Self {
        Self {
            config,
            geometry: PlaceholderGeometry::default(),
            uids: UuidUidGenerator,
        }
    }
}

impl<G, U> SeriesSynthesizer<G, U>
where
    G: GeometryPolicy,
    U: UidGenerator,
{
    pub fn with_geometry<H: GeometryPolicy>(self, geometry: H) -> SeriesSynthesizer<H, U> {
        SeriesSynthesizer {
            config: self.config,
            geometry,
            uids: self.uids,
        }
    }

    pub fn with_uid_generator<V: UidGenerator>(self, uids: V) -> SeriesSynthesizer<G, V> {
        SeriesSynthesizer {
            config: self.config,
            geometry: self.geometry,
            uids,
        }
    }

    pub fn config(&self) -> &SeriesConfig {
        &self.config
    }

    /// Build the per-run parameter table for `volume`
    pub fn slice_table(&self, volume: &NormalizedVolume) -> SliceParameterTable {
        let shape = volume.shape();
        SliceParameterTable::new(
            shape.z,
            shape.emitted_frames(self.config.temporal),
            volume.metadata.spacing.2,
        )
    }

    /// Assemble the attributes shared by every instance of the series
    ///
    /// Generates the series and frame of reference UIDs, and a study UID
    /// when the template does not carry one.
    pub fn series_defaults(
        &mut self,
        volume: &NormalizedVolume,
        template: &TemplateFields,
    ) -> Result<SeriesDefaults, SeriesError> {
        let shape = volume.shape();
        let (rows, columns) = match (u16::try_from(shape.x), u16::try_from(shape.y)) {
            (Ok(rows), Ok(columns)) => (rows, columns),
            _ => {
                return Err(SeriesError::PlaneTooLarge {
                    rows: shape.x,
                    columns: shape.y,
                });
            }
        };
        let (spacing_x, spacing_y, spacing_z) = volume.metadata.spacing;

        let study_instance_uid = template
            .study_instance_uid()
            .unwrap_or_else(|| self.uids.next_uid());
        let series_instance_uid = self.uids.next_uid();
        let frame_of_reference_uid = self.uids.next_uid();

        let mut obj = InMemDicomObject::new_empty();
        put_str(&mut obj, tags::SPECIFIC_CHARACTER_SET, VR::CS, "ISO_IR 100");
        put_strs(&mut obj, tags::IMAGE_TYPE, VR::CS, template.image_type.clone());
        put_str(&mut obj, tags::SOP_CLASS_UID, VR::UI, uids::MR_IMAGE_STORAGE);
        put_str(&mut obj, tags::MODALITY, VR::CS, "MR");

        for (tag, vr, value) in &template.study {
            obj.put(DataElement::new(*tag, *vr, value.clone()));
        }
        put_str(&mut obj, tags::PATIENT_NAME, VR::PN, &template.patient_name);
        put_str(&mut obj, tags::PATIENT_ID, VR::LO, &template.patient_id);
        put_str(&mut obj, tags::PROTOCOL_NAME, VR::LO, &template.protocol_name);

        put_str(&mut obj, tags::MR_ACQUISITION_TYPE, VR::CS, "3D");
        put_str(&mut obj, tags::SLICE_THICKNESS, VR::DS, decimal_string(spacing_z));
        put_str(
            &mut obj,
            tags::SPACING_BETWEEN_SLICES,
            VR::DS,
            decimal_string(spacing_z),
        );

        put_str(&mut obj, tags::STUDY_INSTANCE_UID, VR::UI, &study_instance_uid);
        put_str(&mut obj, tags::SERIES_INSTANCE_UID, VR::UI, &series_instance_uid);
        put_str(
            &mut obj,
            tags::SERIES_NUMBER,
            VR::IS,
            self.config.series_number.to_string(),
        );
        if let Some(description) = &self.config.series_description {
            put_str(&mut obj, tags::SERIES_DESCRIPTION, VR::LO, description);
        }
        put_str(
            &mut obj,
            tags::FRAME_OF_REFERENCE_UID,
            VR::UI,
            &frame_of_reference_uid,
        );
        put_str(&mut obj, tags::POSITION_REFERENCE_INDICATOR, VR::LO, "");
        put_decimals(
            &mut obj,
            tags::IMAGE_ORIENTATION_PATIENT,
            &self.geometry.orientation(),
        );

        put_u16(&mut obj, tags::SAMPLES_PER_PIXEL, 1);
        put_str(
            &mut obj,
            tags::PHOTOMETRIC_INTERPRETATION,
            VR::CS,
            "MONOCHROME2",
        );
        put_u16(&mut obj, tags::ROWS, rows);
        put_u16(&mut obj, tags::COLUMNS, columns);
        put_decimals(&mut obj, tags::PIXEL_SPACING, &[spacing_x, spacing_y]);
        put_u16(&mut obj, tags::BITS_ALLOCATED, BITS_ALLOCATED);
        put_u16(&mut obj, tags::BITS_STORED, BITS_ALLOCATED);
        put_u16(&mut obj, tags::HIGH_BIT, BITS_ALLOCATED - 1);
        put_u16(&mut obj, tags::PIXEL_REPRESENTATION, 0);
        if let Some((center, width)) = self.window(volume) {
            put_str(&mut obj, tags::WINDOW_CENTER, VR::DS, decimal_string(center));
            put_str(&mut obj, tags::WINDOW_WIDTH, VR::DS, decimal_string(width));
        }
        put_str(&mut obj, tags::LOSSY_IMAGE_COMPRESSION, VR::CS, "00");
        put_str(&mut obj, tags::PRESENTATION_LUT_SHAPE, VR::CS, "IDENTITY");
        put_str(&mut obj, PRIVATE_CREATOR, VR::LO, PRIVATE_CREATOR_NAME);

        Ok(SeriesDefaults {
            attributes: obj,
            study_instance_uid,
            series_instance_uid,
            frame_of_reference_uid,
        })
    }

    /// Emit every instance of `volume` into `sink`
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::Persist`] for the first instance the sink
    /// rejects; no further instances are attempted.
    pub fn synthesize(
        &mut self,
        volume: &NormalizedVolume,
        template: &TemplateFields,
        sink: &mut impl InstanceSink,
    ) -> Result<SeriesReport, SeriesError> {
        let shape = volume.shape();
        let table = self.slice_table(volume);
        let defaults = self.series_defaults(volume, template)?;

        if shape.frames > 1 && self.config.temporal == TemporalPolicy::FirstFrame {
            warn!(
                frames = shape.frames,
                "Only the first frame of the volume is written"
            );
        }
        info!(
            rows = shape.x,
            columns = shape.y,
            slices = shape.z,
            frames = shape.frames,
            instances = table.len(),
            series_instance_uid = %defaults.series_instance_uid,
            "Synthesizing series"
        );

        let frames = shape.emitted_frames(self.config.temporal);
        let mut names = Vec::with_capacity(table.len());
        for (position, entry) in table.iter().enumerate() {
            let instance_number = position as u32 + 1;
            let sop_instance_uid = self.uids.next_uid();

            let mut attributes = defaults.attributes.clone();
            self.put_instance_fields(
                &mut attributes,
                instance_number,
                &entry,
                &sop_instance_uid,
                frames,
                volume.metadata.temporal_spacing,
            );
            let pixel_data = volume.slice_bytes(entry.z, entry.frame);
            let name = self.config.file_name(instance_number);

            sink.persist(&attributes, &pixel_data, &name)
                .map_err(|source| SeriesError::Persist {
                    instance_number,
                    slice_index: entry.slice_index,
                    name: name.clone(),
                    source,
                })?;
            debug!(instance_number, %name, %sop_instance_uid, "Persisted instance");
            names.push(name);
        }

        info!(instances = names.len(), "Series complete");
        Ok(SeriesReport {
            study_instance_uid: defaults.study_instance_uid,
            series_instance_uid: defaults.series_instance_uid,
            frame_of_reference_uid: defaults.frame_of_reference_uid,
            names,
        })
    }

    fn put_instance_fields(
        &self,
        obj: &mut InMemDicomObject,
        instance_number: u32,
        entry: &SliceEntry,
        sop_instance_uid: &str,
        frames: usize,
        temporal_spacing: Option<f64>,
    ) {
        put_str(obj, tags::SOP_INSTANCE_UID, VR::UI, sop_instance_uid);
        put_str(obj, tags::INSTANCE_NUMBER, VR::IS, instance_number.to_string());
        put_decimals(
            obj,
            tags::IMAGE_POSITION_PATIENT,
            &self.geometry.position(entry.slice_location),
        );
        put_str(
            obj,
            tags::SLICE_LOCATION,
            VR::DS,
            decimal_string(entry.slice_location),
        );
        put_str(obj, SLICE_NUMBER_MR, VR::IS, entry.slice_index.to_string());

        if frames > 1 {
            put_str(
                obj,
                tags::TEMPORAL_POSITION_IDENTIFIER,
                VR::IS,
                (entry.frame + 1).to_string(),
            );
            put_str(
                obj,
                tags::NUMBER_OF_TEMPORAL_POSITIONS,
                VR::IS,
                frames.to_string(),
            );
            if let Some(interval) = temporal_spacing {
                put_str(
                    obj,
                    tags::TRIGGER_TIME,
                    VR::DS,
                    decimal_string(entry.frame as f64 * interval),
                );
            }
        }
    }

    fn window(&self, volume: &NormalizedVolume) -> Option<(f64, f64)> {
        match self.config.windowing {
            Windowing::None => None,
            Windowing::Fixed { center, width } => Some((center, width)),
            Windowing::FromData => {
                let frames = volume.shape().emitted_frames(self.config.temporal);
                let (min, max) = volume.value_range(frames)?;
                let (min, max) = (f64::from(min), f64::from(max));
                Some(((min + max) / 2.0, (max - min).max(1.0)))
            }
        }
    }
}

/// Run the whole conversion: template extraction, normalization, synthesis
///
/// The template is read before anything else, so an incomplete template
/// fails the run before the sink sees any instance.
pub fn convert<G, U>(
    template: &impl TemplateAttributes,
    volume: &RawVolume,
    normalizer: &VolumeNormalizer,
    synthesizer: &mut SeriesSynthesizer<G, U>,
    sink: &mut impl InstanceSink,
) -> Result<SeriesReport, SeriesError>
where
    G: GeometryPolicy,
    U: UidGenerator,
{
    let fields = TemplateFields::from_template(template)?;
    let normalized = normalizer.normalize(volume)?;
    synthesizer.synthesize(&normalized, &fields, sink)
}

fn put_str(obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: impl Into<String>) {
    obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value.into())));
}

fn put_strs(obj: &mut InMemDicomObject, tag: Tag, vr: VR, values: Vec<String>) {
    obj.put(DataElement::new(
        tag,
        vr,
        PrimitiveValue::Strs(values.into_iter().collect()),
    ));
}

fn put_u16(obj: &mut InMemDicomObject, tag: Tag, value: u16) {
    obj.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
}

fn put_decimals(obj: &mut InMemDicomObject, tag: Tag, values: &[f64]) {
    put_strs(
        obj,
        tag,
        VR::DS,
        values.iter().copied().map(decimal_string).collect(),
    );
}

/// Format a value as a Decimal String, which is limited to 16 characters
fn decimal_string(value: f64) -> String {
    let plain = value.to_string();
    if plain.len() <= 16 {
        return plain;
    }
    (0..=15)
        .rev()
        .map(|precision| {
            let fixed = format!("{value:.precision$}");
            if fixed.contains('.') {
                fixed.trim_end_matches('0').trim_end_matches('.').to_string()
            } else {
                fixed
            }
        })
        .find(|fixed| fixed.len() <= 16)
        .unwrap_or_else(|| format!("{value:.6e}"))
}
