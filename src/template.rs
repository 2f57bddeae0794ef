use std::collections::BTreeMap;

use dicom::core::{DataDictionary, PrimitiveValue, Tag, VR};
use dicom::object::{FileDicomObject, InMemDicomObject};
use dicom_dictionary_std::tags;

use crate::error::SeriesError;

/// Read-only attribute lookup on a template instance.
pub trait TemplateAttributes {
    fn attribute(&self, tag: Tag) -> Option<&PrimitiveValue>;
}

impl<D> TemplateAttributes for InMemDicomObject<D>
where
    D: DataDictionary + Clone,
{
    fn attribute(&self, tag: Tag) -> Option<&PrimitiveValue> {
        self.get(tag).and_then(|element| element.value().primitive())
    }
}

impl<D> TemplateAttributes for FileDicomObject<InMemDicomObject<D>>
where
    D: DataDictionary + Clone,
{
    fn attribute(&self, tag: Tag) -> Option<&PrimitiveValue> {
        (**self).attribute(tag)
    }
}

impl TemplateAttributes for BTreeMap<Tag, PrimitiveValue> {
    fn attribute(&self, tag: Tag) -> Option<&PrimitiveValue> {
        self.get(&tag)
    }
}

/// Study level attributes carried over when the template has them.
const STUDY_ATTRIBUTES: &[(Tag, VR)] = &[
    (tags::STUDY_INSTANCE_UID, VR::UI),
    (tags::STUDY_ID, VR::SH),
    (tags::STUDY_DATE, VR::DA),
    (tags::STUDY_TIME, VR::TM),
    (tags::ACCESSION_NUMBER, VR::SH),
    (tags::REFERRING_PHYSICIAN_NAME, VR::PN),
    (tags::PATIENT_BIRTH_DATE, VR::DA),
    (tags::PATIENT_SEX, VR::CS),
    (tags::MANUFACTURER, VR::LO),
    (tags::MAGNETIC_FIELD_STRENGTH, VR::DS),
];

/// The part of a template copied verbatim into every output instance.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateFields {
    pub patient_name: String,
    pub patient_id: String,
    pub protocol_name: String,
    pub image_type: Vec<String>,
    /// Optional study attributes found on the template, with their VR.
    pub study: Vec<(Tag, VR, PrimitiveValue)>,
}

impl TemplateFields {
    /// Extract the fixed fields from a template
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::MissingAttribute`] if patient name, patient ID,
    /// protocol name or image type is absent
    pub fn from_template(template: &impl TemplateAttributes) -> Result<Self, SeriesError> {
        let image_type = required(template, tags::IMAGE_TYPE, "ImageType")?
            .to_multi_str()
            .iter()
            .map(|value| trim_padding(value).to_string())
            .collect();

        let study = STUDY_ATTRIBUTES
            .iter()
            .filter_map(|&(tag, vr)| {
                template
                    .attribute(tag)
                    .map(|value| (tag, vr, value.clone()))
            })
            .collect();

        Ok(Self {
            patient_name: required_str(template, tags::PATIENT_NAME, "PatientName")?,
            patient_id: required_str(template, tags::PATIENT_ID, "PatientID")?,
            protocol_name: required_str(template, tags::PROTOCOL_NAME, "ProtocolName")?,
            image_type,
            study,
        })
    }

    /// Study Instance UID of the template, if it carries one
    pub fn study_instance_uid(&self) -> Option<String> {
        self.study
            .iter()
            .find(|(tag, _, _)| *tag == tags::STUDY_INSTANCE_UID)
            .map(|(_, _, value)| trim_padding(&value.to_str()).to_string())
    }
}

fn required<'a>(
    template: &'a impl TemplateAttributes,
    tag: Tag,
    keyword: &'static str,
) -> Result<&'a PrimitiveValue, SeriesError> {
    template
        .attribute(tag)
        .ok_or(SeriesError::MissingAttribute { keyword })
}

fn required_str(
    template: &impl TemplateAttributes,
    tag: Tag,
    keyword: &'static str,
) -> Result<String, SeriesError> {
    let value = required(template, tag, keyword)?;
    Ok(trim_padding(&value.to_str()).to_string())
}

fn trim_padding(value: &str) -> &str {
    value.trim_end_matches([' ', '\0'])
}
