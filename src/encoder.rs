use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use dicom::transfer_syntax::entries::EXPLICIT_VR_LITTLE_ENDIAN;
use dicom_dictionary_std::tags;
use log::debug;
use thiserror::Error;

use crate::volume::CrossSection;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("dataset is missing {0}, required for encoding")]
    MissingAttribute(&'static str),

    #[error("failed to build file meta table: {0}")]
    Meta(#[from] dicom::object::meta::Error),

    #[error("failed to write instance: {0}")]
    Write(#[from] dicom::object::WriteError),
}

/// Boundary to the binary encoder that turns a cross-section and its
/// assembled dataset into one self-contained record.
///
/// The default implementation is [`DicomEncoder`]; callers integrating a
/// different serializer (or a compressing one) implement this trait and hand
/// it to the converter.
pub trait SliceEncoder {
    fn encode(
        &self,
        section: &CrossSection<'_>,
        dataset: &InMemDicomObject,
    ) -> Result<Vec<u8>, EncodeError>;
}

/// Encodes instances as uncompressed Explicit VR Little Endian Part-10
/// streams. The compression option is ignored here.
#[derive(Debug, Default, Clone, Copy)]
pub struct DicomEncoder;

impl DicomEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl SliceEncoder for DicomEncoder {
    fn encode(
        &self,
        section: &CrossSection<'_>,
        dataset: &InMemDicomObject,
    ) -> Result<Vec<u8>, EncodeError> {
        let bits_allocated = dataset
            .element(tags::BITS_ALLOCATED)
            .ok()
            .and_then(|e| e.to_int::<u16>().ok())
            .ok_or(EncodeError::MissingAttribute("BitsAllocated"))?;
        let sop_class_uid = dataset
            .element(tags::SOP_CLASS_UID)
            .ok()
            .and_then(|e| e.to_str().ok())
            .ok_or(EncodeError::MissingAttribute("SOPClassUID"))?
            .into_owned();
        let sop_instance_uid = dataset
            .element(tags::SOP_INSTANCE_UID)
            .ok()
            .and_then(|e| e.to_str().ok())
            .ok_or(EncodeError::MissingAttribute("SOPInstanceUID"))?
            .into_owned();

        let vr = match bits_allocated {
            8 => VR::OB,
            32 => VR::OL,
            _ => VR::OW,
        };
        let mut dataset = dataset.clone();
        dataset.put(DataElement::new(
            tags::PIXEL_DATA,
            vr,
            PrimitiveValue::from(section.pixels.to_vec()),
        ));

        let meta = FileMetaTableBuilder::new()
            .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN.uid())
            .media_storage_sop_class_uid(sop_class_uid)
            .media_storage_sop_instance_uid(sop_instance_uid)
            .build()?;

        let file_object = dataset.with_exact_meta(meta);
        let mut bytes = Vec::new();
        file_object.write_all(&mut bytes)?;
        debug!("encoded instance into {} bytes", bytes.len());
        Ok(bytes)
    }
}
