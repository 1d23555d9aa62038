use dicom::core::VR;

use crate::dataset::DatasetError;

/// Scalar kind of a single pixel component, as reported by the image decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float16,
    Float32,
    Float64,
}

/// Pixel-encoding attributes derived from a [`ComponentType`].
///
/// `bits_stored` always equals `bits_allocated` and `high_bit` is
/// `bits_stored - 1`; readers reject datasets where these disagree with the
/// buffer layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelEncoding {
    pub bits_allocated: u16,
    pub bits_stored: u16,
    pub high_bit: u16,
    /// 1 for two's complement, 0 for unsigned.
    pub pixel_representation: u16,
    /// VR of the PixelData element (OB, OW or OL).
    pub vr: VR,
}

impl PixelEncoding {
    fn new(bits: u16, signed: bool, vr: VR) -> Self {
        Self {
            bits_allocated: bits,
            bits_stored: bits,
            high_bit: bits - 1,
            pixel_representation: signed.into(),
            vr,
        }
    }
}

impl ComponentType {
    /// Width of one component in the pixel buffer, in bytes.
    pub fn byte_width(self) -> usize {
        match self {
            ComponentType::Int8 | ComponentType::UInt8 => 1,
            ComponentType::Int16 | ComponentType::UInt16 | ComponentType::Float16 => 2,
            ComponentType::Int32 | ComponentType::UInt32 | ComponentType::Float32 => 4,
            ComponentType::Int64 | ComponentType::UInt64 | ComponentType::Float64 => 8,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            ComponentType::Int8 | ComponentType::Int16 | ComponentType::Int32 | ComponentType::Int64
        )
    }

    /// Map the component kind to its DICOM pixel encoding.
    ///
    /// Integer kinds up to 32 bits map directly. Every other kind has no
    /// native single-frame encoding: in strict mode this is an error, in
    /// lenient mode it falls back to unsigned 16-bit words and the caller is
    /// expected to have quantized the buffer accordingly.
    pub fn encoding(self, strict: bool) -> Result<PixelEncoding, DatasetError> {
        match self {
            ComponentType::Int8 | ComponentType::UInt8 => {
                Ok(PixelEncoding::new(8, self.is_signed(), VR::OB))
            }
            ComponentType::Int16 | ComponentType::UInt16 => {
                Ok(PixelEncoding::new(16, self.is_signed(), VR::OW))
            }
            ComponentType::Int32 | ComponentType::UInt32 => {
                Ok(PixelEncoding::new(32, self.is_signed(), VR::OL))
            }
            ComponentType::Int64
            | ComponentType::UInt64
            | ComponentType::Float16
            | ComponentType::Float32
            | ComponentType::Float64 => {
                if strict {
                    Err(DatasetError::UnsupportedComponentType(self))
                } else {
                    Ok(PixelEncoding::new(16, false, VR::OW))
                }
            }
        }
    }
}

/// DICOM modality code written into each instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Modality {
    Ct,
    Mr,
    Pt,
    Nm,
    Us,
    Xa,
    Cr,
    Dx,
    Mg,
    #[default]
    Ot,
}

impl Modality {
    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Ct => "CT",
            Modality::Mr => "MR",
            Modality::Pt => "PT",
            Modality::Nm => "NM",
            Modality::Us => "US",
            Modality::Xa => "XA",
            Modality::Cr => "CR",
            Modality::Dx => "DX",
            Modality::Mg => "MG",
            Modality::Ot => "OT",
        }
    }
}
