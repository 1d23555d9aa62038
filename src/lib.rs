//! # DICOM-series library
//!
//! This crate serves a high-level API for exporting a decoded 3D volume as a
//! series of single-frame DICOM instances.
//!
//! This library is part of the dicom-rs ecosystem and leverages its
//! components to assemble and serialize one instance per cross-section of
//! the volume. It is the write-side counterpart of loading a volume from a
//! directory of .dcm files: any DICOM-capable viewer can re-sort the
//! produced instances (by instance number or filename) and re-stack them
//! into the original volume, purely from the per-instance spatial
//! attributes. Decoding the source container (NRRD, NIfTI, MetaImage, ...)
//! is left to an external reader; this crate consumes an already-decoded
//! [`Volume`].
//!
//! Per run, the converter guarantees:
//!  - one shared SeriesInstanceUID (allocated once, or taken from the
//!    options/base dataset)
//!  - a fresh, globally unique SOPInstanceUID per instance
//!  - instance numbers counting up by one in slice order
//!  - instance positions derived from the volume origin, spacing and
//!    direction-cosine matrix
//!
//! Slices are independent, so they can also be converted across the rayon
//! pool with [`SeriesConverter::convert_parallel`].
//!
//! Contributions are highly welcome!
//!
//! # Roadmap
//!
//!  - Compressed transfer syntaxes in the built-in encoder
//!  - Multi-frame (single file) output
//!  - Modality-specific SOP classes
//!
//! # Examples
//!
//! ## Writing a volume as a DICOM series
//!
//! Convert a 16-bit volume with 5 mm slice spacing and write one file per
//! slice:
//!
//! ```no_run
//! # use dicom_series::{SeriesConverter, SeriesOptions, Volume, IDENTITY_DIRECTION};
//! # use ndarray::Array3;
//! let array = Array3::<u16>::zeros((64, 256, 256));
//! let volume = Volume::from_array3(&array, [1.0, 1.0, 5.0], [0.0, 0.0, 0.0], IDENTITY_DIRECTION);
//!
//! let converter = SeriesConverter::new();
//! let slices = converter
//!     .convert(&volume, &SeriesOptions::default())
//!     .expect("should have converted the volume");
//! for slice in slices {
//!     std::fs::write(&slice.filename, &slice.bytes).expect("should have written the instance");
//! }
//! ```

pub mod dataset;
pub mod encoder;
pub mod enums;
pub mod series_writer;
pub mod uid;
pub mod volume;

pub use encoder::{DicomEncoder, SliceEncoder};
pub use enums::{ComponentType, Modality, PixelEncoding};
pub use series_writer::{ConvertError, EncodedSlice, SeriesConverter, SeriesOptions};
pub use uid::{UidAllocator, UidGenerator};
pub use volume::{CrossSection, IDENTITY_DIRECTION, PixelComponent, Volume};
