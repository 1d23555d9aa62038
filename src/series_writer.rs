use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::InMemDicomObject;
use dicom_dictionary_std::tags;
use log::debug;
use rayon::prelude::*;
use thiserror::Error;

use crate::dataset::{DatasetError, SliceDatasetBuilder, dataset_snapshot};
use crate::encoder::{DicomEncoder, EncodeError, SliceEncoder};
use crate::enums::Modality;
use crate::uid::{UidAllocator, UidGenerator};
use crate::volume::{Volume, VolumeError};

/// The slice-index placeholder a filename pattern must contain. It is
/// replaced with the zero-padded 4-digit slice index.
pub const INDEX_PLACEHOLDER: &str = "%04d";

/// Configuration of one conversion run.
#[derive(Debug, Clone)]
pub struct SeriesOptions {
    /// Output filename pattern, must contain [`INDEX_PLACEHOLDER`].
    pub filename_pattern: String,
    pub series_description: Option<String>,
    pub series_number: Option<i32>,
    /// Instance number written for slice 0; later slices count up from it.
    pub instance_number_start: i32,
    pub modality: Option<Modality>,
    /// Series UID to use instead of allocating a fresh one.
    pub series_uid: Option<String>,
    /// Request a compressed transfer syntax. Accepted for configuration
    /// compatibility; the built-in [`DicomEncoder`] writes uncompressed
    /// streams only and ignores it.
    pub compress: bool,
    /// Reject component types without a native pixel encoding instead of
    /// falling back to unsigned 16-bit words.
    pub strict: bool,
}

impl Default for SeriesOptions {
    fn default() -> Self {
        Self {
            filename_pattern: format!("slice_{INDEX_PLACEHOLDER}.dcm"),
            series_description: None,
            series_number: None,
            instance_number_start: 1,
            modality: None,
            series_uid: None,
            compress: false,
            strict: false,
        }
    }
}

/// One encoded instance of the output series.
#[derive(Debug)]
pub struct EncodedSlice {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub slice_index: usize,
}

/// Failure of one per-slice step, before the orchestrator attaches context.
#[derive(Debug, Error)]
pub enum SliceError {
    #[error(transparent)]
    Extract(#[from] VolumeError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("filename pattern {0:?} does not contain the %04d slice-index placeholder")]
    MissingIndexPlaceholder(String),

    #[error("slice {index} failed: {source}")]
    Slice {
        index: usize,
        /// Redacted dump of the dataset in play when the slice failed.
        snapshot: Vec<String>,
        source: SliceError,
    },
}

/// Drives the conversion of a whole volume into an ordered series.
///
/// One series UID (and, when absent from the base dataset, one study UID) is
/// resolved up front and shared by every slice; each slice then gets its own
/// dataset, instance UID and filename. The run is fail-fast: the first slice
/// failure aborts the remaining slices and no partial result is returned.
pub struct SeriesConverter<E = DicomEncoder, U = UidGenerator> {
    encoder: E,
    uids: U,
}

impl SeriesConverter {
    pub fn new() -> Self {
        Self {
            encoder: DicomEncoder::new(),
            uids: UidGenerator::new(),
        }
    }
}

impl Default for SeriesConverter {
    fn default() -> Self {
        Self::new()
    }
}

struct RunContext {
    base: InMemDicomObject,
    series_uid: String,
}

impl<E: SliceEncoder, U: UidAllocator> SeriesConverter<E, U> {
    /// Converter with a custom encoder and/or UID allocator.
    pub fn with_parts(encoder: E, uids: U) -> Self {
        Self { encoder, uids }
    }

    /// Convert every slice of `volume` into an encoded instance, in
    /// ascending slice order.
    ///
    /// # Errors
    ///
    /// Fails before any slice is processed when the filename pattern lacks
    /// the index placeholder, and on the first slice whose extraction,
    /// dataset assembly or encoding fails. Errors carry the slice index and
    /// a snapshot of the dataset for diagnosis.
    pub fn convert(
        &self,
        volume: &Volume,
        options: &SeriesOptions,
    ) -> Result<Vec<EncodedSlice>, ConvertError> {
        self.convert_with_base(volume, &InMemDicomObject::new_empty(), options)
    }

    /// Like [`convert`](Self::convert), with a caller-supplied base dataset
    /// of pass-through attributes copied into every instance.
    pub fn convert_with_base(
        &self,
        volume: &Volume,
        base: &InMemDicomObject,
        options: &SeriesOptions,
    ) -> Result<Vec<EncodedSlice>, ConvertError> {
        let run = self.prepare(base, options)?;
        let total = volume.slice_count();
        debug!("converting {total} slices, series {}", run.series_uid);

        let mut results = Vec::with_capacity(total);
        for index in 0..total {
            results.push(self.convert_slice(volume, &run, index, total, options)?);
        }
        Ok(results)
    }

    /// Parallel variant: slices are extracted and encoded across the rayon
    /// pool and the results re-sorted by slice index. Fails with the same
    /// errors as [`convert`](Self::convert); which failing slice is reported
    /// is unspecified when several fail.
    pub fn convert_parallel(
        &self,
        volume: &Volume,
        base: &InMemDicomObject,
        options: &SeriesOptions,
    ) -> Result<Vec<EncodedSlice>, ConvertError>
    where
        E: Sync,
        U: Sync,
    {
        let run = self.prepare(base, options)?;
        let total = volume.slice_count();
        debug!("converting {total} slices in parallel, series {}", run.series_uid);

        let mut results = (0..total)
            .into_par_iter()
            .map(|index| self.convert_slice(volume, &run, index, total, options))
            .collect::<Result<Vec<_>, _>>()?;
        results.sort_by_key(|slice| slice.slice_index);
        Ok(results)
    }

    /// Resolve the identifiers shared by the whole run before any slice
    /// work starts.
    fn prepare(
        &self,
        base: &InMemDicomObject,
        options: &SeriesOptions,
    ) -> Result<RunContext, ConvertError> {
        if !options.filename_pattern.contains(INDEX_PLACEHOLDER) {
            return Err(ConvertError::MissingIndexPlaceholder(
                options.filename_pattern.clone(),
            ));
        }

        let mut base = base.clone();
        let series_uid = base
            .element(tags::SERIES_INSTANCE_UID)
            .ok()
            .and_then(|e| e.to_str().ok().map(|s| s.into_owned()))
            .or_else(|| options.series_uid.clone())
            .unwrap_or_else(|| self.uids.new_series_uid());
        if base.element(tags::STUDY_INSTANCE_UID).is_err() {
            base.put(DataElement::new(
                tags::STUDY_INSTANCE_UID,
                VR::UI,
                PrimitiveValue::from(self.uids.new_series_uid()),
            ));
        }
        Ok(RunContext { base, series_uid })
    }

    fn convert_slice(
        &self,
        volume: &Volume,
        run: &RunContext,
        index: usize,
        total: usize,
        options: &SeriesOptions,
    ) -> Result<EncodedSlice, ConvertError> {
        let section = volume.extract_slice(index).map_err(|source| ConvertError::Slice {
            index,
            snapshot: dataset_snapshot(&run.base),
            source: source.into(),
        })?;

        let builder = SliceDatasetBuilder::new(&self.uids, &run.series_uid, options);
        let dataset = builder
            .build(&run.base, index, total, &section)
            .map_err(|source| ConvertError::Slice {
                index,
                snapshot: dataset_snapshot(&run.base),
                source: source.into(),
            })?;

        let bytes = self
            .encoder
            .encode(&section, &dataset)
            .map_err(|source| ConvertError::Slice {
                index,
                snapshot: dataset_snapshot(&dataset),
                source: source.into(),
            })?;
        debug!("slice {index}: {} bytes", bytes.len());

        Ok(EncodedSlice {
            filename: format_filename(&options.filename_pattern, index),
            bytes,
            slice_index: index,
        })
    }
}

fn format_filename(pattern: &str, index: usize) -> String {
    pattern.replacen(INDEX_PLACEHOLDER, &format!("{index:04}"), 1)
}
