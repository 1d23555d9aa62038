use dicom::core::{DataElement, PrimitiveValue, Tag, VR, dicom_value};
use dicom::object::InMemDicomObject;
use dicom_dictionary_std::{tags, uids};
use log::warn;
use thiserror::Error;

use crate::enums::ComponentType;
use crate::series_writer::SeriesOptions;
use crate::uid::UidAllocator;
use crate::volume::CrossSection;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("component type {0:?} has no DICOM pixel encoding")]
    UnsupportedComponentType(ComponentType),
}

/// Assembles the full attribute set of one instance.
///
/// Starts from a copy of the caller-supplied base dataset and layers the
/// per-slice attributes on top: identifiers, spatial position, pixel
/// encoding, and the optional descriptive fields. Caller-supplied values in
/// the base dataset win for everything except the SOP instance UID, which is
/// always freshly allocated.
pub struct SliceDatasetBuilder<'a> {
    uids: &'a dyn UidAllocator,
    series_uid: &'a str,
    options: &'a SeriesOptions,
}

impl<'a> SliceDatasetBuilder<'a> {
    pub fn new(uids: &'a dyn UidAllocator, series_uid: &'a str, options: &'a SeriesOptions) -> Self {
        Self {
            uids,
            series_uid,
            options,
        }
    }

    /// Build the dataset for the slice at `index` out of `total`.
    ///
    /// # Errors
    ///
    /// Fails when the component type has no pixel encoding and strict mode
    /// is enabled.
    pub fn build(
        &self,
        base: &InMemDicomObject,
        index: usize,
        total: usize,
        section: &CrossSection<'_>,
    ) -> Result<InMemDicomObject, DatasetError> {
        let mut dataset = base.clone();

        self.put_identity(&mut dataset, index);
        self.put_spatial(&mut dataset, total, section);
        self.put_descriptive(&mut dataset);
        self.put_pixel_encoding(&mut dataset, section)?;

        Ok(dataset)
    }

    fn put_identity(&self, dataset: &mut InMemDicomObject, index: usize) {
        if dataset.element(tags::SOP_CLASS_UID).is_err() {
            put_str(
                dataset,
                tags::SOP_CLASS_UID,
                VR::UI,
                uids::SECONDARY_CAPTURE_IMAGE_STORAGE,
            );
        }
        // The series UID is shared by every slice of the run and therefore
        // only written when the base dataset does not already carry one.
        if dataset.element(tags::SERIES_INSTANCE_UID).is_err() {
            put_str(dataset, tags::SERIES_INSTANCE_UID, VR::UI, self.series_uid);
        }
        // The instance UID is never inherited.
        put_str(
            dataset,
            tags::SOP_INSTANCE_UID,
            VR::UI,
            self.uids.new_instance_uid(),
        );

        let number = self.options.instance_number_start as i64 + index as i64;
        put_str(dataset, tags::INSTANCE_NUMBER, VR::IS, number.to_string());
    }

    fn put_spatial(&self, dataset: &mut InMemDicomObject, total: usize, section: &CrossSection<'_>) {
        dataset.put(DataElement::new(
            tags::IMAGE_POSITION_PATIENT,
            VR::DS,
            dicom_value!(
                Strs,
                [
                    decimal(section.origin[0]),
                    decimal(section.origin[1]),
                    decimal(section.z_position)
                ]
            ),
        ));
        put_str(
            dataset,
            tags::SLICE_LOCATION,
            VR::DS,
            decimal(section.z_position),
        );
        put_str(
            dataset,
            tags::IMAGES_IN_ACQUISITION,
            VR::IS,
            total.to_string(),
        );

        // Row spacing before column spacing, the reader convention.
        dataset.put(DataElement::new(
            tags::PIXEL_SPACING,
            VR::DS,
            dicom_value!(Strs, [decimal(section.spacing[1]), decimal(section.spacing[0])]),
        ));

        // Direction cosines of the image row and column axes: the columns of
        // the in-plane 2x2 block, padded with a zero through-plane component.
        let d = section.direction;
        dataset.put(DataElement::new(
            tags::IMAGE_ORIENTATION_PATIENT,
            VR::DS,
            dicom_value!(
                Strs,
                [
                    decimal(d[0]),
                    decimal(d[2]),
                    decimal(0.0),
                    decimal(d[1]),
                    decimal(d[3]),
                    decimal(0.0)
                ]
            ),
        ));
    }

    fn put_descriptive(&self, dataset: &mut InMemDicomObject) {
        if let Some(description) = &self.options.series_description
            && dataset.element(tags::SERIES_DESCRIPTION).is_err()
        {
            put_str(dataset, tags::SERIES_DESCRIPTION, VR::LO, description.as_str());
        }
        if let Some(number) = self.options.series_number
            && dataset.element(tags::SERIES_NUMBER).is_err()
        {
            put_str(dataset, tags::SERIES_NUMBER, VR::IS, number.to_string());
        }
        if let Some(modality) = self.options.modality
            && dataset.element(tags::MODALITY).is_err()
        {
            put_str(dataset, tags::MODALITY, VR::CS, modality.as_str());
        }
    }

    fn put_pixel_encoding(
        &self,
        dataset: &mut InMemDicomObject,
        section: &CrossSection<'_>,
    ) -> Result<(), DatasetError> {
        let encoding = section.component_type.encoding(self.options.strict)?;
        if section.component_type.encoding(true).is_err() {
            warn!(
                "component type {:?} stored with the default 16-bit unsigned encoding",
                section.component_type
            );
        }

        put_u16(dataset, tags::SAMPLES_PER_PIXEL, section.components_per_pixel as u16);
        let photometric = if section.components_per_pixel == 1 {
            "MONOCHROME2"
        } else {
            "RGB"
        };
        put_str(dataset, tags::PHOTOMETRIC_INTERPRETATION, VR::CS, photometric);

        put_u16(dataset, tags::ROWS, section.size[1] as u16);
        put_u16(dataset, tags::COLUMNS, section.size[0] as u16);

        put_u16(dataset, tags::BITS_ALLOCATED, encoding.bits_allocated);
        put_u16(dataset, tags::BITS_STORED, encoding.bits_stored);
        put_u16(dataset, tags::HIGH_BIT, encoding.high_bit);
        put_u16(
            dataset,
            tags::PIXEL_REPRESENTATION,
            encoding.pixel_representation,
        );
        Ok(())
    }
}

fn put_str(dataset: &mut InMemDicomObject, tag: Tag, vr: VR, value: impl Into<String>) {
    dataset.put(DataElement::new(tag, vr, PrimitiveValue::from(value.into())));
}

fn put_u16(dataset: &mut InMemDicomObject, tag: Tag, value: u16) {
    dataset.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
}

/// Fixed 6-fractional-digit decimal string, so writer and reader never
/// disagree through locale or float-formatting drift.
fn decimal(value: f64) -> String {
    format!("{value:.6}")
}

/// Human-readable dump of a dataset for failure context. Pixel data is
/// elided and long values are truncated.
pub(crate) fn dataset_snapshot(dataset: &InMemDicomObject) -> Vec<String> {
    dataset
        .into_iter()
        .map(|element| {
            let header = element.header();
            if header.tag == tags::PIXEL_DATA {
                return format!("{} {}: <pixel data elided>", header.tag, header.vr());
            }
            let mut value = element.to_str().unwrap_or_default().into_owned();
            if value.len() > 64 {
                value.truncate(64);
                value.push_str("...");
            }
            format!("{} {}: {}", header.tag, header.vr(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use dicom::core::VR;
    use rstest::rstest;

    use super::*;
    use crate::volume::{IDENTITY_DIRECTION, Volume};
    use ndarray::Array3;

    /// Deterministic allocator: instance UIDs count up from 1.
    struct CountingUids(AtomicUsize);

    impl CountingUids {
        fn new() -> Self {
            Self(AtomicUsize::new(0))
        }
    }

    impl UidAllocator for CountingUids {
        fn new_series_uid(&self) -> String {
            "1.2.3.0".to_owned()
        }

        fn new_instance_uid(&self) -> String {
            let n = self.0.fetch_add(1, Ordering::Relaxed) + 1;
            format!("1.2.3.{n}")
        }
    }

    fn test_volume() -> Volume {
        let array = Array3::from_shape_fn((3, 4, 4), |(z, y, x)| (z * 16 + y * 4 + x) as u16);
        Volume::from_array3(&array, [1.0, 1.5, 5.0], [0.0, 0.0, 0.0], IDENTITY_DIRECTION)
    }

    #[rstest]
    #[case(ComponentType::UInt8, 8, 7, 0, VR::OB)]
    #[case(ComponentType::Int8, 8, 7, 1, VR::OB)]
    #[case(ComponentType::UInt16, 16, 15, 0, VR::OW)]
    #[case(ComponentType::Int16, 16, 15, 1, VR::OW)]
    #[case(ComponentType::UInt32, 32, 31, 0, VR::OL)]
    #[case(ComponentType::Int32, 32, 31, 1, VR::OL)]
    fn integer_kinds_map_per_table(
        #[case] kind: ComponentType,
        #[case] bits: u16,
        #[case] high_bit: u16,
        #[case] representation: u16,
        #[case] vr: VR,
    ) {
        let encoding = kind.encoding(true).unwrap();
        assert_eq!(encoding.bits_allocated, bits);
        assert_eq!(encoding.bits_stored, bits);
        assert_eq!(encoding.high_bit, high_bit);
        assert_eq!(encoding.pixel_representation, representation);
        assert_eq!(encoding.vr, vr);
    }

    #[rstest]
    #[case(ComponentType::Float16)]
    #[case(ComponentType::Float32)]
    #[case(ComponentType::Float64)]
    #[case(ComponentType::Int64)]
    #[case(ComponentType::UInt64)]
    fn other_kinds_default_to_unsigned_words(#[case] kind: ComponentType) {
        let encoding = kind.encoding(false).unwrap();
        assert_eq!(encoding.bits_allocated, 16);
        assert_eq!(encoding.pixel_representation, 0);
        assert_eq!(encoding.vr, VR::OW);

        assert!(matches!(
            kind.encoding(true),
            Err(DatasetError::UnsupportedComponentType(k)) if k == kind
        ));
    }

    #[test]
    fn decimal_formatting_is_fixed_precision() {
        assert_eq!(decimal(6.0), "6.000000");
        assert_eq!(decimal(-0.5), "-0.500000");
    }

    #[test]
    fn spatial_attributes_follow_the_section() {
        let volume = test_volume();
        let section = volume.extract_slice(2).unwrap();
        let uids = CountingUids::new();
        let options = SeriesOptions::default();
        let builder = SliceDatasetBuilder::new(&uids, "1.2.3.0", &options);

        let dataset = builder
            .build(&InMemDicomObject::new_empty(), 2, 3, &section)
            .unwrap();

        let position = dataset
            .element(tags::IMAGE_POSITION_PATIENT)
            .unwrap()
            .to_multi_float64()
            .unwrap();
        assert_eq!(position, vec![0.0, 0.0, 10.0]);
        assert_eq!(
            dataset.element(tags::SLICE_LOCATION).unwrap().to_str().unwrap(),
            "10.000000"
        );

        // row spacing (axis 1) precedes column spacing (axis 0)
        let spacing = dataset
            .element(tags::PIXEL_SPACING)
            .unwrap()
            .to_multi_float64()
            .unwrap();
        assert_eq!(spacing, vec![1.5, 1.0]);

        let orientation = dataset
            .element(tags::IMAGE_ORIENTATION_PATIENT)
            .unwrap()
            .to_multi_float64()
            .unwrap();
        assert_eq!(orientation, vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);

        let total = dataset
            .element(tags::IMAGES_IN_ACQUISITION)
            .unwrap()
            .to_int::<i32>()
            .unwrap();
        assert_eq!(total, 3);
    }

    #[test]
    fn instance_number_offsets_from_the_configured_start() {
        let volume = test_volume();
        let section = volume.extract_slice(0).unwrap();
        let uids = CountingUids::new();
        let options = SeriesOptions {
            instance_number_start: 100,
            ..SeriesOptions::default()
        };
        let builder = SliceDatasetBuilder::new(&uids, "1.2.3.0", &options);

        let dataset = builder
            .build(&InMemDicomObject::new_empty(), 4, 10, &section)
            .unwrap();
        let number = dataset
            .element(tags::INSTANCE_NUMBER)
            .unwrap()
            .to_int::<i32>()
            .unwrap();
        assert_eq!(number, 104);
    }

    #[test]
    fn base_series_uid_wins_but_instance_uids_are_fresh() {
        let volume = test_volume();
        let section = volume.extract_slice(0).unwrap();
        let uids = CountingUids::new();
        let options = SeriesOptions::default();
        let builder = SliceDatasetBuilder::new(&uids, "9.9.9", &options);

        let mut base = InMemDicomObject::new_empty();
        base.put(DataElement::new(
            tags::SERIES_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from("5.5.5"),
        ));

        let first = builder.build(&base, 0, 3, &section).unwrap();
        let second = builder.build(&base, 1, 3, &section).unwrap();

        for dataset in [&first, &second] {
            assert_eq!(
                dataset
                    .element(tags::SERIES_INSTANCE_UID)
                    .unwrap()
                    .to_str()
                    .unwrap(),
                "5.5.5"
            );
        }
        let uid_a = first.element(tags::SOP_INSTANCE_UID).unwrap().to_str().unwrap().into_owned();
        let uid_b = second.element(tags::SOP_INSTANCE_UID).unwrap().to_str().unwrap().into_owned();
        assert_ne!(uid_a, uid_b);
    }

    #[test]
    fn pixel_encoding_attributes_for_u16_volume() {
        let volume = test_volume();
        let section = volume.extract_slice(0).unwrap();
        let uids = CountingUids::new();
        let options = SeriesOptions::default();
        let builder = SliceDatasetBuilder::new(&uids, "1.2.3.0", &options);

        let dataset = builder
            .build(&InMemDicomObject::new_empty(), 0, 3, &section)
            .unwrap();

        let read = |tag| {
            dataset
                .element(tag)
                .unwrap()
                .to_int::<u16>()
                .unwrap()
        };
        assert_eq!(read(tags::BITS_ALLOCATED), 16);
        assert_eq!(read(tags::BITS_STORED), 16);
        assert_eq!(read(tags::HIGH_BIT), 15);
        assert_eq!(read(tags::PIXEL_REPRESENTATION), 0);
        assert_eq!(read(tags::SAMPLES_PER_PIXEL), 1);
        assert_eq!(read(tags::ROWS), 4);
        assert_eq!(read(tags::COLUMNS), 4);
        assert_eq!(
            dataset
                .element(tags::PHOTOMETRIC_INTERPRETATION)
                .unwrap()
                .to_str()
                .unwrap(),
            "MONOCHROME2"
        );
    }

    #[test]
    fn descriptive_fields_only_when_supplied_and_absent() {
        let volume = test_volume();
        let section = volume.extract_slice(0).unwrap();
        let uids = CountingUids::new();
        let options = SeriesOptions {
            series_description: Some("T1 axial".to_owned()),
            series_number: Some(4),
            modality: Some(crate::enums::Modality::Mr),
            ..SeriesOptions::default()
        };
        let builder = SliceDatasetBuilder::new(&uids, "1.2.3.0", &options);

        let mut base = InMemDicomObject::new_empty();
        base.put(DataElement::new(
            tags::SERIES_DESCRIPTION,
            VR::LO,
            PrimitiveValue::from("from base"),
        ));

        let dataset = builder.build(&base, 0, 3, &section).unwrap();
        assert_eq!(
            dataset
                .element(tags::SERIES_DESCRIPTION)
                .unwrap()
                .to_str()
                .unwrap(),
            "from base"
        );
        assert_eq!(dataset.element(tags::MODALITY).unwrap().to_str().unwrap(), "MR");
        assert_eq!(
            dataset
                .element(tags::SERIES_NUMBER)
                .unwrap()
                .to_int::<i32>()
                .unwrap(),
            4
        );
    }

    #[test]
    fn snapshot_elides_pixel_data() {
        let mut dataset = InMemDicomObject::new_empty();
        dataset.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OW,
            PrimitiveValue::from(vec![0u8; 32]),
        ));
        let lines = dataset_snapshot(&dataset);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("elided"));
    }
}
