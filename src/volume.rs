use std::collections::BTreeMap;

use ndarray::Array3;
use thiserror::Error;

use crate::enums::ComponentType;

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("expected a 3-dimensional volume, got {0} dimensions")]
    NotThreeDimensional(usize),

    #[error("{field} has {actual} values, expected {expected}")]
    GeometryLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("components per pixel must be at least 1")]
    NoComponents,

    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("slice index {index} out of bounds for volume with {len} slices")]
    SliceOutOfBounds { index: usize, len: usize },
}

/// Scalar types that can back a [`Volume`] pixel buffer.
pub trait PixelComponent: bytemuck::Pod {
    const KIND: ComponentType;
}

macro_rules! impl_pixel_component {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(impl PixelComponent for $ty {
            const KIND: ComponentType = ComponentType::$kind;
        })*
    };
}

impl_pixel_component! {
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    half::f16 => Float16,
    f32 => Float32,
    f64 => Float64,
}

/// An immutable, already-decoded 3D image.
///
/// The pixel buffer is contiguous in `[z][y][x][component]` order (z-major),
/// matching what the ITK-style decoders produce. All dimensional invariants
/// are checked in [`Volume::new`]; once constructed, a `Volume` cannot
/// describe an inconsistent image.
#[derive(Debug)]
pub struct Volume {
    size: [usize; 3],
    spacing: [f64; 3],
    origin: [f64; 3],
    direction: [f64; 9],
    component_type: ComponentType,
    components_per_pixel: usize,
    bytes: Vec<u8>,
    metadata: BTreeMap<String, String>,
}

/// A single cross-section of a [`Volume`].
///
/// Borrows the slab of the volume buffer belonging to one slice index and
/// carries the reduced spatial metadata derived from the volume geometry.
/// Lives only as long as the iteration that produced it.
pub struct CrossSection<'a> {
    pub size: [usize; 2],
    pub spacing: [f64; 2],
    /// Physical position of the slice's first pixel, in-plane components.
    pub origin: [f64; 2],
    /// Top-left 2x2 block of the volume direction matrix, row-major.
    pub direction: [f64; 4],
    /// Physical position along the through-plane axis.
    pub z_position: f64,
    pub component_type: ComponentType,
    pub components_per_pixel: usize,
    pub pixels: &'a [u8],
    /// Copied (never shared) from the volume so per-slice edits cannot leak
    /// into sibling slices.
    pub metadata: BTreeMap<String, String>,
}

impl Volume {
    /// Build a volume from decoder output, validating every invariant.
    ///
    /// `size`, `spacing` and `origin` must have exactly 3 entries and
    /// `direction` 9 (a row-major 3x3 direction-cosine matrix). The buffer
    /// length must equal
    /// `size[0] * size[1] * size[2] * components_per_pixel * byte width`.
    ///
    /// # Errors
    ///
    /// Returns an error when the image is not 3-dimensional, the geometry
    /// arrays are malformed, or the buffer length does not match the size.
    pub fn new(
        size: &[usize],
        spacing: &[f64],
        origin: &[f64],
        direction: &[f64],
        component_type: ComponentType,
        components_per_pixel: usize,
        bytes: Vec<u8>,
    ) -> Result<Self, VolumeError> {
        if size.len() != 3 {
            return Err(VolumeError::NotThreeDimensional(size.len()));
        }
        let geometry = [
            ("spacing", spacing.len(), 3),
            ("origin", origin.len(), 3),
            ("direction", direction.len(), 9),
        ];
        for (field, actual, expected) in geometry {
            if actual != expected {
                return Err(VolumeError::GeometryLength {
                    field,
                    expected,
                    actual,
                });
            }
        }
        if components_per_pixel == 0 {
            return Err(VolumeError::NoComponents);
        }
        let expected =
            size[0] * size[1] * size[2] * components_per_pixel * component_type.byte_width();
        if bytes.len() != expected {
            return Err(VolumeError::BufferSizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }

        let mut fixed_size = [0; 3];
        fixed_size.copy_from_slice(size);
        let mut fixed_spacing = [0.0; 3];
        fixed_spacing.copy_from_slice(spacing);
        let mut fixed_origin = [0.0; 3];
        fixed_origin.copy_from_slice(origin);
        let mut fixed_direction = [0.0; 9];
        fixed_direction.copy_from_slice(direction);

        Ok(Self {
            size: fixed_size,
            spacing: fixed_spacing,
            origin: fixed_origin,
            direction: fixed_direction,
            component_type,
            components_per_pixel,
            bytes,
            metadata: BTreeMap::new(),
        })
    }

    /// Build a single-component volume from an `ndarray` in `(depth, height,
    /// width)` order, the layout used throughout this crate's ecosystem.
    pub fn from_array3<T: PixelComponent>(
        array: &Array3<T>,
        spacing: [f64; 3],
        origin: [f64; 3],
        direction: [f64; 9],
    ) -> Self {
        let (depth, height, width) = array.dim();
        let data: Vec<T> = array.iter().copied().collect();
        Self {
            size: [width, height, depth],
            spacing,
            origin,
            direction,
            component_type: T::KIND,
            components_per_pixel: 1,
            bytes: bytemuck::cast_slice(&data).to_vec(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach key/value annotations carried over to every cross-section.
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Voxel counts as (width, height, depth).
    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    /// Number of slices along the through-plane axis.
    pub fn slice_count(&self) -> usize {
        self.size[2]
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    pub fn direction(&self) -> [f64; 9] {
        self.direction
    }

    pub fn component_type(&self) -> ComponentType {
        self.component_type
    }

    pub fn components_per_pixel(&self) -> usize {
        self.components_per_pixel
    }

    /// Raw pixel buffer, `[z][y][x][component]` order.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Extract the cross-section at `index`.
    ///
    /// The returned section borrows the slab for that index without copying;
    /// the volume buffer is never written through it. The section origin is
    /// advanced from the volume origin along the *third* column of the
    /// direction matrix, scaled by the through-plane spacing, while the
    /// in-plane orientation comes from the top-left 2x2 block. Downstream
    /// viewers rely on exactly this split to re-stack the series, so it is a
    /// fixed contract.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::SliceOutOfBounds`] when `index` is not in
    /// `[0, slice_count())`.
    pub fn extract_slice(&self, index: usize) -> Result<CrossSection<'_>, VolumeError> {
        let len = self.size[2];
        if index >= len {
            return Err(VolumeError::SliceOutOfBounds { index, len });
        }

        let slab_bytes = self.size[0]
            * self.size[1]
            * self.components_per_pixel
            * self.component_type.byte_width();
        let start = index * slab_bytes;
        let pixels = &self.bytes[start..start + slab_bytes];

        let step = index as f64 * self.spacing[2];
        let origin = [
            self.origin[0] + step * self.direction[2],
            self.origin[1] + step * self.direction[5],
        ];
        let z_position = self.origin[2] + step * self.direction[8];

        Ok(CrossSection {
            size: [self.size[0], self.size[1]],
            spacing: [self.spacing[0], self.spacing[1]],
            origin,
            direction: [
                self.direction[0],
                self.direction[1],
                self.direction[3],
                self.direction[4],
            ],
            z_position,
            component_type: self.component_type,
            components_per_pixel: self.components_per_pixel,
            pixels,
            metadata: self.metadata.clone(),
        })
    }
}

/// Row-major identity direction-cosine matrix (axis-aligned volume).
pub const IDENTITY_DIRECTION: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_volume() -> Volume {
        let array = Array3::from_shape_fn((3, 4, 4), |(z, y, x)| (z * 16 + y * 4 + x) as u16);
        Volume::from_array3(&array, [1.0, 1.0, 2.0], [0.0, 0.0, 0.0], IDENTITY_DIRECTION)
    }

    #[test]
    fn extracted_slab_has_one_slice_of_pixels() {
        let volume = gradient_volume();
        for index in 0..volume.slice_count() {
            let section = volume.extract_slice(index).unwrap();
            assert_eq!(section.pixels.len(), 4 * 4 * 2);
            assert_eq!(section.size, [4, 4]);
        }
    }

    #[test]
    fn slab_contents_match_volume_layout() {
        let volume = gradient_volume();
        let section = volume.extract_slice(1).unwrap();
        let values: &[u16] = bytemuck::cast_slice(section.pixels);
        assert_eq!(values[0], 16);
        assert_eq!(values[15], 31);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let volume = gradient_volume();
        assert!(matches!(
            volume.extract_slice(3),
            Err(VolumeError::SliceOutOfBounds { index: 3, len: 3 })
        ));
    }

    #[test]
    fn position_advances_along_third_direction_column() {
        let volume = gradient_volume();
        let section = volume.extract_slice(3 - 1).unwrap();
        assert_eq!(section.z_position, 4.0);
        assert_eq!(section.origin, [0.0, 0.0]);

        // spacing[2] = 2, identity direction: index 3 of a longer volume
        // would sit at z = 6.
        let array = Array3::from_shape_fn((5, 2, 2), |_| 0u16);
        let volume =
            Volume::from_array3(&array, [1.0, 1.0, 2.0], [0.0, 0.0, 0.0], IDENTITY_DIRECTION);
        let section = volume.extract_slice(3).unwrap();
        assert_eq!(section.z_position, 6.0);
        assert_eq!(section.origin, [0.0, 0.0]);
    }

    #[test]
    fn oblique_direction_shifts_inplane_origin() {
        let direction = [1.0, 0.0, 0.5, 0.0, 1.0, 0.25, 0.0, 0.0, 1.0];
        let array = Array3::from_shape_fn((4, 2, 2), |_| 0u16);
        let volume = Volume::from_array3(&array, [1.0, 1.0, 2.0], [10.0, 20.0, 30.0], direction);
        let section = volume.extract_slice(2).unwrap();
        // step = 2 * 2.0 = 4 along column 2 of the matrix
        assert_eq!(section.origin, [12.0, 21.0]);
        assert_eq!(section.z_position, 34.0);
        // in-plane block is untouched by the through-plane column
        assert_eq!(section.direction, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn non_three_dimensional_input_is_rejected() {
        let err = Volume::new(
            &[4, 4],
            &[1.0, 1.0, 1.0],
            &[0.0, 0.0, 0.0],
            &IDENTITY_DIRECTION,
            ComponentType::UInt16,
            1,
            vec![0; 32],
        )
        .unwrap_err();
        assert!(matches!(err, VolumeError::NotThreeDimensional(2)));
    }

    #[test]
    fn buffer_length_must_match_size() {
        let err = Volume::new(
            &[4, 4, 3],
            &[1.0, 1.0, 1.0],
            &[0.0, 0.0, 0.0],
            &IDENTITY_DIRECTION,
            ComponentType::UInt16,
            1,
            vec![0; 10],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            VolumeError::BufferSizeMismatch {
                expected: 96,
                actual: 10
            }
        ));
    }

    #[test]
    fn metadata_is_copied_into_sections() {
        let mut metadata = BTreeMap::new();
        metadata.insert("PatientID".to_owned(), "A-001".to_owned());
        let volume = gradient_volume().with_metadata(metadata);

        let mut first = volume.extract_slice(0).unwrap();
        first.metadata.insert("edited".to_owned(), "yes".to_owned());

        let second = volume.extract_slice(1).unwrap();
        assert_eq!(second.metadata.get("PatientID").unwrap(), "A-001");
        assert!(!second.metadata.contains_key("edited"));
    }
}
