use std::fs;
use std::path::PathBuf;

use ndarray::Array3;

use dicom_series::{
    enums::Modality,
    series_writer::{SeriesConverter, SeriesOptions},
    volume::{IDENTITY_DIRECTION, Volume},
};

fn main() {
    env_logger::init();

    let array = Array3::from_shape_fn((16, 128, 128), |(z, y, x)| (x + y + 8 * z) as u16);
    let volume = Volume::from_array3(&array, [1.0, 1.0, 5.0], [0.0, 0.0, 0.0], IDENTITY_DIRECTION);

    let options = SeriesOptions {
        series_description: Some("synthetic gradient".to_owned()),
        modality: Some(Modality::Ot),
        ..SeriesOptions::default()
    };
    let converter = SeriesConverter::new();
    let slices = converter
        .convert(&volume, &options)
        .expect("should have converted the volume");

    let out_dir = PathBuf::from("series");
    fs::create_dir_all(&out_dir).expect("should have created the output directory");
    let count = slices.len();
    for slice in slices {
        fs::write(out_dir.join(&slice.filename), &slice.bytes)
            .expect("should have written the instance");
    }
    println!("wrote {count} instances to {}", out_dir.display());
}
