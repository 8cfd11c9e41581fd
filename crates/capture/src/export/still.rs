use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};

use super::ExportError;

pub const JPEG_QUALITY: u8 = 75;

pub(crate) fn create_still_dir(dir: &Path) -> Result<(), ExportError> {
    fs::create_dir(dir).map_err(|source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

/// Writes one frame as an opaque JPEG.
pub(crate) fn write_still(path: &Path, pixels: RgbaImage) -> Result<(), ExportError> {
    let rgb = DynamicImage::ImageRgba8(pixels).into_rgb8();
    let file = File::create(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|source| ExportError::Image {
            path: path.to_path_buf(),
            source,
        })?;
    writer.flush().map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}
