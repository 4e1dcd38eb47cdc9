use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::Serialize;
use std::io::Cursor;

use crate::errors::PhotoError;

/// Edge length of stored thumbnails, in pixels.
pub const THUMBNAIL_SIZE: u32 = 150;

/// JPEG quality of stored thumbnails
const JPEG_QUALITY: u8 = 85;

const DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// Clockwise rotation applied to an upload before it is stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Next quarter turn, wrapping back to `None`.
    pub fn next(self) -> Self {
        match self {
            Rotation::None => Rotation::Cw90,
            Rotation::Cw90 => Rotation::Cw180,
            Rotation::Cw180 => Rotation::Cw270,
            Rotation::Cw270 => Rotation::None,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }

    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Rotation::None => image,
            Rotation::Cw90 => image.rotate90(),
            Rotation::Cw180 => image.rotate180(),
            Rotation::Cw270 => image.rotate270(),
        }
    }
}

/// Result of reading a stored photo cell.
#[derive(Debug)]
pub enum PhotoDecode {
    Image(DynamicImage),
    /// The cell is empty.
    Missing,
    /// The cell holds something that is not a readable image data URI.
    Malformed,
}

impl PhotoDecode {
    pub fn into_image(self) -> Option<DynamicImage> {
        match self {
            PhotoDecode::Image(image) => Some(image),
            PhotoDecode::Missing | PhotoDecode::Malformed => None,
        }
    }
}

/// Turns an uploaded picture into a bounded thumbnail data URI.
///
/// The picture is rotated, center-cropped to a square and scaled to
/// [`THUMBNAIL_SIZE`] before being re-encoded as JPEG.
pub fn encode_photo(bytes: &[u8], rotation: Rotation) -> Result<String, PhotoError> {
    if bytes.is_empty() {
        return Err(PhotoError::Empty);
    }
    let image = rotation.apply(image::load_from_memory(bytes)?);
    let thumbnail = image.resize_to_fill(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Lanczos3);
    let jpeg = jpeg_bytes(&thumbnail)?;
    Ok(format!("{}{}", DATA_URI_PREFIX, STANDARD.encode(jpeg)))
}

/// Reads a photo cell. Never fails: bad input is reported as `Malformed`.
pub fn decode_photo(cell: &str) -> PhotoDecode {
    let cell = cell.trim();
    if cell.is_empty() {
        return PhotoDecode::Missing;
    }
    let Some((header, payload)) = cell.split_once(',') else {
        return PhotoDecode::Malformed;
    };
    if !header.starts_with("data:image") || !header.ends_with(";base64") {
        return PhotoDecode::Malformed;
    }

    let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let Ok(bytes) = STANDARD.decode(payload) else {
        return PhotoDecode::Malformed;
    };
    match image::load_from_memory(&bytes) {
        Ok(image) => PhotoDecode::Image(image),
        Err(_) => PhotoDecode::Malformed,
    }
}

/// Baseline JPEG encoding of an image, as embedded in PDF pages.
pub fn jpeg_bytes(image: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = Vec::new();
    {
        let mut cursor = Cursor::new(&mut buffer);
        let rgb = image.to_rgb8();
        let encoder = JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
        rgb.write_with_encoder(encoder)?;
    }
    Ok(buffer)
}
