// src/engine/decoder.rs
//
// Decoder operations: format sniffing, dimension checks and single-image
// decode through image-rs. Multi-frame walking lives in `codecs`.

use crate::engine::common::run_with_panic_policy;
use crate::engine::firewall::DecodeLimits;
use crate::engine::raster::Raster;
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::{RasterKitError, Result};
use crate::ops::ImageType;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;
use tracing::debug;

/// ISO-BMFF brands that identify HEIF/HEIC payloads.
const HEIF_BRANDS: [&[u8; 4]; 6] = [b"heic", b"heix", b"hevc", b"hevx", b"mif1", b"msf1"];

/// Detect input format using magic bytes. Returns None if unknown.
pub fn detect_format(bytes: &[u8]) -> Option<ImageType> {
    if is_heif(bytes) {
        return Some(ImageType::Heic);
    }
    image::guess_format(bytes)
        .ok()
        .and_then(ImageType::from_image_format)
}

fn is_heif(bytes: &[u8]) -> bool {
    bytes.len() >= 12
        && &bytes[4..8] == b"ftyp"
        && HEIF_BRANDS.iter().any(|brand| &bytes[8..12] == *brand)
}

/// Check if image dimensions are within the global safety limits.
/// Returns an error if the image is too large (potential decompression bomb).
pub fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(RasterKitError::limit_exceeded(format!(
            "dimension {} exceeds max {}",
            width.max(height),
            MAX_DIMENSION
        )));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(RasterKitError::limit_exceeded(format!(
            "pixel count {pixels} exceeds max {MAX_PIXELS}"
        )));
    }
    Ok(())
}

/// Header dimensions without decoding pixels.
pub fn read_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Inspect encoded bytes and ensure the image dimensions are safe before decoding.
pub fn ensure_dimensions_safe(bytes: &[u8], limits: &DecodeLimits) -> Result<()> {
    match read_dimensions(bytes) {
        Some((width, height)) => limits.enforce_dimensions(width, height),
        None => Ok(()),
    }
}

/// Decode the first image in `bytes` under the global panic policy.
pub fn decode_image(bytes: &[u8]) -> Result<(DynamicImage, ImageType)> {
    let image_type = detect_format(bytes)
        .ok_or_else(|| RasterKitError::invalid_image("unrecognised image data"))?;
    if image_type == ImageType::Heic {
        return Err(RasterKitError::invalid_image("no HEIC decoder is available"));
    }
    ensure_dimensions_safe(bytes, &DecodeLimits::default())?;

    let img = run_with_panic_policy("decode:image", || {
        image::load_from_memory(bytes)
            .map_err(|e| RasterKitError::invalid_image(format!("decode failed: {e}")))
    })?;
    check_dimensions(img.width(), img.height())?;
    debug!(
        target: "rasterkit::decode",
        format = %image_type,
        width = img.width(),
        height = img.height(),
        "decoded image"
    );
    Ok((img, image_type))
}

/// Decode straight into a raster.
pub fn decode_raster(bytes: &[u8]) -> Result<Raster> {
    let (img, _) = decode_image(bytes)?;
    Raster::from_dynamic_image(&img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    fn encode_as(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |_, _| Rgb([0, 0, 0]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), format)
            .unwrap();
        buffer
    }

    #[test]
    fn test_ensure_dimensions_safe_allows_small_image() {
        let data = encode_as(64, 64, ImageFormat::Png);
        assert!(ensure_dimensions_safe(&data, &DecodeLimits::default()).is_ok());
    }

    #[test]
    fn test_ensure_dimensions_safe_rejects_large_image() {
        let data = encode_as(MAX_DIMENSION + 1, 1, ImageFormat::Png);
        let err = ensure_dimensions_safe(&data, &DecodeLimits::default()).unwrap_err();
        assert!(matches!(err, RasterKitError::LimitExceeded { .. }));
    }

    #[test]
    fn test_strict_limits_reject_medium_image() {
        let data = encode_as(16_385, 1, ImageFormat::Png);
        assert!(ensure_dimensions_safe(&data, &DecodeLimits::strict()).is_err());
        assert!(ensure_dimensions_safe(&data, &DecodeLimits::default()).is_ok());
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(
            detect_format(&encode_as(2, 2, ImageFormat::Png)),
            Some(ImageType::Png)
        );
        assert_eq!(
            detect_format(&encode_as(2, 2, ImageFormat::Jpeg)),
            Some(ImageType::Jpeg)
        );
        assert_eq!(
            detect_format(&encode_as(2, 2, ImageFormat::Bmp)),
            Some(ImageType::Bmp)
        );
        assert_eq!(detect_format(b"not an image"), None);
    }

    #[test]
    fn test_detect_heic_brand() {
        let mut data = vec![0, 0, 0, 24];
        data.extend_from_slice(b"ftypheic");
        data.extend_from_slice(&[0; 12]);
        assert_eq!(detect_format(&data), Some(ImageType::Heic));
        let err = decode_image(&data).unwrap_err();
        assert!(matches!(err, RasterKitError::InvalidImage { .. }));
    }

    #[test]
    fn test_decode_image_reports_format() {
        let (img, fmt) = decode_image(&encode_as(3, 2, ImageFormat::Png)).unwrap();
        assert_eq!(fmt, ImageType::Png);
        assert_eq!((img.width(), img.height()), (3, 2));
    }

    #[test]
    fn test_garbage_is_invalid_image() {
        assert!(matches!(
            decode_raster(&[0u8; 16]),
            Err(RasterKitError::InvalidImage { .. })
        ));
        let mut truncated = encode_as(8, 8, ImageFormat::Png);
        truncated.truncate(40);
        assert!(decode_raster(&truncated).is_err());
    }
}
