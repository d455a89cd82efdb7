// src/engine/encoder.rs
//
// Encoder operations: JPEG, PNG, BMP through image-rs; TIFF and GIF through
// the multi-frame adapters in `codecs`. Orientation, GPS and resolution are
// written back with little_exif + img-parts, or as TIFF tags. GIF and BMP
// carry no GPS.

use crate::codecs::gif_frames::{encode_gif, GifFrameInput};
use crate::codecs::tiff_pages::{encode_tiff, TiffPageInput};
use crate::engine::common::run_with_panic_policy;
use crate::engine::io::png_phys_payload;
use crate::engine::raster::{AlphaInfo, ColorModel, Raster};
use crate::error::{RasterKitError, Result};
use crate::metadata::{GifProperties, GpsCoordinate, GpsProperties, ImageProperties, GIF_MIN_DELAY};
use crate::ops::ImageType;
use image::codecs::jpeg::{JpegEncoder, PixelDensity, PixelDensityUnit};
use image::{DynamicImage, ImageEncoder, ImageFormat};
use img_parts::png::{Png, PngChunk};
use img_parts::{jpeg::Jpeg, Bytes, ImageEXIF};
use little_exif::exif_tag::ExifTag;
use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;
use little_exif::rational::uR64;
use std::io::Cursor;
use tracing::{debug, error, warn};

/// JPEG quality used when no compression is given.
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

/// little_exif serialises a complete APP1 segment:
/// FF E1 (2) + length (2) + "Exif\0\0" (6). img-parts wants the payload only.
const APP1_HEADER_SIZE: usize = 10;

/// Per-image encode settings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EncodeOptions {
    /// 0.0 (smallest) ..= 1.0 (best). `None` or an infinite value selects
    /// the format default.
    pub compression: Option<f64>,
    pub exclude_gps: bool,
    pub properties: Option<ImageProperties>,
}

impl EncodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression(mut self, compression: f64) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn excluding_gps(mut self, exclude: bool) -> Self {
        self.exclude_gps = exclude;
        self
    }

    pub fn with_properties(mut self, properties: ImageProperties) -> Self {
        self.properties = Some(properties);
        self
    }
}

/// One frame of a multi-frame encode.
#[derive(Clone, Copy, Debug)]
pub struct FrameInput<'a> {
    pub raster: &'a Raster,
    pub properties: Option<&'a ImageProperties>,
    pub compression: Option<f64>,
}

impl<'a> FrameInput<'a> {
    pub fn new(raster: &'a Raster) -> Self {
        Self {
            raster,
            properties: None,
            compression: None,
        }
    }
}

/// Checks a compression value. Infinite values are the "unset" sentinel.
pub fn validate_compression(compression: Option<f64>) -> Result<Option<f64>> {
    match compression {
        None => Ok(None),
        Some(c) if c.is_infinite() => Ok(None),
        Some(c) if (0.0..=1.0).contains(&c) => Ok(Some(c)),
        Some(c) => Err(RasterKitError::invalid_compression(c)),
    }
}

/// JPEG quality (1..=100) for an already validated compression.
pub fn jpeg_quality(compression: Option<f64>) -> u8 {
    match compression {
        Some(c) => (c * 100.0).round().clamp(1.0, 100.0) as u8,
        None => DEFAULT_JPEG_QUALITY,
    }
}

/// Encodes a single raster.
pub fn encode_raster(raster: &Raster, image_type: ImageType, options: &EncodeOptions) -> Result<Vec<u8>> {
    let compression = validate_compression(options.compression)?;
    let props = options.properties.as_ref();
    let data = match image_type {
        ImageType::Jpeg => {
            let jpeg = encode_jpeg(raster, jpeg_quality(compression), props)?;
            attach_exif(jpeg, image_type, props, options.exclude_gps)?
        }
        ImageType::Png => {
            let png = encode_png(raster, props)?;
            attach_exif(png, image_type, props, options.exclude_gps)?
        }
        ImageType::Bmp => {
            warn_gps_dropped(image_type, props, options.exclude_gps);
            encode_with_format(raster, ImageFormat::Bmp)?
        }
        ImageType::Tiff => encode_tiff(&[tiff_page(raster, props, options.exclude_gps)])?,
        ImageType::Gif => {
            warn_gps_dropped(image_type, props, options.exclude_gps);
            let gif = props.and_then(|p| p.gif.as_ref());
            encode_gif(&[gif_frame(raster, gif)], gif.and_then(|g| g.loop_count))?
        }
        ImageType::Heic => return Err(heic_unsupported()),
    };
    debug!(
        target: "rasterkit::encode",
        format = %image_type,
        width = raster.width(),
        height = raster.height(),
        bytes = data.len(),
        "encoded image"
    );
    Ok(data)
}

/// Encodes `frames` into one container, in order.
///
/// Fails before any encoding when the target cannot hold `frames.len()`
/// images or any compression value is out of range.
pub fn encode_frames(frames: &[FrameInput<'_>], image_type: ImageType, exclude_gps: bool) -> Result<Vec<u8>> {
    if frames.is_empty() {
        error!(target: "rasterkit::encode", format = %image_type, "no frames to encode");
        return Err(RasterKitError::cannot_create_destination(
            image_type.identifier(),
            "no images to encode",
        ));
    }
    if frames.len() > 1 && !image_type.supports_multiple_frames() {
        error!(
            target: "rasterkit::encode",
            format = %image_type,
            frames = frames.len(),
            "format does not support multiple frames"
        );
        return Err(RasterKitError::cannot_create_destination(
            image_type.identifier(),
            format!("{} frames requested but the format holds one", frames.len()),
        ));
    }
    if image_type == ImageType::Heic {
        return Err(heic_unsupported());
    }
    for frame in frames {
        validate_compression(frame.compression)?;
    }

    match image_type {
        ImageType::Tiff => {
            let pages: Vec<_> = frames
                .iter()
                .map(|f| tiff_page(f.raster, f.properties, exclude_gps))
                .collect();
            encode_tiff(&pages)
        }
        ImageType::Gif => {
            for frame in frames {
                warn_gps_dropped(image_type, frame.properties, exclude_gps);
            }
            let loop_count = frames[0]
                .properties
                .and_then(|p| p.gif.as_ref())
                .and_then(|g| g.loop_count);
            let inputs: Vec<_> = frames
                .iter()
                .map(|f| gif_frame(f.raster, f.properties.and_then(|p| p.gif.as_ref())))
                .collect();
            encode_gif(&inputs, loop_count)
        }
        _ => {
            let frame = &frames[0];
            let options = EncodeOptions {
                compression: frame.compression,
                exclude_gps,
                properties: frame.properties.cloned(),
            };
            encode_raster(frame.raster, image_type, &options)
        }
    }
}

fn heic_unsupported() -> RasterKitError {
    RasterKitError::cannot_create_destination("heic", "no HEIC encoder is available")
}

fn tiff_page<'a>(raster: &'a Raster, props: Option<&'a ImageProperties>, exclude_gps: bool) -> TiffPageInput<'a> {
    TiffPageInput {
        raster,
        orientation: props.and_then(|p| p.orientation),
        dpi: props.and_then(explicit_dpi),
        gps: gps_to_write(props, exclude_gps),
    }
}

/// The GPS dictionary to serialise, void status included.
fn gps_to_write(props: Option<&ImageProperties>, exclude_gps: bool) -> Option<&GpsProperties> {
    if exclude_gps {
        return None;
    }
    props.and_then(|p| p.gps.as_ref())
}

fn warn_gps_dropped(image_type: ImageType, props: Option<&ImageProperties>, exclude_gps: bool) {
    if gps_to_write(props, exclude_gps).is_some() {
        warn!(target: "rasterkit::encode", format = %image_type, "format cannot carry GPS, dropping it");
    }
}

fn gif_frame<'a>(raster: &'a Raster, gif: Option<&GifProperties>) -> GifFrameInput<'a> {
    GifFrameInput {
        raster,
        delay: gif.map_or(GIF_MIN_DELAY, GifProperties::encode_delay),
    }
}

fn explicit_dpi(props: &ImageProperties) -> Option<(f64, f64)> {
    Some((props.dpi_width?, props.dpi_height?))
}

fn encode_with_format(raster: &Raster, format: ImageFormat) -> Result<Vec<u8>> {
    let img = raster.to_dynamic_image()?;
    run_with_panic_policy("encode:image", || {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).map_err(|e| {
            RasterKitError::cannot_create_destination(format!("{format:?}").to_lowercase(), e.to_string())
        })?;
        Ok(buf)
    })
}

/// JPEG has no alpha channel: alpha is dropped after demultiplying.
fn encode_jpeg(raster: &Raster, quality: u8, props: Option<&ImageProperties>) -> Result<Vec<u8>> {
    let img = match (raster.color_model(), raster.alpha_info()) {
        (ColorModel::Gray, _) => DynamicImage::ImageLuma8(raster.to_dynamic_image()?.to_luma8()),
        (_, AlphaInfo::Premultiplied) => DynamicImage::ImageRgb8(raster.to_dynamic_image()?.to_rgb8()),
        _ => raster.to_dynamic_image()?,
    };
    run_with_panic_policy("encode:jpeg", || {
        let mut buf = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
        if let Some((w, h)) = props.and_then(explicit_dpi) {
            let clamp = |dpi: f64| dpi.round().clamp(1.0, u16::MAX as f64) as u16;
            encoder.set_pixel_density(PixelDensity {
                density: (clamp(w), clamp(h)),
                unit: PixelDensityUnit::Inches,
            });
        }
        encoder
            .write_image(img.as_bytes(), img.width(), img.height(), img.color().into())
            .map_err(|e| RasterKitError::cannot_create_destination("jpeg", e.to_string()))?;
        Ok(buf)
    })
}

fn encode_png(raster: &Raster, props: Option<&ImageProperties>) -> Result<Vec<u8>> {
    let png = encode_with_format(raster, ImageFormat::Png)?;
    match props.and_then(explicit_dpi) {
        Some((w, h)) => embed_png_density(png, w, h),
        None => Ok(png),
    }
}

/// Replace any pHYs chunk with one carrying `dpi`. pHYs must precede IDAT,
/// so it goes right after IHDR.
fn embed_png_density(png_data: Vec<u8>, dpi_width: f64, dpi_height: f64) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:png:density", || {
        let mut png = Png::from_bytes(Bytes::from(png_data)).map_err(|e| {
            RasterKitError::cannot_create_destination("png", format!("failed to parse PNG: {e}"))
        })?;
        let chunks = png.chunks_mut();
        chunks.retain(|chunk| chunk.kind() != *b"pHYs");
        let at = chunks.len().min(1);
        chunks.insert(
            at,
            PngChunk::new(*b"pHYs", Bytes::from(png_phys_payload(dpi_width, dpi_height))),
        );

        let mut output = Vec::new();
        png.encoder().write_to(&mut output).map_err(|e| {
            RasterKitError::cannot_create_destination("png", format!("failed to write PNG: {e}"))
        })?;
        Ok(output)
    })
}

/// Serialises orientation and GPS into a bare EXIF payload (TIFF header
/// onwards). `None` when there is nothing to write.
fn exif_payload(props: &ImageProperties, exclude_gps: bool) -> Result<Option<Vec<u8>>> {
    let gps = gps_to_write(Some(props), exclude_gps);
    if props.orientation.is_none() && gps.is_none() {
        return Ok(None);
    }

    run_with_panic_policy("encode:exif", || {
        let mut metadata = Metadata::new();
        if let Some(orientation) = props.orientation {
            metadata.set_tag(ExifTag::Orientation(vec![orientation.exif_value()]));
        }
        if let Some(gps) = gps {
            set_gps_tags(&mut metadata, gps);
        }

        let app1 = metadata.as_u8_vec(FileExtension::JPEG).map_err(|e| {
            RasterKitError::cannot_create_destination("exif", format!("failed to encode EXIF: {e:?}"))
        })?;
        if app1.len() <= APP1_HEADER_SIZE {
            return Err(RasterKitError::cannot_create_destination("exif", "EXIF data too short"));
        }
        Ok(Some(app1[APP1_HEADER_SIZE..].to_vec()))
    })
}

fn set_gps_tags(metadata: &mut Metadata, gps: &GpsProperties) {
    if let Some(lat) = gps.latitude_coordinate() {
        metadata.set_tag(ExifTag::GPSLatitudeRef(lat.reference.clone()));
        metadata.set_tag(ExifTag::GPSLatitude(dms_rationals(&lat)));
    }
    if let Some(lon) = gps.longitude_coordinate() {
        metadata.set_tag(ExifTag::GPSLongitudeRef(lon.reference.clone()));
        metadata.set_tag(ExifTag::GPSLongitude(dms_rationals(&lon)));
    }
    if let Some(altitude) = gps.altitude.filter(|a| a.is_finite()) {
        metadata.set_tag(ExifTag::GPSAltitudeRef(vec![u8::from(altitude < 0.0)]));
        metadata.set_tag(ExifTag::GPSAltitude(vec![uR64 {
            nominator: (altitude.abs() * 100.0).round().min(u32::MAX as f64) as u32,
            denominator: 100,
        }]));
    }
    if let Some(status) = &gps.status {
        metadata.set_tag(ExifTag::GPSStatus(status.clone()));
    }
}

fn dms_rationals(coordinate: &GpsCoordinate) -> Vec<uR64> {
    coordinate
        .dms_rationals()
        .into_iter()
        .map(|(nominator, denominator)| uR64 {
            nominator,
            denominator,
        })
        .collect()
}

fn attach_exif(
    data: Vec<u8>,
    image_type: ImageType,
    props: Option<&ImageProperties>,
    exclude_gps: bool,
) -> Result<Vec<u8>> {
    let Some(props) = props else {
        return Ok(data);
    };
    let Some(exif) = exif_payload(props, exclude_gps)? else {
        return Ok(data);
    };

    run_with_panic_policy("encode:exif:embed", || {
        let mut output = Vec::new();
        let write_err = |e: std::io::Error| {
            RasterKitError::cannot_create_destination(image_type.identifier(), format!("failed to write EXIF: {e}"))
        };
        let parse_err = |e: img_parts::Error| {
            RasterKitError::cannot_create_destination(image_type.identifier(), format!("failed to parse output: {e}"))
        };
        match image_type {
            ImageType::Jpeg => {
                let mut jpeg = Jpeg::from_bytes(Bytes::from(data)).map_err(parse_err)?;
                jpeg.set_exif(Some(Bytes::from(exif)));
                jpeg.encoder().write_to(&mut output).map_err(write_err)?;
            }
            ImageType::Png => {
                let mut png = Png::from_bytes(Bytes::from(data)).map_err(parse_err)?;
                png.set_exif(Some(Bytes::from(exif)));
                png.encoder().write_to(&mut output).map_err(write_err)?;
            }
            _ => return Ok(data),
        }
        Ok(output)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::{extract_page_properties, extract_properties};
    use crate::metadata::{GpsCoordinates, GpsProperties, Orientation};

    fn gradient(width: u32, height: u32) -> Raster {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        });
        Raster::from_dynamic_image(&DynamicImage::ImageRgb8(img)).unwrap()
    }

    fn located() -> ImageProperties {
        let coords = GpsCoordinates::new(43.468365, -11.881635);
        ImageProperties::new()
            .with_orientation(Orientation::Right)
            .with_gps(GpsProperties::from_coordinates(&coords))
    }

    mod compression_tests {
        use super::*;

        #[test]
        fn range_is_checked() {
            assert_eq!(validate_compression(None).unwrap(), None);
            assert_eq!(validate_compression(Some(f64::INFINITY)).unwrap(), None);
            assert_eq!(validate_compression(Some(0.0)).unwrap(), Some(0.0));
            assert_eq!(validate_compression(Some(1.0)).unwrap(), Some(1.0));
            for bad in [-0.01, 1.01, f64::NAN] {
                assert!(matches!(
                    validate_compression(Some(bad)),
                    Err(RasterKitError::InvalidCompression { .. })
                ));
            }
        }

        #[test]
        fn quality_mapping() {
            assert_eq!(jpeg_quality(None), 75);
            assert_eq!(jpeg_quality(Some(0.0)), 1);
            assert_eq!(jpeg_quality(Some(0.6)), 60);
            assert_eq!(jpeg_quality(Some(1.0)), 100);
        }

        #[test]
        fn out_of_range_fails_before_encoding() {
            let raster = gradient(4, 4);
            let options = EncodeOptions::new().with_compression(2.0);
            assert!(matches!(
                encode_raster(&raster, ImageType::Png, &options),
                Err(RasterKitError::InvalidCompression { .. })
            ));
        }

        #[test]
        fn higher_quality_is_larger() {
            let raster = gradient(64, 64);
            let size = |c: f64| {
                encode_raster(&raster, ImageType::Jpeg, &EncodeOptions::new().with_compression(c))
                    .unwrap()
                    .len()
            };
            assert!(size(1.0) > size(0.3));
        }
    }

    mod metadata_tests {
        use super::*;

        #[test]
        fn png_carries_orientation_and_gps() {
            let raster = gradient(8, 8);
            let options = EncodeOptions::new().with_properties(located());
            let png = encode_raster(&raster, ImageType::Png, &options).unwrap();
            let props = extract_properties(&png, ImageType::Png);
            assert_eq!(props.orientation(), Orientation::Right);
            let location = props.location().unwrap().normalized();
            assert!((location.latitude.value - 43.468365).abs() < 1e-4);
            assert!((location.longitude.value + 11.881635).abs() < 1e-4);
        }

        #[test]
        fn jpeg_gps_can_be_excluded() {
            let raster = gradient(8, 8);
            let options = EncodeOptions::new()
                .with_properties(located())
                .excluding_gps(true);
            let jpeg = encode_raster(&raster, ImageType::Jpeg, &options).unwrap();
            let props = extract_properties(&jpeg, ImageType::Jpeg);
            assert_eq!(props.orientation(), Orientation::Right);
            assert!(props.location().is_none());
        }

        #[test]
        fn whole_gps_dictionary_is_written() {
            let gps = GpsProperties {
                altitude: Some(-12.5),
                status: Some("V".into()),
                ..GpsProperties::from_coordinates(&GpsCoordinates::new(43.468365, 11.881635))
            };
            let options = EncodeOptions::new().with_properties(ImageProperties::new().with_gps(gps));
            let png = encode_raster(&gradient(4, 4), ImageType::Png, &options).unwrap();
            let props = extract_properties(&png, ImageType::Png);
            assert!(props.location().is_none());
            let back = props.gps.unwrap();
            assert_eq!(back.status.as_deref(), Some("V"));
            assert!((back.altitude.unwrap() + 12.5).abs() < 1e-6);
            assert!((back.latitude.unwrap() - 43.468365).abs() < 1e-4);
        }

        #[test]
        fn tiff_pages_carry_gps_unless_excluded() {
            let raster = gradient(4, 4);
            let props = located();
            let frames = [
                FrameInput {
                    properties: Some(&props),
                    ..FrameInput::new(&raster)
                },
                FrameInput::new(&raster),
            ];
            let tiff = encode_frames(&frames, ImageType::Tiff, false).unwrap();
            let pages = extract_page_properties(&tiff, 2);
            assert_eq!(pages[0].orientation(), Orientation::Right);
            let location = pages[0].location().unwrap().normalized();
            assert!((location.latitude.value - 43.468365).abs() < 1e-4);
            assert!((location.longitude.value + 11.881635).abs() < 1e-4);
            assert!(pages[1].gps.is_none());

            let stripped = encode_frames(&frames, ImageType::Tiff, true).unwrap();
            let pages = extract_page_properties(&stripped, 2);
            assert!(pages[0].gps.is_none());
            assert_eq!(pages[0].orientation(), Orientation::Right);
        }

        #[test]
        fn dpi_is_written_for_jpeg_and_png() {
            let raster = gradient(4, 4);
            let options =
                EncodeOptions::new().with_properties(ImageProperties::new().with_dpi(300.0, 300.0));
            for ty in [ImageType::Jpeg, ImageType::Png] {
                let data = encode_raster(&raster, ty, &options).unwrap();
                let (w, h) = extract_properties(&data, ty).dpi();
                assert!((w - 300.0).abs() < 0.5, "{ty}: {w}");
                assert!((h - 300.0).abs() < 0.5, "{ty}: {h}");
            }
        }

        #[test]
        fn plain_output_has_no_exif() {
            let raster = gradient(4, 4);
            let png = encode_raster(&raster, ImageType::Png, &EncodeOptions::new()).unwrap();
            assert!(crate::engine::io::extract_exif_block(&png, ImageType::Png).is_none());
        }
    }

    mod format_tests {
        use super::*;

        #[test]
        fn every_single_frame_format_but_heic() {
            let raster = gradient(6, 5);
            for ty in [ImageType::Png, ImageType::Jpeg, ImageType::Tiff, ImageType::Gif, ImageType::Bmp] {
                let data = encode_raster(&raster, ty, &EncodeOptions::new()).unwrap();
                assert_eq!(crate::engine::decoder::detect_format(&data), Some(ty));
            }
            assert!(matches!(
                encode_raster(&raster, ImageType::Heic, &EncodeOptions::new()),
                Err(RasterKitError::CannotCreateDestination { .. })
            ));
        }

        #[test]
        fn png_preserves_pixels() {
            let raster = gradient(5, 3);
            let png = encode_raster(&raster, ImageType::Png, &EncodeOptions::new()).unwrap();
            let back = crate::engine::decoder::decode_raster(&png).unwrap();
            assert_eq!(back.data(), raster.data());
        }

        #[test]
        fn multi_frame_needs_a_multi_frame_format() {
            let a = gradient(4, 4);
            let frames = [FrameInput::new(&a), FrameInput::new(&a)];
            for ty in [ImageType::Jpeg, ImageType::Png, ImageType::Bmp, ImageType::Heic] {
                assert!(matches!(
                    encode_frames(&frames, ty, false),
                    Err(RasterKitError::CannotCreateDestination { .. })
                ));
            }
            assert!(encode_frames(&frames, ImageType::Tiff, false).is_ok());
            assert!(encode_frames(&frames, ImageType::Gif, false).is_ok());
            assert!(encode_frames(&[], ImageType::Tiff, false).is_err());
        }

        #[test]
        fn gif_delays_follow_properties() {
            let a = gradient(4, 4);
            let slow = ImageProperties::new().with_gif(GifProperties::with_delay(0.5));
            let frames = [
                FrameInput::new(&a),
                FrameInput {
                    properties: Some(&slow),
                    ..FrameInput::new(&a)
                },
            ];
            let gif = encode_frames(&frames, ImageType::Gif, false).unwrap();
            let infos = crate::codecs::gif_frames::scan_gif(
                &gif,
                &crate::engine::firewall::DecodeLimits::default(),
            )
            .unwrap();
            assert!((infos[0].delay - GIF_MIN_DELAY).abs() < 1e-6);
            assert!((infos[1].delay - 0.5).abs() < 1e-6);
        }
    }
}
