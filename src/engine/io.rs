// src/engine/io.rs
//
// I/O operations: Source enum, file loading and property extraction
// (EXIF via kamadak-exif, JFIF density and PNG pHYs via img-parts).

use crate::engine::common::run_with_panic_policy;
use crate::error::{RasterKitError, Result};
use crate::metadata::{GpsProperties, ImageProperties, Orientation, PropertyBag, PropertyValue};
use crate::ops::ImageType;
use exif::{Context, Exif, Field, In, Tag, Value};
use img_parts::{jpeg::Jpeg, png::Png, Bytes, ImageEXIF};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

const METERS_PER_INCH: f64 = 0.0254;

/// Image source - either in-memory data or a file path read on demand.
#[derive(Clone, Debug)]
pub enum Source {
    Memory(Arc<Vec<u8>>),
    Path(PathBuf),
}

impl Source {
    pub fn load(&self) -> Result<Arc<Vec<u8>>> {
        match self {
            Source::Memory(data) => Ok(data.clone()),
            Source::Path(path) => read_file(path).map(Arc::new),
        }
    }
}

pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    std::fs::read(path)
        .map_err(|e| RasterKitError::file_read_failed(path.to_string_lossy().to_string(), e))
}

/// Raw EXIF payload (TIFF header onwards) of a JPEG or PNG.
pub fn extract_exif_block(data: &[u8], image_type: ImageType) -> Option<Bytes> {
    let bytes = Bytes::copy_from_slice(data);
    match image_type {
        ImageType::Jpeg => Jpeg::from_bytes(bytes).ok()?.exif(),
        ImageType::Png => Png::from_bytes(bytes).ok()?.exif(),
        _ => None,
    }
}

/// Properties of the primary image: EXIF dictionaries, orientation, GPS and
/// resolution. Unreadable metadata yields empty fields, never an error.
pub fn extract_properties(data: &[u8], image_type: ImageType) -> ImageProperties {
    let mut props = ImageProperties::new();

    match read_exif(data) {
        Some(exif) => apply_exif(&exif, In::PRIMARY, &mut props),
        None => {
            if let Some(block) = extract_exif_block(data, image_type) {
                warn!(
                    target: "rasterkit::decode",
                    bytes = block.len(),
                    "EXIF block present but unreadable"
                );
                props.residual.insert("Exif".to_string(), block.to_vec());
            }
        }
    }

    let container_dpi = match image_type {
        ImageType::Jpeg => jfif_density(data),
        ImageType::Png => png_density(data),
        _ => None,
    };
    if let Some((w, h)) = container_dpi {
        props.dpi_width = Some(w);
        props.dpi_height = Some(h);
    }
    props
}

/// Tag-derived properties of every TIFF page, in IFD order. The EXIF
/// reader stops at eight IFDs, so longer files yield empty properties.
pub fn extract_page_properties(data: &[u8], pages: usize) -> Vec<ImageProperties> {
    let exif = read_exif(data);
    if exif.is_none() {
        warn!(target: "rasterkit::decode", pages, "TIFF tags unreadable, page properties left empty");
    }
    (0..pages)
        .map(|index| {
            let mut props = ImageProperties::new();
            if let (Some(exif), Ok(ifd)) = (exif.as_ref(), u16::try_from(index)) {
                apply_exif(exif, In(ifd), &mut props);
            }
            props
        })
        .collect()
}

fn read_exif(data: &[u8]) -> Option<Exif> {
    run_with_panic_policy("decode:exif", || {
        exif::Reader::new()
            .read_from_container(&mut Cursor::new(data))
            .map_err(|e| RasterKitError::invalid_image(e.to_string()))
    })
    .ok()
}

fn orientation_from_field(field: &Field) -> Option<Orientation> {
    let value = field.value.get_uint(0)?;
    let orientation = Orientation::from_exif(value);
    if orientation.is_none() {
        warn!(target: "rasterkit::decode", value, "ignoring invalid EXIF orientation");
    }
    orientation
}

fn apply_exif(exif: &Exif, ifd: In, props: &mut ImageProperties) {
    let mut gps = GpsProperties::default();
    let mut has_gps = false;
    let mut below_sea_level = false;

    for field in exif.fields().filter(|f| f.ifd_num == ifd) {
        match field.tag {
            Tag::Orientation => props.orientation = orientation_from_field(field),
            Tag::PixelXDimension => props.pixel_width = field.value.get_uint(0),
            Tag::PixelYDimension => props.pixel_height = field.value.get_uint(0),
            Tag::GPSLatitude => gps.latitude = dms_to_decimal(&field.value),
            Tag::GPSLongitude => gps.longitude = dms_to_decimal(&field.value),
            Tag::GPSLatitudeRef => gps.latitude_ref = ascii(&field.value),
            Tag::GPSLongitudeRef => gps.longitude_ref = ascii(&field.value),
            Tag::GPSStatus => gps.status = ascii(&field.value),
            Tag::GPSAltitude => gps.altitude = first_rational(&field.value),
            Tag::GPSAltitudeRef => below_sea_level = field.value.get_uint(0) == Some(1),
            _ => {}
        }
        if field.tag.context() == Context::Gps {
            has_gps = true;
            continue;
        }

        let bag: &mut PropertyBag = match field.tag.context() {
            Context::Tiff => &mut props.tiff,
            _ => &mut props.exif,
        };
        if let Some(value) = property_value(&field.value) {
            bag.insert(field.tag.to_string(), value);
        }
    }

    if let (Some(x), Some(y)) = (
        exif.get_field(Tag::XResolution, ifd),
        exif.get_field(Tag::YResolution, ifd),
    ) {
        let unit = exif
            .get_field(Tag::ResolutionUnit, ifd)
            .and_then(|f| f.value.get_uint(0))
            .unwrap_or(2);
        if let (Some(x), Some(y)) = (first_rational(&x.value), first_rational(&y.value)) {
            let (w, h) = match unit {
                3 => (x * 2.54, y * 2.54),
                _ => (x, y),
            };
            props.dpi_width = Some(w);
            props.dpi_height = Some(h);
        }
    }

    if has_gps {
        if below_sea_level {
            gps.altitude = gps.altitude.map(|a| -a);
        }
        props.gps = Some(gps);
    }
}

fn dms_to_decimal(value: &Value) -> Option<f64> {
    match value {
        Value::Rational(parts) if !parts.is_empty() => {
            let mut decimal = 0.0;
            for (part, divisor) in parts.iter().zip([1.0, 60.0, 3600.0]) {
                decimal += part.to_f64() / divisor;
            }
            decimal.is_finite().then_some(decimal)
        }
        _ => None,
    }
}

fn first_rational(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Rational(parts) => parts.first().map(|r| r.to_f64()),
        Value::SRational(parts) => parts.first().map(|r| r.to_f64()),
        _ => value.get_uint(0).map(f64::from),
    };
    v.filter(|v| v.is_finite())
}

fn ascii(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string()),
        _ => None,
    }
}

fn property_value(value: &Value) -> Option<PropertyValue> {
    fn list<T>(items: &[T], f: impl Fn(&T) -> PropertyValue) -> PropertyValue {
        match items {
            [single] => f(single),
            many => PropertyValue::List(many.iter().map(f).collect()),
        }
    }

    Some(match value {
        Value::Ascii(_) => PropertyValue::Text(ascii(value)?),
        Value::Byte(bytes) | Value::Undefined(bytes, _) => PropertyValue::Bytes(bytes.clone()),
        Value::SByte(items) => list(items, |v| PropertyValue::Integer(*v as i64)),
        Value::Short(items) => list(items, |v| PropertyValue::Integer(*v as i64)),
        Value::SShort(items) => list(items, |v| PropertyValue::Integer(*v as i64)),
        Value::Long(items) => list(items, |v| PropertyValue::Integer(*v as i64)),
        Value::SLong(items) => list(items, |v| PropertyValue::Integer(*v as i64)),
        Value::Rational(items) => list(items, |v| PropertyValue::Float(v.to_f64())),
        Value::SRational(items) => list(items, |v| PropertyValue::Float(v.to_f64())),
        Value::Float(items) => list(items, |v| PropertyValue::Float(*v as f64)),
        Value::Double(items) => list(items, |v| PropertyValue::Float(*v)),
        _ => return None,
    })
}

/// JFIF APP0 density in dots per inch.
fn jfif_density(data: &[u8]) -> Option<(f64, f64)> {
    let jpeg = Jpeg::from_bytes(Bytes::copy_from_slice(data)).ok()?;
    let app0 = jpeg
        .segments()
        .iter()
        .find(|s| s.marker() == 0xE0 && s.contents().starts_with(b"JFIF\0"))?;
    let c = app0.contents();
    if c.len() < 12 {
        return None;
    }
    let x = u16::from_be_bytes([c[8], c[9]]) as f64;
    let y = u16::from_be_bytes([c[10], c[11]]) as f64;
    match c[7] {
        1 => Some((x, y)),
        2 => Some((x * 2.54, y * 2.54)),
        // Unit 0 is an aspect ratio only.
        _ => None,
    }
}

/// PNG pHYs chunk in dots per inch.
fn png_density(data: &[u8]) -> Option<(f64, f64)> {
    let png = Png::from_bytes(Bytes::copy_from_slice(data)).ok()?;
    let chunk = png.chunk_by_type(*b"pHYs")?;
    let c = chunk.contents();
    if c.len() < 9 || c[8] != 1 {
        return None;
    }
    let x = u32::from_be_bytes([c[0], c[1], c[2], c[3]]) as f64;
    let y = u32::from_be_bytes([c[4], c[5], c[6], c[7]]) as f64;
    Some((x * METERS_PER_INCH, y * METERS_PER_INCH))
}

/// pHYs payload for the given DPI.
pub(crate) fn png_phys_payload(dpi_width: f64, dpi_height: f64) -> Vec<u8> {
    let ppm = |dpi: f64| (dpi / METERS_PER_INCH).round().clamp(1.0, u32::MAX as f64) as u32;
    let mut payload = Vec::with_capacity(9);
    payload.extend_from_slice(&ppm(dpi_width).to_be_bytes());
    payload.extend_from_slice(&ppm(dpi_height).to_be_bytes());
    payload.push(1);
    payload
}
