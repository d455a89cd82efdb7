// src/codecs/tiff_pages.rs
//
// Multi-page TIFF through the `tiff` crate. image-rs only exposes the first
// IFD, so page walking, per-page tags and multi-page output happen here.

use crate::engine::common::run_with_panic_policy;
use crate::engine::firewall::DecodeLimits;
use crate::engine::raster::{premultiply, AlphaInfo, ColorModel, Raster};
use crate::error::{RasterKitError, Result};
use crate::metadata::{GpsCoordinate, GpsProperties, Orientation};
use std::io::{Cursor, Read, Seek, Write};
use tiff::decoder::ifd::Value;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, DirectoryEncoder, Rational, TiffEncoder, TiffKind};
use tiff::tags::{ResolutionUnit, Tag};
use tiff::ColorType;
use tracing::debug;

/// Per-page facts read from the IFD without decoding pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct TiffPageInfo {
    pub width: u32,
    pub height: u32,
    pub orientation: Option<Orientation>,
    /// Dots per inch
    pub dpi: Option<(f64, f64)>,
}

/// One page to encode.
#[derive(Clone, Copy, Debug)]
pub struct TiffPageInput<'a> {
    pub raster: &'a Raster,
    pub orientation: Option<Orientation>,
    pub dpi: Option<(f64, f64)>,
    /// Written as a GPS sub-IFD of the page
    pub gps: Option<&'a GpsProperties>,
}

const GPS_IFD_POINTER: u16 = 0x8825;
const FIELD_BYTE: u16 = 1;
const FIELD_ASCII: u16 = 2;
const FIELD_RATIONAL: u16 = 5;

fn tiff_error(e: tiff::TiffError) -> RasterKitError {
    RasterKitError::invalid_image(format!("tiff: {e}"))
}

fn decoder(bytes: &[u8]) -> Result<Decoder<Cursor<&[u8]>>> {
    Decoder::new(Cursor::new(bytes)).map_err(tiff_error)
}

fn rational(value: Value) -> Option<f64> {
    match value {
        Value::Rational(n, d) if d != 0 => Some(n as f64 / d as f64),
        Value::List(mut items) if !items.is_empty() => rational(items.swap_remove(0)),
        Value::Short(v) => Some(v as f64),
        Value::Unsigned(v) => Some(v as f64),
        _ => None,
    }
}

fn read_page_info<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<TiffPageInfo> {
    let (width, height) = decoder.dimensions().map_err(tiff_error)?;
    let orientation = decoder
        .find_tag(Tag::Orientation)
        .ok()
        .flatten()
        .and_then(|v| v.into_u32().ok())
        .and_then(Orientation::from_exif);

    let x = decoder.find_tag(Tag::XResolution).ok().flatten().and_then(rational);
    let y = decoder.find_tag(Tag::YResolution).ok().flatten().and_then(rational);
    let unit = decoder
        .find_tag(Tag::ResolutionUnit)
        .ok()
        .flatten()
        .and_then(|v| v.into_u16().ok())
        .unwrap_or(2);
    let dpi = match (x, y) {
        (Some(x), Some(y)) if unit == 3 => Some((x * 2.54, y * 2.54)),
        (Some(x), Some(y)) => Some((x, y)),
        _ => None,
    };

    Ok(TiffPageInfo {
        width,
        height,
        orientation,
        dpi,
    })
}

/// Reads every IFD header in file order.
pub fn scan_tiff(bytes: &[u8], limits: &DecodeLimits) -> Result<Vec<TiffPageInfo>> {
    run_with_panic_policy("decode:tiff:scan", || {
        let mut decoder = decoder(bytes)?;
        let mut pages = Vec::new();
        loop {
            let info = read_page_info(&mut decoder)?;
            limits.enforce_dimensions(info.width, info.height)?;
            limits.enforce_frame_count(pages.len() + 1)?;
            pages.push(info);
            if !decoder.more_images() {
                break;
            }
            decoder.next_image().map_err(tiff_error)?;
        }
        debug!(target: "rasterkit::decode", pages = pages.len(), "scanned tiff");
        Ok(pages)
    })
}

/// Decodes page `index` into a raster.
pub fn decode_tiff_page(bytes: &[u8], index: usize) -> Result<Raster> {
    run_with_panic_policy("decode:tiff:page", || {
        let mut decoder = decoder(bytes)?;
        for _ in 0..index {
            if !decoder.more_images() {
                return Err(RasterKitError::invalid_image(format!(
                    "tiff has no page {index}"
                )));
            }
            decoder.next_image().map_err(tiff_error)?;
        }

        let (width, height) = decoder.dimensions().map_err(tiff_error)?;
        crate::engine::check_dimensions(width, height)?;
        let color_type = decoder.colortype().map_err(tiff_error)?;
        let samples = match decoder.read_image().map_err(tiff_error)? {
            DecodingResult::U8(data) => data,
            DecodingResult::U16(data) => data.into_iter().map(|v| (v >> 8) as u8).collect(),
            _ => {
                return Err(RasterKitError::invalid_image(
                    "tiff: only 8 and 16 bit samples are supported",
                ))
            }
        };
        raster_from_samples(width, height, color_type, samples)
    })
}

fn raster_from_samples(
    width: u32,
    height: u32,
    color_type: ColorType,
    mut samples: Vec<u8>,
) -> Result<Raster> {
    let (model, alpha) = match color_type {
        ColorType::Gray(_) => (ColorModel::Gray, AlphaInfo::None),
        ColorType::GrayA(_) => (ColorModel::Gray, AlphaInfo::Premultiplied),
        ColorType::RGB(_) => (ColorModel::Rgb, AlphaInfo::None),
        ColorType::RGBA(_) => (ColorModel::Rgb, AlphaInfo::Premultiplied),
        ColorType::CMYK(_) => (ColorModel::Cmyk, AlphaInfo::None),
        other => {
            return Err(RasterKitError::invalid_colorspace(format!(
                "tiff colour type {other:?} is not supported"
            )))
        }
    };
    if alpha == AlphaInfo::Premultiplied {
        let channels = model.components() + 1;
        for px in samples.chunks_exact_mut(channels) {
            let a = px[channels - 1];
            for c in px.iter_mut().take(channels - 1) {
                *c = premultiply(*c, a);
            }
        }
    }
    Raster::from_packed(width, height, model, alpha, samples)
}

fn write_page<W, K, C>(
    encoder: &mut TiffEncoder<W, K>,
    page: &TiffPageInput<'_>,
    data: &[C::Inner],
) -> Result<()>
where
    W: std::io::Write + Seek,
    K: TiffKind,
    C: colortype::ColorType,
    [C::Inner]: tiff::encoder::TiffValue,
{
    let raster = page.raster;
    let mut image = encoder
        .new_image::<C>(raster.width(), raster.height())
        .map_err(|e| RasterKitError::cannot_create_destination("tiff", e.to_string()))?;
    if let Some(orientation) = page.orientation {
        image
            .encoder()
            .write_tag(Tag::Orientation, orientation.exif_value())
            .map_err(|e| RasterKitError::cannot_create_destination("tiff", e.to_string()))?;
    }
    if let Some((x, y)) = page.dpi {
        image.resolution_unit(ResolutionUnit::Inch);
        image.x_resolution(dpi_rational(x));
        image.y_resolution(dpi_rational(y));
    }
    if let Some(gps) = page.gps {
        write_gps_directory(image.encoder(), gps)?;
    }
    image
        .write_data(data)
        .map_err(|e| RasterKitError::cannot_create_destination("tiff", e.to_string()))
}

fn dpi_rational(dpi: f64) -> Rational {
    Rational {
        n: (dpi * 100.0).round().clamp(1.0, u32::MAX as f64) as u32,
        d: 100,
    }
}

struct GpsEntry {
    tag: u16,
    field_type: u16,
    count: u32,
    data: Vec<u8>,
}

impl GpsEntry {
    fn ascii(tag: u16, text: &str) -> Self {
        let mut data = text.as_bytes().to_vec();
        data.push(0);
        Self {
            tag,
            field_type: FIELD_ASCII,
            count: data.len() as u32,
            data,
        }
    }

    fn rationals(tag: u16, parts: &[(u32, u32)]) -> Self {
        Self {
            tag,
            field_type: FIELD_RATIONAL,
            count: parts.len() as u32,
            data: parts
                .iter()
                .flat_map(|&(n, d)| n.to_ne_bytes().into_iter().chain(d.to_ne_bytes()))
                .collect(),
        }
    }

    fn bytes(tag: u16, data: Vec<u8>) -> Self {
        Self {
            tag,
            field_type: FIELD_BYTE,
            count: data.len() as u32,
            data,
        }
    }
}

/// GPS entries in ascending tag order.
fn gps_entries(gps: &GpsProperties) -> Vec<GpsEntry> {
    let mut entries = vec![GpsEntry::bytes(0x0000, vec![2, 2, 0, 0])];
    let mut push_coordinate = |ref_tag: u16, coordinate: Option<GpsCoordinate>| {
        if let Some(c) = coordinate {
            entries.push(GpsEntry::ascii(ref_tag, &c.reference));
            entries.push(GpsEntry::rationals(ref_tag + 1, &c.dms_rationals()));
        }
    };
    push_coordinate(0x0001, gps.latitude_coordinate());
    push_coordinate(0x0003, gps.longitude_coordinate());
    if let Some(altitude) = gps.altitude.filter(|a| a.is_finite()) {
        let centimetres = (altitude.abs() * 100.0).round().min(u32::MAX as f64) as u32;
        entries.push(GpsEntry::bytes(0x0005, vec![u8::from(altitude < 0.0)]));
        entries.push(GpsEntry::rationals(0x0006, &[(centimetres, 100)]));
    }
    if let Some(status) = &gps.status {
        entries.push(GpsEntry::ascii(0x0009, status));
    }
    entries
}

/// Serialises `entries` as an IFD placed at byte offset `at`, values that
/// do not fit inline following the directory. Native byte order, matching
/// the header the encoder wrote.
fn gps_directory(entries: &[GpsEntry], at: u32) -> Vec<u8> {
    let values_at = at + 2 + 12 * entries.len() as u32 + 4;
    let mut directory = Vec::new();
    let mut values = Vec::new();
    directory.extend_from_slice(&(entries.len() as u16).to_ne_bytes());
    for entry in entries {
        directory.extend_from_slice(&entry.tag.to_ne_bytes());
        directory.extend_from_slice(&entry.field_type.to_ne_bytes());
        directory.extend_from_slice(&entry.count.to_ne_bytes());
        if entry.data.len() <= 4 {
            let mut inline = entry.data.clone();
            inline.resize(4, 0);
            directory.extend_from_slice(&inline);
        } else {
            let offset = values_at + values.len() as u32;
            directory.extend_from_slice(&offset.to_ne_bytes());
            values.extend_from_slice(&entry.data);
            if values.len() % 2 == 1 {
                values.push(0);
            }
        }
    }
    // No next IFD.
    directory.extend_from_slice(&0u32.to_ne_bytes());
    directory.extend_from_slice(&values);
    directory
}

fn write_gps_directory<W, K>(encoder: &mut DirectoryEncoder<'_, W, K>, gps: &GpsProperties) -> Result<()>
where
    W: Write + Seek,
    K: TiffKind,
{
    let tiff_err = |e: tiff::TiffError| RasterKitError::cannot_create_destination("tiff", e.to_string());
    let empty: &[u8] = &[];
    let mut at = encoder.write_data(empty).map_err(tiff_err)?;
    if at % 2 == 1 {
        at = encoder.write_data(&[0u8][..]).map_err(tiff_err)? + 1;
    }
    let at = u32::try_from(at).map_err(|_| {
        RasterKitError::cannot_create_destination("tiff", "GPS directory beyond 4 GiB")
    })?;
    encoder
        .write_data(&gps_directory(&gps_entries(gps), at)[..])
        .map_err(tiff_err)?;
    encoder
        .write_tag(Tag::Unknown(GPS_IFD_POINTER), at)
        .map_err(tiff_err)
}

/// Writes one IFD per page, in order.
pub fn encode_tiff(pages: &[TiffPageInput<'_>]) -> Result<Vec<u8>> {
    if pages.is_empty() {
        return Err(RasterKitError::cannot_create_destination(
            "tiff",
            "no pages to encode",
        ));
    }
    run_with_panic_policy("encode:tiff", || {
        let mut buf = Vec::new();
        {
            let mut cursor = Cursor::new(&mut buf);
            let mut encoder = TiffEncoder::new(&mut cursor)
                .map_err(|e| RasterKitError::cannot_create_destination("tiff", e.to_string()))?;
            for page in pages {
                let raster = page.raster;
                match (raster.color_model(), raster.has_alpha()) {
                    (ColorModel::Cmyk, _) => {
                        let data = packed_rows(raster);
                        write_page::<_, _, colortype::CMYK8>(&mut encoder, page, &data)?;
                    }
                    (ColorModel::Gray, false) => {
                        let data = packed_rows(raster);
                        write_page::<_, _, colortype::Gray8>(&mut encoder, page, &data)?;
                    }
                    (ColorModel::Rgb, false) => {
                        let data = packed_rows(raster);
                        write_page::<_, _, colortype::RGB8>(&mut encoder, page, &data)?;
                    }
                    (_, true) => {
                        let data = raster.to_dynamic_image()?.to_rgba8().into_raw();
                        write_page::<_, _, colortype::RGBA8>(&mut encoder, page, &data)?;
                    }
                }
            }
        }
        Ok(buf)
    })
}

fn packed_rows(raster: &Raster) -> Vec<u8> {
    let row_len = raster.width() as usize * raster.channels();
    raster
        .data()
        .chunks(raster.stride())
        .flat_map(|row| &row[..row_len])
        .copied()
        .collect()
}
