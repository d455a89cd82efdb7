// src/engine/raster.rs
//
// The decoded bitmap every operation consumes and produces.
// Rasters are immutable once built: transformations allocate a new one.

use crate::engine::check_dimensions;
use crate::error::{RasterKitError, Result};
use crate::ops::{Rect, Size};
use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};
use std::fmt;
use tiny_skia::{IntSize, Pixmap};

/// Colour model of the stored components (alpha excluded).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorModel {
    Rgb,
    Gray,
    Cmyk,
}

impl ColorModel {
    pub fn components(&self) -> usize {
        match self {
            ColorModel::Rgb => 3,
            ColorModel::Gray => 1,
            ColorModel::Cmyk => 4,
        }
    }
}

/// Whether the raster carries an alpha channel, always premultiplied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlphaInfo {
    None,
    Premultiplied,
}

/// An immutable 8-bit-per-component bitmap.
///
/// Invariants: width > 0, height > 0, stride >= width * channels and
/// `data.len() == stride * height`. Alpha, when present, is the last
/// channel of each pixel and colour channels are premultiplied by it.
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    model: ColorModel,
    alpha: AlphaInfo,
    stride: usize,
    data: Vec<u8>,
}

impl fmt::Debug for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("model", &self.model)
            .field("alpha", &self.alpha)
            .field("stride", &self.stride)
            .finish_non_exhaustive()
    }
}

impl Raster {
    pub fn from_parts(
        width: u32,
        height: u32,
        model: ColorModel,
        alpha: AlphaInfo,
        stride: usize,
        data: Vec<u8>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RasterKitError::invalid_image(format!(
                "raster dimensions must be non-zero, got {width}x{height}"
            )));
        }
        if model == ColorModel::Cmyk && alpha != AlphaInfo::None {
            return Err(RasterKitError::invalid_colorspace(
                "CMYK rasters cannot carry alpha",
            ));
        }
        let channels = channel_count(model, alpha);
        let min_stride = width as usize * channels;
        if stride < min_stride {
            return Err(RasterKitError::invalid_image(format!(
                "stride {stride} is smaller than a {width}px row of {channels} channels"
            )));
        }
        if data.len() != stride * height as usize {
            return Err(RasterKitError::invalid_image(format!(
                "buffer holds {} bytes, expected {}",
                data.len(),
                stride * height as usize
            )));
        }
        Ok(Self {
            width,
            height,
            model,
            alpha,
            stride,
            data,
        })
    }

    /// Tightly packed constructor (stride = width * channels).
    pub fn from_packed(
        width: u32,
        height: u32,
        model: ColorModel,
        alpha: AlphaInfo,
        data: Vec<u8>,
    ) -> Result<Self> {
        let stride = width as usize * channel_count(model, alpha);
        Self::from_parts(width, height, model, alpha, stride, data)
    }

    /// A raster filled with a single premultiplied RGBA value.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self> {
        let px = premultiply_rgba(rgba);
        let data = px.repeat(width as usize * height as usize);
        Self::from_packed(width, height, ColorModel::Rgb, AlphaInfo::Premultiplied, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn size(&self) -> Size {
        Size::from_pixels(self.width, self.height)
    }

    pub fn rect(&self) -> Rect {
        Rect::from_size(self.size())
    }

    pub fn color_model(&self) -> ColorModel {
        self.model
    }

    pub fn alpha_info(&self) -> AlphaInfo {
        self.alpha
    }

    pub fn has_alpha(&self) -> bool {
        self.alpha == AlphaInfo::Premultiplied
    }

    pub fn bits_per_component(&self) -> u8 {
        8
    }

    pub fn channels(&self) -> usize {
        channel_count(self.model, self.alpha)
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Channel values at (x, y), `None` outside the raster.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let channels = self.channels();
        let start = y as usize * self.stride + x as usize * channels;
        self.data.get(start..start + channels)
    }

    /// The pixel as straight-alpha RGBA regardless of the colour model.
    pub fn rgba_at(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let px = self.pixel(x, y)?;
        Some(to_straight_rgba(self.model, self.alpha, px))
    }

    fn rows(&self) -> impl Iterator<Item = &[u8]> {
        let row_len = self.width as usize * self.channels();
        self.data
            .chunks(self.stride)
            .map(move |row| &row[..row_len])
    }

    // =========================================================================
    // image-rs interop
    // =========================================================================

    pub fn from_dynamic_image(img: &DynamicImage) -> Result<Self> {
        let (width, height) = (img.width(), img.height());
        check_dimensions(width, height)?;
        match img {
            DynamicImage::ImageLuma8(gray) => Self::from_packed(
                width,
                height,
                ColorModel::Gray,
                AlphaInfo::None,
                gray.as_raw().clone(),
            ),
            DynamicImage::ImageLumaA8(gray) => {
                let mut data = gray.as_raw().clone();
                for px in data.chunks_exact_mut(2) {
                    px[0] = premultiply(px[0], px[1]);
                }
                Self::from_packed(width, height, ColorModel::Gray, AlphaInfo::Premultiplied, data)
            }
            DynamicImage::ImageRgb8(rgb) => Self::from_packed(
                width,
                height,
                ColorModel::Rgb,
                AlphaInfo::None,
                rgb.as_raw().clone(),
            ),
            other => {
                let mut data = other.to_rgba8().into_raw();
                for px in data.chunks_exact_mut(4) {
                    let p = premultiply_rgba([px[0], px[1], px[2], px[3]]);
                    px.copy_from_slice(&p);
                }
                Self::from_packed(width, height, ColorModel::Rgb, AlphaInfo::Premultiplied, data)
            }
        }
    }

    /// Straight-alpha image for the encoders. CMYK is converted to RGB.
    pub fn to_dynamic_image(&self) -> Result<DynamicImage> {
        let (w, h) = (self.width, self.height);
        let packed: Vec<u8> = match (self.model, self.alpha) {
            (ColorModel::Cmyk, _) => self
                .rows()
                .flat_map(|row| row.chunks_exact(4).flat_map(|px| cmyk_to_rgb(px)))
                .collect(),
            (_, AlphaInfo::Premultiplied) => {
                let channels = self.channels();
                self.rows()
                    .flat_map(|row| {
                        row.chunks_exact(channels).flat_map(|px| {
                            let a = px[channels - 1];
                            let mut out = px.to_vec();
                            for c in out.iter_mut().take(channels - 1) {
                                *c = demultiply(*c, a);
                            }
                            out
                        })
                    })
                    .collect()
            }
            _ => self.rows().flatten().copied().collect(),
        };

        let built = match (self.model, self.alpha) {
            (ColorModel::Gray, AlphaInfo::None) => {
                GrayImage::from_raw(w, h, packed).map(DynamicImage::ImageLuma8)
            }
            (ColorModel::Gray, AlphaInfo::Premultiplied) => {
                GrayAlphaImage::from_raw(w, h, packed).map(DynamicImage::ImageLumaA8)
            }
            (ColorModel::Rgb, AlphaInfo::Premultiplied) => {
                RgbaImage::from_raw(w, h, packed).map(DynamicImage::ImageRgba8)
            }
            _ => RgbImage::from_raw(w, h, packed).map(DynamicImage::ImageRgb8),
        };
        built.ok_or_else(|| RasterKitError::invalid_image("pixel buffer does not match dimensions"))
    }

    // =========================================================================
    // tiny-skia interop
    // =========================================================================

    /// Premultiplied RGBA copy suitable for drawing.
    pub(crate) fn to_pixmap(&self) -> Result<Pixmap> {
        let size = IntSize::from_wh(self.width, self.height)
            .ok_or_else(|| RasterKitError::invalid_image("raster has zero size"))?;
        let channels = self.channels();
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for row in self.rows() {
            for px in row.chunks_exact(channels) {
                let rgba = match (self.model, self.alpha) {
                    (ColorModel::Rgb, AlphaInfo::Premultiplied) => [px[0], px[1], px[2], px[3]],
                    (ColorModel::Rgb, AlphaInfo::None) => [px[0], px[1], px[2], 255],
                    (ColorModel::Gray, AlphaInfo::Premultiplied) => [px[0], px[0], px[0], px[1]],
                    (ColorModel::Gray, AlphaInfo::None) => [px[0], px[0], px[0], 255],
                    (ColorModel::Cmyk, _) => {
                        let [r, g, b] = cmyk_to_rgb(px);
                        [r, g, b, 255]
                    }
                };
                data.extend_from_slice(&rgba);
            }
        }
        Pixmap::from_vec(data, size)
            .ok_or_else(|| RasterKitError::invalid_image("raster could not back a pixmap"))
    }

    /// Snapshot of a drawing surface.
    pub(crate) fn from_pixmap(pixmap: Pixmap) -> Result<Self> {
        let (width, height) = (pixmap.width(), pixmap.height());
        Self::from_packed(
            width,
            height,
            ColorModel::Rgb,
            AlphaInfo::Premultiplied,
            pixmap.take(),
        )
    }
}

fn channel_count(model: ColorModel, alpha: AlphaInfo) -> usize {
    model.components() + usize::from(alpha == AlphaInfo::Premultiplied)
}

pub(crate) fn premultiply(c: u8, a: u8) -> u8 {
    ((c as u16 * a as u16 + 127) / 255) as u8
}

pub(crate) fn demultiply(c: u8, a: u8) -> u8 {
    if a == 0 {
        return 0;
    }
    ((c as u32 * 255 + a as u32 / 2) / a as u32).min(255) as u8
}

pub(crate) fn premultiply_rgba([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    [premultiply(r, a), premultiply(g, a), premultiply(b, a), a]
}

pub(crate) fn cmyk_to_rgb(px: &[u8]) -> [u8; 3] {
    let k = 255 - px[3] as u16;
    let ch = |c: u8| ((255 - c as u16) * k / 255) as u8;
    [ch(px[0]), ch(px[1]), ch(px[2])]
}

pub(crate) fn rgb_to_cmyk(r: u8, g: u8, b: u8) -> [u8; 4] {
    let max = r.max(g).max(b) as u16;
    if max == 0 {
        return [0, 0, 0, 255];
    }
    let k = 255 - max;
    let ch = |c: u8| ((max - c as u16) * 255 / max) as u8;
    [ch(r), ch(g), ch(b), k as u8]
}

fn to_straight_rgba(model: ColorModel, alpha: AlphaInfo, px: &[u8]) -> [u8; 4] {
    match (model, alpha) {
        (ColorModel::Rgb, AlphaInfo::Premultiplied) => {
            let a = px[3];
            [demultiply(px[0], a), demultiply(px[1], a), demultiply(px[2], a), a]
        }
        (ColorModel::Rgb, AlphaInfo::None) => [px[0], px[1], px[2], 255],
        (ColorModel::Gray, AlphaInfo::Premultiplied) => {
            let v = demultiply(px[0], px[1]);
            [v, v, v, px[1]]
        }
        (ColorModel::Gray, AlphaInfo::None) => [px[0], px[0], px[0], 255],
        (ColorModel::Cmyk, _) => {
            let [r, g, b] = cmyk_to_rgb(px);
            [r, g, b, 255]
        }
    }
}
