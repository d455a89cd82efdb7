// src/engine/handle.rs
//
// RasterHandle: single-owner wrapper around one raster with an explicit,
// at-most-once release. Transformations return new handles.

use crate::color::Color;
use crate::engine::context::DrawingContext;
use crate::engine::decoder::decode_raster;
use crate::engine::encoder::{encode_raster, EncodeOptions};
use crate::engine::io::read_file;
use crate::engine::pipeline;
use crate::engine::raster::Raster;
use crate::error::{RasterKitError, Result};
use crate::metadata::{ImageProperties, Orientation};
use crate::ops::{ColorspaceTarget, FlipType, ImageType, Operation, Rect, ScalingType, Size};
use std::borrow::Cow;
use std::path::Path;
use tiny_skia::Path as SkPath;

/// Owns one raster until [`RasterHandle::release`] moves it out.
///
/// Usage:
/// ```ignore
/// let jpeg = RasterHandle::from_path("photo.png")?
///     .rotate_to(Orientation::Right)?
///     .scale(ScalingType::AspectFit, Size::new(800.0, 600.0))?
///     .jpeg_data(Some(0.8), true)?;
/// ```
#[derive(Clone, Debug, Default)]
pub struct RasterHandle {
    raster: Option<Raster>,
    /// Written on encode: orientation, DPI and GPS
    properties: Option<ImageProperties>,
}

impl From<Raster> for RasterHandle {
    fn from(raster: Raster) -> Self {
        Self::new(raster)
    }
}

impl RasterHandle {
    // =========================================================================
    // CONSTRUCTORS
    // =========================================================================

    pub fn new(raster: Raster) -> Self {
        Self {
            raster: Some(raster),
            properties: None,
        }
    }

    /// Decodes the first image in `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode_raster(bytes).map(Self::new)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(&read_file(path)?)
    }

    /// Deep copy. An invalid source fails with `InvalidImage`.
    pub fn copy_of(other: &RasterHandle) -> Result<Self> {
        Ok(Self {
            raster: Some(other.raster()?.clone()),
            properties: other.properties.clone(),
        })
    }

    /// Draws a new image of `size`, optionally filled with `background`.
    pub fn create<F>(size: Size, background: Option<Color>, draw: F) -> Result<Self>
    where
        F: FnOnce(&mut DrawingContext, Size) -> Result<()>,
    {
        DrawingContext::create_image(size, background, draw).map(Self::new)
    }

    /// Attaches properties written by the encode methods.
    pub fn with_properties(mut self, properties: ImageProperties) -> Self {
        self.properties = Some(properties);
        self
    }

    // =========================================================================
    // STATE
    // =========================================================================

    pub fn is_valid(&self) -> bool {
        self.raster.is_some()
    }

    pub fn raster(&self) -> Result<&Raster> {
        self.raster.as_ref().ok_or_else(released)
    }

    pub fn size(&self) -> Result<Size> {
        self.raster().map(Raster::size)
    }

    pub fn properties(&self) -> Option<&ImageProperties> {
        self.properties.as_ref()
    }

    /// Moves the raster out. A second call fails with `InvalidImage`.
    pub fn release(&mut self) -> Result<Raster> {
        self.raster.take().ok_or_else(released)
    }

    pub fn rect_for(size: Size) -> Rect {
        Rect::from_size(size)
    }

    fn derive(&self, raster: Raster) -> Self {
        Self {
            raster: Some(raster),
            properties: self.properties.clone(),
        }
    }

    fn map(&self, op: impl FnOnce(&Raster) -> Result<Raster>) -> Result<Self> {
        op(self.raster()?).map(|raster| self.derive(raster))
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Applies queued operations in order.
    pub fn apply(&self, ops: &[Operation]) -> Result<Self> {
        let raster = pipeline::apply_ops(Cow::Borrowed(self.raster()?), ops)?;
        Ok(self.derive(raster.into_owned()))
    }

    pub fn crop(&self, rect: Rect) -> Result<Self> {
        self.map(|r| pipeline::crop(r, rect))
    }

    pub fn rotate_by(&self, radians: f32) -> Result<Self> {
        self.map(|r| pipeline::rotate_by(r, radians))
    }

    /// Un-rotates, and records the result as upright.
    pub fn rotate_to(&self, orientation: Orientation) -> Result<Self> {
        let mut out = self.map(|r| pipeline::rotate_to(r, orientation))?;
        if let Some(props) = out.properties.as_mut() {
            props.orientation = Some(Orientation::Up);
        }
        Ok(out)
    }

    pub fn scale(&self, scaling: ScalingType, size: Size) -> Result<Self> {
        self.map(|r| pipeline::scale(r, scaling, size))
    }

    pub fn scale_by(&self, factor: f32) -> Result<Self> {
        self.map(|r| pipeline::scale_by(r, factor))
    }

    pub fn flip(&self, flip: FlipType) -> Result<Self> {
        self.map(|r| pipeline::flip(r, flip))
    }

    pub fn draw<F>(&self, draw: F) -> Result<Self>
    where
        F: FnOnce(&mut DrawingContext, Size) -> Result<()>,
    {
        self.map(|r| pipeline::draw(r, draw))
    }

    pub fn border(&self, color: Color, line_width: f32) -> Result<Self> {
        self.map(|r| pipeline::border(r, color, line_width))
    }

    pub fn tint(&self, color: Color, keeping_alpha: bool) -> Result<Self> {
        self.map(|r| pipeline::tint(r, color, keeping_alpha))
    }

    pub fn grayscale(&self, keeping_alpha: bool) -> Result<Self> {
        self.map(|r| pipeline::grayscale(r, keeping_alpha))
    }

    pub fn composite(&self, overlay: &RasterHandle, rect: Option<Rect>, clip: Option<&SkPath>) -> Result<Self> {
        let overlay = overlay.raster()?;
        self.map(|r| pipeline::composite(r, overlay, rect, clip))
    }

    pub fn mask(&self, mask: &RasterHandle) -> Result<Self> {
        let mask = mask.raster()?;
        self.map(|r| pipeline::mask(r, mask))
    }

    pub fn alpha(&self, value: f32) -> Result<Self> {
        self.map(|r| pipeline::alpha(r, value))
    }

    pub fn convert_colorspace(&self, target: ColorspaceTarget) -> Result<Self> {
        self.map(|r| pipeline::convert_colorspace(r, target))
    }

    pub fn adjust_colors(&self, saturation: f32, brightness: f32, contrast: f32) -> Result<Self> {
        self.map(|r| pipeline::adjust_colors(r, saturation, brightness, contrast))
    }

    pub fn clip_to_path(&self, path: &SkPath) -> Result<Self> {
        self.map(|r| pipeline::clip_to_path(r, path))
    }

    pub fn apply_with_clip<F>(&self, path: &SkPath, draw: F) -> Result<Self>
    where
        F: FnOnce(Raster) -> Result<Raster>,
    {
        self.map(|r| pipeline::apply_with_clip(r, path, draw))
    }

    pub fn fill_path(&self, color: Color, path: &SkPath) -> Result<Self> {
        self.map(|r| pipeline::fill_path(r, color, path))
    }

    pub fn stroke_path(&self, color: Color, line_width: f32, path: &SkPath) -> Result<Self> {
        self.map(|r| pipeline::stroke_path(r, color, line_width, path))
    }

    pub fn fill_stroke_path(&self, fill: Color, stroke: Color, line_width: f32, path: &SkPath) -> Result<Self> {
        self.map(|r| pipeline::fill_stroke_path(r, fill, stroke, line_width, path))
    }

    pub fn fill_stroke_path_hex(&self, fill: &str, stroke: &str, line_width: f32, path: &SkPath) -> Result<Self> {
        self.map(|r| pipeline::fill_stroke_path_hex(r, fill, stroke, line_width, path))
    }

    // =========================================================================
    // ENCODING
    // =========================================================================

    pub fn encode(&self, image_type: ImageType, compression: Option<f64>, exclude_gps: bool) -> Result<Vec<u8>> {
        let options = EncodeOptions {
            compression,
            exclude_gps,
            properties: self.properties.clone(),
        };
        encode_raster(self.raster()?, image_type, &options)
    }

    pub fn jpeg_data(&self, compression: Option<f64>, exclude_gps: bool) -> Result<Vec<u8>> {
        self.encode(ImageType::Jpeg, compression, exclude_gps)
    }

    pub fn png_data(&self, exclude_gps: bool) -> Result<Vec<u8>> {
        self.encode(ImageType::Png, None, exclude_gps)
    }

    pub fn tiff_data(&self) -> Result<Vec<u8>> {
        self.encode(ImageType::Tiff, None, false)
    }
}

fn released() -> RasterKitError {
    RasterKitError::invalid_image("raster handle has been released")
}
