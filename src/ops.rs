// src/ops.rs
//
// Value types shared by every module: geometry, format identifiers and the
// transformation operations that can be chained through `apply_ops`.

use crate::color::Color;
use crate::error::RasterKitError;
use crate::metadata::Orientation;
use std::fmt;
use std::str::FromStr;

/// A size in drawing units. Contexts truncate to whole pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0.0,
        height: 0.0,
    };

    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn from_pixels(width: u32, height: u32) -> Self {
        Self::new(width as f32, height as f32)
    }

    /// Truncated pixel dimensions, `None` when either side is below one pixel
    /// or not finite.
    pub fn to_pixels(self) -> Option<(u32, u32)> {
        if !self.width.is_finite() || !self.height.is_finite() {
            return None;
        }
        let (w, h) = (self.width.trunc(), self.height.trunc());
        if w < 1.0 || h < 1.0 || w > u32::MAX as f32 || h > u32::MAX as f32 {
            return None;
        }
        Some((w as u32, h as u32))
    }

    pub fn scaled(self, factor: f32) -> Self {
        Self::new(self.width * factor, self.height * factor)
    }

    pub fn swapped(self) -> Self {
        Self::new(self.height, self.width)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle with a top-left origin.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const ZERO: Rect = Rect {
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
    };

    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_size(size: Size) -> Self {
        Self::new(0.0, 0.0, size.width, size.height)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }

    pub fn is_zero(&self) -> bool {
        *self == Rect::ZERO
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Shrinks (or grows, for negative values) the rect on every side.
    pub fn inset_by(&self, dx: f32, dy: f32) -> Self {
        Self::new(
            self.x + dx,
            self.y + dy,
            self.width - 2.0 * dx,
            self.height - 2.0 * dy,
        )
    }

    pub fn offset_by(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Smallest rect containing this rect after rotating it about the origin.
    pub fn rotated_bounds(&self, radians: f32) -> Self {
        let (sin, cos) = radians.sin_cos();
        let corners = [
            (self.x, self.y),
            (self.max_x(), self.y),
            (self.x, self.max_y()),
            (self.max_x(), self.max_y()),
        ];
        let mut min = (f32::INFINITY, f32::INFINITY);
        let mut max = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for (x, y) in corners {
            let rx = x * cos - y * sin;
            let ry = x * sin + y * cos;
            min = (min.0.min(rx), min.1.min(ry));
            max = (max.0.max(rx), max.1.max(ry));
        }
        Self::new(min.0, min.1, max.0 - min.0, max.1 - min.1)
    }

    pub(crate) fn to_skia(self) -> Option<tiny_skia::Rect> {
        tiny_skia::Rect::from_xywh(self.x, self.y, self.width, self.height)
    }
}

/// Encoded container identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageType {
    Png,
    Jpeg,
    Tiff,
    Heic,
    Gif,
    Bmp,
}

impl ImageType {
    pub const ALL: [ImageType; 6] = [
        ImageType::Png,
        ImageType::Jpeg,
        ImageType::Tiff,
        ImageType::Heic,
        ImageType::Gif,
        ImageType::Bmp,
    ];

    pub fn identifier(&self) -> &'static str {
        match self {
            ImageType::Png => "png",
            ImageType::Jpeg => "jpeg",
            ImageType::Tiff => "tiff",
            ImageType::Heic => "heic",
            ImageType::Gif => "gif",
            ImageType::Bmp => "bmp",
        }
    }

    /// Only TIFF and GIF containers hold more than one frame.
    pub fn supports_multiple_frames(&self) -> bool {
        matches!(self, ImageType::Tiff | ImageType::Gif)
    }

    pub fn supports_compression(&self) -> bool {
        matches!(self, ImageType::Jpeg | ImageType::Heic)
    }

    pub(crate) fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Png => Some(ImageType::Png),
            image::ImageFormat::Jpeg => Some(ImageType::Jpeg),
            image::ImageFormat::Tiff => Some(ImageType::Tiff),
            image::ImageFormat::Gif => Some(ImageType::Gif),
            image::ImageFormat::Bmp => Some(ImageType::Bmp),
            _ => None,
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl FromStr for ImageType {
    type Err = RasterKitError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "png" => Ok(ImageType::Png),
            "jpeg" | "jpg" => Ok(ImageType::Jpeg),
            "tiff" | "tif" => Ok(ImageType::Tiff),
            "heic" | "heif" => Ok(ImageType::Heic),
            "gif" => Ok(ImageType::Gif),
            "bmp" => Ok(ImageType::Bmp),
            other => Err(RasterKitError::invalid_image(format!("unsupported image type: {other}"))),
        }
    }
}

/// How `scale` maps a source onto a target size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScalingType {
    /// Stretch each axis independently to the target size
    #[default]
    AxesIndependent,
    /// Keep the aspect ratio, fit inside the target and center
    AspectFit,
    /// Keep the aspect ratio, cover the target and center
    AspectFill,
}

/// Mirror axis for `flip`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlipType {
    /// Mirror across the horizontal axis: the top row becomes the bottom row
    #[default]
    Horizontally,
    /// Mirror across the vertical axis: the left column becomes the right column
    Vertically,
    Both,
}

/// Tile placement for pattern fills.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Tiling {
    /// Tiles snap to whole pixels, cell content is never resampled
    NoDistortion,
    #[default]
    ConstantSpacing,
    ConstantSpacingMinimalDistortion,
}

/// Target colour model for `convert_colorspace`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorspaceTarget {
    Cmyk,
    Rgba,
}

/// Transformations that can be queued and applied in one pass.
///
/// Each operation is self-contained: it takes the previous raster and
/// produces a new one.
#[derive(Clone, Debug)]
pub enum Operation {
    Crop { rect: Rect },
    RotateBy { radians: f32 },
    RotateTo { orientation: Orientation },
    Scale { scaling: ScalingType, size: Size },
    ScaleBy { factor: f32 },
    Flip { flip: FlipType },
    Border { color: Color, line_width: f32 },
    Tint { color: Color, keeping_alpha: bool },
    Grayscale { keeping_alpha: bool },
    Alpha { value: f32 },
    ConvertColorspace { target: ColorspaceTarget },
    AdjustColors {
        saturation: f32,
        brightness: f32,
        contrast: f32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_to_pixels_truncates() {
        assert_eq!(Size::new(10.9, 3.2).to_pixels(), Some((10, 3)));
        assert_eq!(Size::new(0.5, 3.0).to_pixels(), None);
        assert_eq!(Size::new(f32::NAN, 3.0).to_pixels(), None);
    }

    #[test]
    fn rect_inset_shrinks_every_side() {
        let r = Rect::new(0.0, 0.0, 10.0, 8.0).inset_by(1.0, 2.0);
        assert_eq!(r, Rect::new(1.0, 2.0, 8.0, 4.0));
    }

    #[test]
    fn rotated_bounds_quarter_turn_swaps() {
        let r = Rect::new(0.0, 0.0, 40.0, 10.0).rotated_bounds(std::f32::consts::FRAC_PI_2);
        assert!((r.width - 10.0).abs() < 1e-3);
        assert!((r.height - 40.0).abs() < 1e-3);
    }

    #[test]
    fn image_type_parsing() {
        assert_eq!("JPG".parse::<ImageType>().unwrap(), ImageType::Jpeg);
        assert_eq!("tif".parse::<ImageType>().unwrap(), ImageType::Tiff);
        assert!(matches!(
            "webp".parse::<ImageType>(),
            Err(RasterKitError::InvalidImage { .. })
        ));
        for t in ImageType::ALL {
            assert_eq!(t.identifier().parse::<ImageType>().unwrap(), t);
        }
    }

    #[test]
    fn only_tiff_and_gif_are_multi_frame() {
        let multi: Vec<_> = ImageType::ALL
            .iter()
            .filter(|t| t.supports_multiple_frames())
            .collect();
        assert_eq!(multi, vec![&ImageType::Tiff, &ImageType::Gif]);
    }
}
