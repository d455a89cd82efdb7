// lib.rs
//
// rasterkit: multi-frame image containers, per-frame metadata and a fluent
// set of raster transformations over a scoped 2D drawing context.
//
// Design goals:
// - Rasters are immutable; every operation returns a new one
// - Frames decode lazily and are cached by their container
// - Metadata is typed (orientation, DPI, GPS, GIF timing)
// - Every failure is an explicit error; absent data is `None`

pub mod codecs;
pub mod color;
pub mod container;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod ops;
pub mod pattern;
pub mod thumbnail;

pub use color::Color;
pub use container::{ContainerBuilder, Frame, ImageContainer};
pub use engine::{DecodeLimits, DrawingContext, Raster, RasterHandle};
pub use error::{ErrorCategory, RasterKitError, Result};
pub use metadata::{GpsCoordinate, GpsCoordinates, ImageProperties, Orientation};
pub use ops::{ColorspaceTarget, FlipType, ImageType, Operation, Point, Rect, ScalingType, Size, Tiling};
pub use pattern::{ColorPattern, MaskPattern, PatternFill};
pub use thumbnail::FileThumbnail;
pub use tiny_skia::{Path, PathBuilder};

use image::ImageReader;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Seek};

/// Header facts read without decoding pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectMetadata {
    pub width: u32,
    pub height: u32,
    pub format: Option<ImageType>,
}

fn read_inspect_metadata<R: BufRead + Seek>(reader: R) -> Result<InspectMetadata> {
    let reader = ImageReader::new(reader)
        .with_guessed_format()
        .map_err(|e| RasterKitError::invalid_image(format!("failed to read image header: {e}")))?;

    let format = reader.format().and_then(ImageType::from_image_format);
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| RasterKitError::invalid_image(format!("failed to read dimensions: {e}")))?;

    Ok(InspectMetadata {
        width,
        height,
        format,
    })
}

/// Inspect dimensions and format from the header bytes only.
///
/// Use this to reject images that are too large before decoding them.
pub fn inspect_header_from_bytes(data: &[u8]) -> Result<InspectMetadata> {
    read_inspect_metadata(Cursor::new(data))
}

pub fn inspect_header_from_path(path: &str) -> Result<InspectMetadata> {
    let file = File::open(path).map_err(|e| RasterKitError::file_read_failed(path.to_string(), e))?;
    read_inspect_metadata(BufReader::new(file))
}

/// Get library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Identifiers that decode.
pub fn supported_input_formats() -> Vec<&'static str> {
    ImageType::ALL
        .iter()
        .filter(|ty| **ty != ImageType::Heic)
        .map(ImageType::identifier)
        .collect()
}

/// Identifiers that encode.
pub fn supported_output_formats() -> Vec<&'static str> {
    supported_input_formats()
}
