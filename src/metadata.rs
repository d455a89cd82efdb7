// src/metadata.rs
//
// Metadata and orientation model: typed frame properties, EXIF orientation
// and GPS coordinates. Un-rotation itself lives in the pipeline
// (`remove_orientation`) because it draws.

mod gps;
mod orientation;
mod properties;

pub use gps::{GpsCoordinate, GpsCoordinates};
pub use orientation::{Orientation, OrientationTransform};
pub use properties::{
    GifProperties, GpsProperties, ImageProperties, PropertyBag, PropertyValue, DEFAULT_DPI,
    GIF_DELAY_CLAMP_THRESHOLD, GIF_MIN_DELAY,
};

pub use crate::engine::pipeline::remove_orientation;
