// src/container/frame.rs
//
// A borrowed view of one frame inside an ImageContainer.

use super::{FrameSlot, ImageContainer};
use crate::engine::encoder::{encode_raster, EncodeOptions};
use crate::engine::handle::RasterHandle;
use crate::engine::pipeline;
use crate::engine::raster::Raster;
use crate::error::{RasterKitError, Result};
use crate::metadata::{GifProperties, GpsCoordinates, GpsProperties, ImageProperties, Orientation, PropertyBag};
use crate::ops::{ImageType, ScalingType, Size};
use tracing::debug;

/// Longest edge of a thumbnail when none is requested.
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 300;

/// One frame of a container. Cannot outlive it.
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    container: &'a ImageContainer,
    index: usize,
}

impl<'a> Frame<'a> {
    pub(crate) fn new(container: &'a ImageContainer, index: usize) -> Self {
        Self { container, index }
    }

    fn slot(&self) -> &'a FrameSlot {
        self.container.slot(self.index)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    // =========================================================================
    // PIXELS
    // =========================================================================

    /// Decoded on first request, then cached for the container's lifetime.
    pub fn raster(&self) -> Result<&'a Raster> {
        self.slot()
            .raster
            .get_or_try_init(|| self.container.decode_frame(self.index))
    }

    /// The raster with its orientation removed, cached like [`Frame::raster`].
    pub fn normalized_raster(&self) -> Result<&'a Raster> {
        self.slot().normalized.get_or_try_init(|| {
            let raster = self.raster()?;
            pipeline::remove_orientation(raster, self.orientation())
        })
    }

    /// An upright copy of the frame as a handle.
    pub fn removing_orientation(&self) -> Result<RasterHandle> {
        let props = self.properties().clone().with_orientation(Orientation::Up);
        Ok(RasterHandle::new(self.normalized_raster()?.clone()).with_properties(props))
    }

    /// Upright, aspect-preserving, with the longest edge at most
    /// `max_pixel_size` (300 when `None`). Never enlarges.
    pub fn thumbnail(&self, max_pixel_size: Option<u32>) -> Result<Raster> {
        let max = max_pixel_size.unwrap_or(DEFAULT_THUMBNAIL_SIZE);
        if max == 0 {
            return Err(RasterKitError::invalid_parameters(
                "max_pixel_size",
                0.0,
                "a size of at least 1",
            ));
        }
        let raster = self.normalized_raster()?;
        let (w, h) = raster.dimensions();
        let longest = w.max(h);
        if longest <= max {
            return Ok(raster.clone());
        }
        let scale = max as f32 / longest as f32;
        let target = Size::new(
            (w as f32 * scale).round().max(1.0),
            (h as f32 * scale).round().max(1.0),
        );
        debug!(target: "rasterkit::thumbnail", index = self.index, ?target, "scaling frame thumbnail");
        pipeline::scale(raster, ScalingType::AxesIndependent, target)
    }

    // =========================================================================
    // PROPERTIES
    // =========================================================================

    pub fn properties(&self) -> &'a ImageProperties {
        &self.slot().properties
    }

    pub fn pixel_size(&self) -> Size {
        let slot = self.slot();
        Size::from_pixels(slot.width, slot.height)
    }

    /// 72x72 when the file carries no resolution.
    pub fn dpi(&self) -> (f64, f64) {
        self.properties().dpi()
    }

    pub fn dpi_fraction(&self) -> (f64, f64) {
        self.properties().dpi_fraction()
    }

    /// `Up` when untagged.
    pub fn orientation(&self) -> Orientation {
        self.properties().orientation()
    }

    /// The GPS dictionary, unless its status marks it void.
    pub fn gps_properties(&self) -> Option<&'a GpsProperties> {
        self.properties().gps_properties()
    }

    pub fn has_location(&self) -> bool {
        self.gps_properties().is_some()
    }

    /// Requires latitude, longitude and both references.
    pub fn location(&self) -> Option<GpsCoordinates> {
        self.properties().location()
    }

    pub fn gif_properties(&self) -> Option<&'a GifProperties> {
        self.properties().gif.as_ref()
    }

    /// Seconds, clamped to 0.1 when the file stores 0.01 or less. 0 when
    /// not a GIF frame.
    pub fn gif_delay(&self) -> f64 {
        self.gif_properties().map_or(0.0, GifProperties::delay)
    }

    pub fn gif_unclamped_delay(&self) -> f64 {
        self.gif_properties().map_or(0.0, GifProperties::unclamped_delay)
    }

    pub fn exif_properties(&self) -> &'a PropertyBag {
        &self.properties().exif
    }

    pub fn tiff_properties(&self) -> &'a PropertyBag {
        &self.properties().tiff
    }

    pub fn heic_properties(&self) -> &'a PropertyBag {
        &self.properties().heic
    }

    // =========================================================================
    // ENCODING
    // =========================================================================

    /// Encodes this frame alone, carrying its properties.
    pub fn encode(&self, image_type: ImageType, remove_gps: bool, compression: Option<f64>) -> Result<Vec<u8>> {
        let options = EncodeOptions {
            compression,
            exclude_gps: remove_gps,
            properties: Some(self.properties().clone()),
        };
        encode_raster(self.raster()?, image_type, &options)
    }
}
