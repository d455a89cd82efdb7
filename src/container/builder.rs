// src/container/builder.rs
//
// Accumulates rasters with optional per-image properties and encodes them
// into one container, in append order.

use super::ImageContainer;
use crate::engine::encoder::{encode_frames, FrameInput};
use crate::engine::handle::RasterHandle;
use crate::engine::raster::Raster;
use crate::error::{RasterKitError, Result};
use crate::metadata::ImageProperties;
use crate::ops::ImageType;
use tracing::{debug, error};

#[derive(Clone, Debug)]
struct Entry {
    raster: Raster,
    properties: Option<ImageProperties>,
    compression: Option<f64>,
}

/// Usage:
/// ```ignore
/// let mut builder = ContainerBuilder::new();
/// builder.add(first, None);
/// builder.add_with_compression(second, 0.8);
/// let tiff = builder.finalize(ImageType::Tiff)?;
/// ```
#[derive(Clone, Debug, Default)]
pub struct ContainerBuilder {
    entries: Vec<Entry>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every image shares `compression`.
    pub fn with_images(rasters: impl IntoIterator<Item = Raster>, compression: Option<f64>) -> Self {
        Self {
            entries: rasters
                .into_iter()
                .map(|raster| Entry {
                    raster,
                    properties: None,
                    compression,
                })
                .collect(),
        }
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends without validating anything.
    pub fn add(&mut self, raster: Raster, properties: Option<ImageProperties>) {
        self.entries.push(Entry {
            raster,
            properties,
            compression: None,
        });
    }

    pub fn add_with_compression(&mut self, raster: Raster, compression: f64) {
        self.entries.push(Entry {
            raster,
            properties: None,
            compression: Some(compression),
        });
    }

    /// Copies the handle's raster and properties. Fails for a released handle.
    pub fn add_handle(&mut self, handle: &RasterHandle) -> Result<()> {
        let raster = handle.raster()?.clone();
        self.add(raster, handle.properties().cloned());
        Ok(())
    }

    /// Encodes every image into `image_type`.
    ///
    /// Empty builders and several images bound for a single-image format
    /// fail before any encoder is created.
    pub fn finalize(&self, image_type: ImageType) -> Result<Vec<u8>> {
        if self.entries.is_empty() {
            error!(target: "rasterkit::builder", format = %image_type, "no images to build");
            return Err(RasterKitError::cannot_create_destination(
                image_type.identifier(),
                "the builder holds no images",
            ));
        }
        if self.entries.len() > 1 && !image_type.supports_multiple_frames() {
            error!(
                target: "rasterkit::builder",
                format = %image_type,
                images = self.entries.len(),
                "tiff and gif are the only types that hold several images"
            );
            return Err(RasterKitError::cannot_create_destination(
                image_type.identifier(),
                "tiff and gif are the only types that hold several images",
            ));
        }

        let inputs: Vec<_> = self
            .entries
            .iter()
            .map(|entry| FrameInput {
                raster: &entry.raster,
                properties: entry.properties.as_ref(),
                compression: entry.compression,
            })
            .collect();
        let data = encode_frames(&inputs, image_type, false)?;
        debug!(
            target: "rasterkit::builder",
            format = %image_type,
            images = inputs.len(),
            bytes = data.len(),
            "finalized container"
        );
        Ok(data)
    }

    /// Finalizes and decodes the result.
    pub fn build(&self, image_type: ImageType) -> Result<ImageContainer> {
        ImageContainer::from_bytes(self.finalize(image_type)?)
    }
}
