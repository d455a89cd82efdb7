// src/container.rs
//
// Multi-frame container: the decoded form of one encoded byte stream.
// Frame metadata is read up front; pixels are decoded lazily per frame and
// cached in the container's own slots, so frames are plain borrowed views.

mod builder;
mod frame;

pub use builder::ContainerBuilder;
pub use frame::{Frame, DEFAULT_THUMBNAIL_SIZE};

use crate::codecs::gif_frames::{decode_gif_frames, scan_gif};
use crate::codecs::tiff_pages::{decode_tiff_page, scan_tiff};
use crate::engine::decoder::{decode_raster, detect_format, ensure_dimensions_safe, read_dimensions};
use crate::engine::encoder::{encode_frames, encode_raster, EncodeOptions, FrameInput};
use crate::engine::firewall::DecodeLimits;
use crate::engine::io::{extract_exif_block, extract_page_properties, extract_properties, Source};
use crate::engine::raster::Raster;
use crate::error::{RasterKitError, Result};
use crate::metadata::{GifProperties, GpsCoordinates, ImageProperties};
use crate::ops::ImageType;
use once_cell::unsync::OnceCell;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Per-frame state owned by the container.
#[derive(Debug)]
pub(crate) struct FrameSlot {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) properties: ImageProperties,
    pub(crate) raster: OnceCell<Raster>,
    pub(crate) normalized: OnceCell<Raster>,
}

impl FrameSlot {
    fn new(width: u32, height: u32, mut properties: ImageProperties) -> Self {
        properties.pixel_width = Some(width);
        properties.pixel_height = Some(height);
        Self {
            width,
            height,
            properties,
            raster: OnceCell::new(),
            normalized: OnceCell::new(),
        }
    }
}

/// An ordered, immutable set of frames decoded from PNG, JPEG, BMP, TIFF or
/// GIF data.
///
/// Usage:
/// ```ignore
/// let container = ImageContainer::from_path("animation.gif")?;
/// for frame in container.frames() {
///     println!("{} {:?}", frame.gif_delay(), frame.pixel_size());
/// }
/// ```
#[derive(Debug)]
pub struct ImageContainer {
    data: Arc<Vec<u8>>,
    image_type: ImageType,
    slots: Vec<FrameSlot>,
}

impl ImageContainer {
    // =========================================================================
    // CONSTRUCTORS
    // =========================================================================

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        Self::from_bytes_with_limits(bytes, &DecodeLimits::default())
    }

    /// Decodes frame metadata under `limits`. Pixels are decoded on demand.
    pub fn from_bytes_with_limits(bytes: impl Into<Vec<u8>>, limits: &DecodeLimits) -> Result<Self> {
        Self::from_source(Source::Memory(Arc::new(bytes.into())), limits)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_source(Source::Path(path.as_ref().to_path_buf()), &DecodeLimits::default())
    }

    /// A single-frame PNG container holding `raster`.
    pub fn from_raster(raster: &Raster) -> Result<Self> {
        Self::from_bytes(encode_raster(raster, ImageType::Png, &EncodeOptions::new())?)
    }

    pub fn from_rasters(rasters: Vec<Raster>, image_type: ImageType) -> Result<Self> {
        ContainerBuilder::with_images(rasters, None).build(image_type)
    }

    /// Builds a container from `rasters`, all at one compression level.
    pub fn build(rasters: Vec<Raster>, image_type: ImageType, compression: f64) -> Result<Self> {
        ContainerBuilder::with_images(rasters, Some(compression)).build(image_type)
    }

    fn from_source(source: Source, limits: &DecodeLimits) -> Result<Self> {
        let data = source.load()?;
        limits.enforce_source_len(data.len())?;
        let image_type = detect_format(&data)
            .ok_or_else(|| RasterKitError::invalid_image("unrecognised image data"))?;

        let slots = match image_type {
            ImageType::Heic => {
                return Err(RasterKitError::invalid_image("no HEIC decoder is available"))
            }
            ImageType::Gif => scan_gif(&data, limits)?
                .into_iter()
                .map(|info| {
                    let props = ImageProperties::new().with_gif(GifProperties::from_stored_delay(info.delay));
                    FrameSlot::new(info.width, info.height, props)
                })
                .collect(),
            ImageType::Tiff => {
                let pages = scan_tiff(&data, limits)?;
                let properties = extract_page_properties(&data, pages.len());
                pages
                    .into_iter()
                    .zip(properties)
                    .map(|(page, mut props)| {
                        props.orientation = page.orientation;
                        if let Some((x, y)) = page.dpi {
                            props = props.with_dpi(x, y);
                        }
                        FrameSlot::new(page.width, page.height, props)
                    })
                    .collect()
            }
            ImageType::Jpeg | ImageType::Png | ImageType::Bmp => {
                vec![Self::single_slot(&data, image_type, limits)?]
            }
        };

        debug!(
            target: "rasterkit::decode",
            format = %image_type,
            frames = slots.len(),
            bytes = data.len(),
            "opened container"
        );
        Ok(Self {
            data,
            image_type,
            slots,
        })
    }

    fn single_slot(data: &[u8], image_type: ImageType, limits: &DecodeLimits) -> Result<FrameSlot> {
        ensure_dimensions_safe(data, limits)?;
        if let Some(block) = extract_exif_block(data, image_type) {
            limits.enforce_metadata_len(block.len())?;
        }
        let props = extract_properties(data, image_type);
        match read_dimensions(data) {
            Some((w, h)) => Ok(FrameSlot::new(w, h, props)),
            None => {
                let raster = decode_raster(data)?;
                let slot = FrameSlot::new(raster.width(), raster.height(), props);
                let _ = slot.raster.set(raster);
                Ok(slot)
            }
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn image_type(&self) -> ImageType {
        self.image_type
    }

    pub fn count(&self) -> usize {
        self.slots.len()
    }

    /// The encoded bytes this container was decoded from.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The frame at `index`, or `None` when out of range (negative included).
    pub fn frame<I: TryInto<usize>>(&self, index: I) -> Option<Frame<'_>> {
        let index = index.try_into().ok()?;
        (index < self.slots.len()).then(|| Frame::new(self, index))
    }

    pub fn first(&self) -> Option<Frame<'_>> {
        self.frame(0usize)
    }

    pub fn frames(&self) -> impl Iterator<Item = Frame<'_>> + '_ {
        (0..self.slots.len()).map(move |index| Frame::new(self, index))
    }

    /// The first frame, in order, with usable GPS coordinates.
    pub fn location(&self) -> Option<GpsCoordinates> {
        self.frames().find_map(|frame| frame.location())
    }

    pub fn has_location(&self) -> bool {
        self.location().is_some()
    }

    pub(crate) fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    /// Decodes frame `index` from the original bytes. GIF frames are
    /// decoded together, so the other slots are filled on the way.
    pub(crate) fn decode_frame(&self, index: usize) -> Result<Raster> {
        debug!(target: "rasterkit::decode", index, format = %self.image_type, "materializing frame");
        match self.image_type {
            ImageType::Gif => {
                let mut requested = None;
                for (i, raster) in decode_gif_frames(&self.data)?.into_iter().enumerate() {
                    if i == index {
                        requested = Some(raster);
                    } else if let Some(slot) = self.slots.get(i) {
                        let _ = slot.raster.set(raster);
                    }
                }
                requested.ok_or_else(|| RasterKitError::invalid_image(format!("gif has no frame {index}")))
            }
            ImageType::Tiff => decode_tiff_page(&self.data, index),
            _ => decode_raster(&self.data),
        }
    }

    // =========================================================================
    // ENCODING
    // =========================================================================

    /// Re-encodes every frame into `image_type` (the source type when
    /// `None`). The same type without GPS removal returns the source bytes.
    pub fn encode(&self, image_type: Option<ImageType>, remove_gps: bool) -> Result<Vec<u8>> {
        let target = image_type.unwrap_or(self.image_type);
        if target == self.image_type && !remove_gps {
            debug!(target: "rasterkit::encode", format = %target, "returning source bytes verbatim");
            return Ok(self.data.to_vec());
        }

        let frames = self.frames().collect::<Vec<_>>();
        let properties = frames
            .iter()
            .map(|frame| {
                let props = frame.properties();
                if remove_gps {
                    props.without_gps()
                } else {
                    props.clone()
                }
            })
            .collect::<Vec<_>>();
        let mut inputs = Vec::with_capacity(frames.len());
        for (frame, props) in frames.iter().zip(&properties) {
            inputs.push(FrameInput {
                raster: frame.raster()?,
                properties: Some(props),
                compression: None,
            });
        }
        encode_frames(&inputs, target, remove_gps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{GpsProperties, Orientation};

    fn solid(rgba: [u8; 4]) -> Raster {
        Raster::filled(6, 4, rgba).unwrap()
    }

    fn gps() -> GpsProperties {
        GpsProperties::from_coordinates(&GpsCoordinates::new(43.468365, 11.881635))
    }

    mod open_tests {
        use super::*;

        #[test]
        fn single_png_has_one_frame() {
            let container = ImageContainer::from_raster(&solid([1, 2, 3, 255])).unwrap();
            assert_eq!(container.image_type(), ImageType::Png);
            assert_eq!(container.count(), 1);
            assert!(container.frame(1usize).is_none());
            assert!(container.frame(-1i32).is_none());
            assert_eq!(container.first().unwrap().orientation(), Orientation::Up);
        }

        #[test]
        fn garbage_is_invalid_image() {
            assert!(matches!(
                ImageContainer::from_bytes(b"definitely not".to_vec()),
                Err(RasterKitError::InvalidImage { .. })
            ));
        }

        #[test]
        fn source_length_limit_applies() {
            let png = encode_raster(&solid([0, 0, 0, 255]), ImageType::Png, &EncodeOptions::new()).unwrap();
            let limits = DecodeLimits::custom().with_max_bytes(8);
            assert!(matches!(
                ImageContainer::from_bytes_with_limits(png, &limits),
                Err(RasterKitError::LimitExceeded { .. })
            ));
        }

        #[test]
        fn gif_frames_and_delays() {
            let frames = [solid([255, 0, 0, 255]), solid([0, 255, 0, 255])];
            let mut builder = ContainerBuilder::new();
            for (raster, delay) in frames.into_iter().zip([0.0, 0.3]) {
                builder.add(raster, Some(ImageProperties::new().with_gif(GifProperties::with_delay(delay))));
            }
            let container = builder.build(ImageType::Gif).unwrap();
            assert_eq!(container.count(), 2);
            let first = container.frame(0usize).unwrap();
            assert_eq!(first.gif_unclamped_delay(), 0.0);
            assert_eq!(first.gif_delay(), 0.1);
            assert!((container.frame(1usize).unwrap().gif_delay() - 0.3).abs() < 1e-9);
        }

        #[test]
        fn one_gif_decode_fills_every_frame() {
            let rasters = vec![solid([255, 0, 0, 255]), solid([0, 255, 0, 255]), solid([0, 0, 255, 255])];
            let container = ImageContainer::from_rasters(rasters, ImageType::Gif).unwrap();
            assert!((0..3).all(|i| container.slot(i).raster.get().is_none()));

            let [r, g, _, _] = container.frame(1usize).unwrap().raster().unwrap().rgba_at(0, 0).unwrap();
            assert!(g > 200 && r < 50);
            assert!((0..3).all(|i| container.slot(i).raster.get().is_some()));
            let [_, _, b, _] = container.frame(2usize).unwrap().raster().unwrap().rgba_at(0, 0).unwrap();
            assert!(b > 200);
        }
    }

    mod location_tests {
        use super::*;

        #[test]
        fn location_is_first_frame_with_gps() {
            let raster = solid([9, 9, 9, 255]);
            let png = encode_raster(
                &raster,
                ImageType::Png,
                &EncodeOptions::new().with_properties(ImageProperties::new().with_gps(gps())),
            )
            .unwrap();
            let container = ImageContainer::from_bytes(png).unwrap();
            let loc = container.location().unwrap();
            assert!((loc.latitude.value - 43.468365).abs() < 1e-4);
            assert!(container.has_location());
        }

        #[test]
        fn void_first_page_defers_to_the_next() {
            let void = GpsProperties {
                status: Some("V".into()),
                ..GpsProperties::from_coordinates(&GpsCoordinates::new(1.0, 2.0))
            };
            let located = GpsProperties::from_coordinates(&GpsCoordinates::new(-33.8568, 151.2153));
            let mut builder = ContainerBuilder::new();
            builder.add(solid([1, 1, 1, 255]), Some(ImageProperties::new().with_gps(void)));
            builder.add(solid([2, 2, 2, 255]), Some(ImageProperties::new().with_gps(located)));
            let container = ImageContainer::from_bytes(builder.finalize(ImageType::Tiff).unwrap()).unwrap();

            let first = container.first().unwrap();
            assert_eq!(first.properties().gps.as_ref().and_then(|g| g.status.as_deref()), Some("V"));
            assert!(first.location().is_none());
            let (lat, lon) = container.location().unwrap().decimal_degrees();
            assert!((lat + 33.8568).abs() < 1e-4);
            assert!((lon - 151.2153).abs() < 1e-4);
        }

        #[test]
        fn no_gps_means_no_location() {
            let container = ImageContainer::from_raster(&solid([9, 9, 9, 255])).unwrap();
            assert!(container.location().is_none());
            assert!(!container.has_location());
        }
    }

    mod encode_tests {
        use super::*;

        #[test]
        fn same_type_returns_source_bytes() {
            let container = ImageContainer::from_raster(&solid([1, 2, 3, 255])).unwrap();
            assert_eq!(container.encode(None, false).unwrap(), container.data());
        }

        #[test]
        fn remove_gps_strips_location() {
            let png = encode_raster(
                &solid([5, 5, 5, 255]),
                ImageType::Png,
                &EncodeOptions::new().with_properties(ImageProperties::new().with_gps(gps())),
            )
            .unwrap();
            let container = ImageContainer::from_bytes(png).unwrap();
            let stripped = ImageContainer::from_bytes(container.encode(None, true).unwrap()).unwrap();
            assert!(stripped.location().is_none());
        }

        #[test]
        fn multi_frame_to_jpeg_is_rejected() {
            let container =
                ImageContainer::from_rasters(vec![solid([0, 0, 0, 255]), solid([255; 4])], ImageType::Tiff).unwrap();
            assert_eq!(container.count(), 2);
            assert!(matches!(
                container.encode(Some(ImageType::Jpeg), false),
                Err(RasterKitError::CannotCreateDestination { .. })
            ));
            let gif = ImageContainer::from_bytes(container.encode(Some(ImageType::Gif), false).unwrap()).unwrap();
            assert_eq!(gif.count(), 2);
        }
    }
}
