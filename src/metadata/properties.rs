// src/metadata/properties.rs
//
// Typed per-frame property model. Known namespaces get named optional
// fields; anything else is kept as opaque bytes keyed by name.

use crate::metadata::gps::{GpsCoordinate, GpsCoordinates};
use crate::metadata::orientation::Orientation;
use std::collections::BTreeMap;

/// Display DPI assumed when a frame carries no resolution.
pub const DEFAULT_DPI: f64 = 72.0;

/// GIF frames stored with a delay at or below this are played at
/// [`GIF_MIN_DELAY`].
pub const GIF_DELAY_CLAMP_THRESHOLD: f64 = 0.01;
pub const GIF_MIN_DELAY: f64 = 0.1;

/// A heterogeneous value inside a pass-through dictionary.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bytes(Vec<u8>),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Integer(i) => Some(*i as f64),
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::List(items) if items.len() == 1 => items[0].as_f64(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(i) => Some(*i),
            PropertyValue::List(items) if items.len() == 1 => items[0].as_i64(),
            _ => None,
        }
    }
}

/// Opaque EXIF/TIFF/HEIC sub-dictionary, keyed by tag name.
pub type PropertyBag = BTreeMap<String, PropertyValue>;

/// The GPS sub-dictionary.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GpsProperties {
    pub latitude: Option<f64>,
    pub latitude_ref: Option<String>,
    pub longitude: Option<f64>,
    pub longitude_ref: Option<String>,
    pub altitude: Option<f64>,
    /// `A` (active) or `V` (void)
    pub status: Option<String>,
}

impl GpsProperties {
    pub fn from_coordinates(coordinates: &GpsCoordinates) -> Self {
        Self {
            latitude: Some(coordinates.latitude.value),
            latitude_ref: Some(coordinates.latitude.reference.clone()),
            longitude: Some(coordinates.longitude.value),
            longitude_ref: Some(coordinates.longitude.reference.clone()),
            altitude: None,
            status: None,
        }
    }

    /// Status `V` marks placeholder tags some firmware writes without a fix.
    pub fn is_void(&self) -> bool {
        self.status.as_deref() == Some("V")
    }

    /// Latitude as a magnitude and hemisphere, a negative value folded into
    /// the opposite hemisphere. `N` is assumed when the reference is missing.
    pub fn latitude_coordinate(&self) -> Option<GpsCoordinate> {
        hemisphere_form(self.latitude?, self.latitude_ref.as_deref().unwrap_or("N"), true)
    }

    pub fn longitude_coordinate(&self) -> Option<GpsCoordinate> {
        hemisphere_form(self.longitude?, self.longitude_ref.as_deref().unwrap_or("E"), false)
    }

    /// Coordinates when all four fields are present and the status is not void.
    pub fn coordinates(&self) -> Option<GpsCoordinates> {
        if self.is_void() {
            return None;
        }
        Some(GpsCoordinates::from_parts(
            self.latitude?,
            self.latitude_ref.clone()?,
            self.longitude?,
            self.longitude_ref.clone()?,
        ))
    }
}

fn hemisphere_form(value: f64, reference: &str, is_latitude: bool) -> Option<GpsCoordinate> {
    let signed = GpsCoordinate::with_reference(value, reference).normalized().value;
    signed
        .is_finite()
        .then(|| GpsCoordinate::new(signed, is_latitude))
}

/// The GIF sub-dictionary, delays in seconds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GifProperties {
    pub delay_time: Option<f64>,
    pub unclamped_delay_time: Option<f64>,
    /// 0 loops forever
    pub loop_count: Option<u32>,
}

impl GifProperties {
    /// Builds both delay fields from the delay stored in the file.
    pub fn from_stored_delay(seconds: f64) -> Self {
        let clamped = if seconds <= GIF_DELAY_CLAMP_THRESHOLD {
            GIF_MIN_DELAY
        } else {
            seconds
        };
        Self {
            delay_time: Some(clamped),
            unclamped_delay_time: Some(seconds),
            loop_count: None,
        }
    }

    pub fn with_delay(seconds: f64) -> Self {
        Self {
            delay_time: Some(seconds),
            unclamped_delay_time: Some(seconds),
            loop_count: None,
        }
    }

    pub fn delay(&self) -> f64 {
        self.delay_time.unwrap_or(0.0)
    }

    pub fn unclamped_delay(&self) -> f64 {
        self.unclamped_delay_time.unwrap_or(0.0)
    }

    /// Delay to write back out, preferring the value that was stored.
    pub(crate) fn encode_delay(&self) -> f64 {
        self.unclamped_delay_time
            .or(self.delay_time)
            .unwrap_or(GIF_MIN_DELAY)
    }
}

/// Everything known about one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImageProperties {
    pub pixel_width: Option<u32>,
    pub pixel_height: Option<u32>,
    pub orientation: Option<Orientation>,
    pub dpi_width: Option<f64>,
    pub dpi_height: Option<f64>,
    pub gps: Option<GpsProperties>,
    pub gif: Option<GifProperties>,
    pub exif: PropertyBag,
    pub tiff: PropertyBag,
    pub heic: PropertyBag,
    /// Unrecognised blocks, kept verbatim
    pub residual: BTreeMap<String, Vec<u8>>,
}

impl ImageProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = Some(orientation);
        self
    }

    pub fn with_dpi(mut self, width: f64, height: f64) -> Self {
        self.dpi_width = Some(width);
        self.dpi_height = Some(height);
        self
    }

    pub fn with_gps(mut self, gps: GpsProperties) -> Self {
        self.gps = Some(gps);
        self
    }

    pub fn with_gif(mut self, gif: GifProperties) -> Self {
        self.gif = Some(gif);
        self
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation.unwrap_or_default()
    }

    /// Both axes or the 72x72 default.
    pub fn dpi(&self) -> (f64, f64) {
        match (self.dpi_width, self.dpi_height) {
            (Some(w), Some(h)) => (w, h),
            _ => (DEFAULT_DPI, DEFAULT_DPI),
        }
    }

    /// DPI relative to 72 (300dpi -> 4.166).
    pub fn dpi_fraction(&self) -> (f64, f64) {
        let (w, h) = self.dpi();
        (w / DEFAULT_DPI, h / DEFAULT_DPI)
    }

    /// GPS dictionary unless it is void.
    pub fn gps_properties(&self) -> Option<&GpsProperties> {
        self.gps.as_ref().filter(|gps| !gps.is_void())
    }

    pub fn location(&self) -> Option<GpsCoordinates> {
        self.gps_properties()?.coordinates()
    }

    pub fn has_location(&self) -> bool {
        self.gps_properties().is_some()
    }

    /// A copy with the GPS dictionary removed.
    pub fn without_gps(&self) -> Self {
        Self {
            gps: None,
            ..self.clone()
        }
    }
}
