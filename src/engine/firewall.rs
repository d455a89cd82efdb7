// src/engine/firewall.rs
//
// Decode limits: configuration and enforcement helpers applied before and
// while a container is decoded.

use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::RasterKitError;

const STRICT_MAX_DIMENSION: u32 = 16_384;
const STRICT_MAX_PIXELS: u64 = 40_000_000; // ~8K x 5K
const STRICT_MAX_BYTES: u64 = 32 * 1024 * 1024; // 32MB input cap
const STRICT_MAX_FRAMES: usize = 256;
const STRICT_METADATA_LIMIT: u64 = 64 * 1024; // 64KB EXIF cap
const LENIENT_MAX_BYTES: u64 = 256 * 1024 * 1024; // 256MB input cap
const LENIENT_MAX_FRAMES: usize = 4_096;
const LENIENT_METADATA_LIMIT: u64 = 512 * 1024; // 512KB EXIF cap

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitPolicy {
    Default,
    Strict,
    Lenient,
    Custom,
}

/// Caps applied to untrusted input while building an `ImageContainer`.
///
/// `MAX_DIMENSION` and `MAX_PIXELS` always apply on top of these limits.
#[derive(Clone, Debug)]
pub struct DecodeLimits {
    pub policy: LimitPolicy,
    pub max_dimension: u32,
    pub max_pixels: u64,
    pub max_bytes: Option<u64>,
    pub max_frames: Option<usize>,
    pub max_metadata_bytes: Option<u64>,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            policy: LimitPolicy::Default,
            max_dimension: MAX_DIMENSION,
            max_pixels: MAX_PIXELS,
            max_bytes: None,
            max_frames: None,
            max_metadata_bytes: None,
        }
    }
}

impl DecodeLimits {
    pub fn strict() -> Self {
        Self {
            policy: LimitPolicy::Strict,
            max_dimension: STRICT_MAX_DIMENSION,
            max_pixels: STRICT_MAX_PIXELS,
            max_bytes: Some(STRICT_MAX_BYTES),
            max_frames: Some(STRICT_MAX_FRAMES),
            max_metadata_bytes: Some(STRICT_METADATA_LIMIT),
        }
    }

    pub fn lenient() -> Self {
        Self {
            policy: LimitPolicy::Lenient,
            max_dimension: MAX_DIMENSION,
            max_pixels: MAX_PIXELS,
            max_bytes: Some(LENIENT_MAX_BYTES),
            max_frames: Some(LENIENT_MAX_FRAMES),
            max_metadata_bytes: Some(LENIENT_METADATA_LIMIT),
        }
    }

    /// Starts from the global caps with every optional limit off.
    pub fn custom() -> Self {
        Self {
            policy: LimitPolicy::Custom,
            ..Self::default()
        }
    }

    pub fn apply_policy(policy: LimitPolicy) -> Self {
        match policy {
            LimitPolicy::Default => Self::default(),
            LimitPolicy::Strict => Self::strict(),
            LimitPolicy::Lenient => Self::lenient(),
            LimitPolicy::Custom => Self::custom(),
        }
    }

    pub fn with_max_dimension(mut self, max: u32) -> Self {
        self.max_dimension = max.min(MAX_DIMENSION);
        self
    }

    pub fn with_max_pixels(mut self, max: u64) -> Self {
        self.max_pixels = max.min(MAX_PIXELS);
        self
    }

    pub fn with_max_bytes(mut self, max: u64) -> Self {
        self.max_bytes = Some(max);
        self
    }

    pub fn with_max_frames(mut self, max: usize) -> Self {
        self.max_frames = Some(max);
        self
    }

    pub fn with_max_metadata_bytes(mut self, max: u64) -> Self {
        self.max_metadata_bytes = Some(max);
        self
    }

    pub fn enforce_source_len(&self, len: usize) -> Result<(), RasterKitError> {
        if let Some(limit) = self.max_bytes {
            let len_u64 = len as u64;
            if len_u64 > limit {
                return Err(RasterKitError::limit_exceeded(format!(
                    "input size {len_u64} bytes exceeds limit of {limit} bytes"
                )));
            }
        }
        Ok(())
    }

    pub fn enforce_dimensions(&self, width: u32, height: u32) -> Result<(), RasterKitError> {
        let max_dimension = self.max_dimension.min(MAX_DIMENSION);
        if width > max_dimension || height > max_dimension {
            return Err(RasterKitError::limit_exceeded(format!(
                "{width}x{height} exceeds the {max_dimension}px edge limit"
            )));
        }
        let pixels = width as u64 * height as u64;
        let max_pixels = self.max_pixels.min(MAX_PIXELS);
        if pixels > max_pixels {
            return Err(RasterKitError::limit_exceeded(format!(
                "{width}x{height} ({pixels} pixels) exceeds limit of {max_pixels} pixels"
            )));
        }
        Ok(())
    }

    pub fn enforce_frame_count(&self, count: usize) -> Result<(), RasterKitError> {
        if let Some(limit) = self.max_frames {
            if count > limit {
                return Err(RasterKitError::limit_exceeded(format!(
                    "container holds {count} frames, limit is {limit}"
                )));
            }
        }
        Ok(())
    }

    pub fn enforce_metadata_len(&self, len: usize) -> Result<(), RasterKitError> {
        if let Some(limit) = self.max_metadata_bytes {
            let len_u64 = len as u64;
            if len_u64 > limit {
                return Err(RasterKitError::limit_exceeded(format!(
                    "EXIF block of {len_u64} bytes exceeds limit of {limit} bytes"
                )));
            }
        }
        Ok(())
    }
}
