// src/error.rs
//
// Unified error handling for rasterkit
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Invalid input or misuse of a handle, recoverable
// - CodecError: Decode/encode/rasterizer issues
// - ResourceLimit: Dimension/byte/frame limits and file I/O
// - InternalBug: Library bugs (should not happen)

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy used by [`RasterKitError::category`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid input, recoverable by the caller
    UserError,
    /// Format/encoding/rasterizer issues
    CodecError,
    /// Size limits and file system failures
    ResourceLimit,
    /// Library bugs (should not happen)
    InternalBug,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }
}

/// rasterkit error types
///
/// Every failing operation surfaces one of these synchronously. Absent
/// optional data (missing GPS fields, missing property keys) is reported as
/// `None` by the accessors instead.
#[derive(Debug, Error)]
pub enum RasterKitError {
    // Raster/handle errors
    #[error("Invalid image: {reason}")]
    InvalidImage { reason: Cow<'static, str> },

    #[error("Unable to copy image: {reason}")]
    UnableToCopy { reason: Cow<'static, str> },

    #[error("Invalid colorspace: {reason}")]
    InvalidColorspace { reason: Cow<'static, str> },

    // Rasterizer errors
    #[error("Cannot create image: {reason}")]
    CannotCreateImage { reason: Cow<'static, str> },

    #[error("Unable to create image from drawing context")]
    UnableToCreateImageFromContext,

    #[error("Invalid drawing context {width}x{height}: {reason}")]
    InvalidContext {
        width: u32,
        height: u32,
        reason: Cow<'static, str>,
    },

    #[error("Unable to mask image: {reason}")]
    UnableToMask { reason: Cow<'static, str> },

    // Parameter errors
    #[error("Invalid compression {value}. Expected a value in 0.0..=1.0")]
    InvalidCompression { value: f64 },

    #[error("Invalid value for {name}: {value}. Expected {expected}")]
    InvalidParameters {
        name: Cow<'static, str>,
        value: f64,
        expected: Cow<'static, str>,
    },

    #[error("Invalid hex color: '{value}'")]
    InvalidHexColor { value: Cow<'static, str> },

    #[error("Invalid GPS coordinate '{value}': {reason}")]
    InvalidCoordinate {
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Encode errors
    #[error("Cannot create destination for {format}: {reason}")]
    CannotCreateDestination {
        format: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Pattern errors
    #[error("Pattern {token} was dropped before it was drawn")]
    PatternReleased { token: u64 },

    // File I/O Errors
    #[error("Failed to read file '{path}': {source}")]
    FileReadFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    // Size Limit Errors
    #[error("Decode limit exceeded: {reason}")]
    LimitExceeded { reason: Cow<'static, str> },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

// Constructor Helpers
impl RasterKitError {
    pub fn invalid_image(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidImage {
            reason: reason.into(),
        }
    }

    pub fn unable_to_copy(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::UnableToCopy {
            reason: reason.into(),
        }
    }

    pub fn invalid_colorspace(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidColorspace {
            reason: reason.into(),
        }
    }

    pub fn cannot_create_image(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::CannotCreateImage {
            reason: reason.into(),
        }
    }

    pub fn unable_to_create_image_from_context() -> Self {
        Self::UnableToCreateImageFromContext
    }

    pub fn invalid_context(width: u32, height: u32, reason: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidContext {
            width,
            height,
            reason: reason.into(),
        }
    }

    pub fn unable_to_mask(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::UnableToMask {
            reason: reason.into(),
        }
    }

    pub fn invalid_compression(value: f64) -> Self {
        Self::InvalidCompression { value }
    }

    pub fn invalid_parameters(
        name: impl Into<Cow<'static, str>>,
        value: f64,
        expected: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidParameters {
            name: name.into(),
            value,
            expected: expected.into(),
        }
    }

    pub fn invalid_hex_color(value: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidHexColor {
            value: value.into(),
        }
    }

    pub fn invalid_coordinate(
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidCoordinate {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn cannot_create_destination(
        format: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::CannotCreateDestination {
            format: format.into(),
            reason: reason.into(),
        }
    }

    pub fn pattern_released(token: u64) -> Self {
        Self::PatternReleased { token }
    }

    pub fn file_read_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn limit_exceeded(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::LimitExceeded {
            reason: reason.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (caller can fix it)
    ///
    /// Consistent with category(): UserError and ResourceLimit are
    /// recoverable, CodecError and InternalBug are not.
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit => true,
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            // UserError: Invalid input or handle misuse
            Self::InvalidImage { .. }
            | Self::UnableToCopy { .. }
            | Self::InvalidCompression { .. }
            | Self::InvalidParameters { .. }
            | Self::InvalidHexColor { .. }
            | Self::InvalidCoordinate { .. }
            | Self::PatternReleased { .. } => ErrorCategory::UserError,

            // CodecError: codec or rasterizer could not do the work
            Self::InvalidColorspace { .. }
            | Self::CannotCreateImage { .. }
            | Self::UnableToCreateImageFromContext
            | Self::InvalidContext { .. }
            | Self::UnableToMask { .. }
            | Self::CannotCreateDestination { .. } => ErrorCategory::CodecError,

            // ResourceLimit: limits and file system
            Self::LimitExceeded { .. } | Self::FileReadFailed { .. } => ErrorCategory::ResourceLimit,

            // InternalBug
            Self::InternalPanic { .. } => ErrorCategory::InternalBug,
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, RasterKitError>;
