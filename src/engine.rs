// src/engine.rs
//
// The core of rasterkit. Pure raster transformations over a scoped drawing
// context:
// 1. Rasters are immutable; every operation returns a new one
// 2. Drawing state is saved and restored around every callback
// 3. Codecs run under a panic policy and decode limits
//
// This file is a facade over the modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Larger images are rejected to prevent decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

pub(crate) mod common;
pub mod context;
pub mod decoder;
pub mod encoder;
pub mod firewall;
pub mod handle;
pub mod io;
pub mod pipeline;
pub mod raster;

pub use context::{shapes, DrawingContext, FillStyle, StateGuard};
pub use decoder::{check_dimensions, decode_image, decode_raster, detect_format};
pub use encoder::{encode_frames, encode_raster, EncodeOptions, FrameInput, DEFAULT_JPEG_QUALITY};
pub use firewall::{DecodeLimits, LimitPolicy};
pub use handle::RasterHandle;
pub use io::{extract_properties, Source};
pub use pipeline::{apply_op, apply_ops, aspect_rect, rotated_size};
pub use raster::{AlphaInfo, ColorModel, Raster};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RasterKitError;
    use crate::ops::{ImageType, Operation, Size};
    use std::borrow::Cow;

    mod limit_tests {
        use super::*;

        #[test]
        fn check_dimensions_accepts_the_edge() {
            assert!(check_dimensions(MAX_DIMENSION, 1).is_ok());
            assert!(check_dimensions(1, 1).is_ok());
        }

        #[test]
        fn check_dimensions_rejects_oversize() {
            assert!(check_dimensions(MAX_DIMENSION + 1, 1).is_err());
            assert!(check_dimensions(20_000, 20_000).is_err());
        }

        #[test]
        fn context_and_decoder_share_limits() {
            let err = DrawingContext::new(Size::new(20_000.0, 20_000.0));
            assert!(matches!(err, Err(RasterKitError::InvalidContext { .. })));
        }
    }

    mod facade_tests {
        use super::*;

        #[test]
        fn encode_decode_through_the_facade() {
            let raster = Raster::filled(6, 5, [0, 128, 255, 255]).unwrap();
            let png = encode_raster(&raster, ImageType::Png, &EncodeOptions::new()).unwrap();
            assert_eq!(detect_format(&png), Some(ImageType::Png));
            let back = decode_raster(&png).unwrap();
            assert_eq!(back.dimensions(), (6, 5));
            assert_eq!(back.rgba_at(3, 3), Some([0, 128, 255, 255]));
        }

        #[test]
        fn queued_ops_run_through_the_handle_and_the_facade_alike() {
            let raster = Raster::filled(10, 10, [255, 0, 0, 255]).unwrap();
            let ops = [Operation::ScaleBy { factor: 0.5 }, Operation::Grayscale { keeping_alpha: false }];
            let direct = apply_ops(Cow::Borrowed(&raster), &ops).unwrap().into_owned();
            let handled = RasterHandle::new(raster).apply(&ops).unwrap();
            assert_eq!(handled.raster().unwrap(), &direct);
            assert_eq!(direct.color_model(), ColorModel::Gray);
        }
    }
}
