// src/codecs/gif_frames.rs
//
// Animated GIF: frame scanning, per-frame decode and multi-frame encode.
// Frames come back composited onto the logical screen, so every frame of a
// container has the same size.

use crate::engine::common::run_with_panic_policy;
use crate::engine::firewall::DecodeLimits;
use crate::engine::raster::Raster;
use crate::error::{RasterKitError, Result};
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::{AnimationDecoder, Delay, DynamicImage, Frame, ImageDecoder, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// What a scan learns about a frame without keeping its pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GifFrameInfo {
    pub width: u32,
    pub height: u32,
    /// Delay as stored in the file, in seconds
    pub delay: f64,
}

/// One frame to encode.
#[derive(Clone, Copy, Debug)]
pub struct GifFrameInput<'a> {
    pub raster: &'a Raster,
    /// Seconds
    pub delay: f64,
}

fn decoder(bytes: &[u8]) -> Result<GifDecoder<Cursor<&[u8]>>> {
    GifDecoder::new(Cursor::new(bytes))
        .map_err(|e| RasterKitError::invalid_image(format!("gif: {e}")))
}

fn delay_seconds(delay: Delay) -> f64 {
    let (numer, denom) = delay.numer_denom_ms();
    if denom == 0 {
        return 0.0;
    }
    numer as f64 / denom as f64 / 1000.0
}

/// Walks every frame once to count them and read their delays.
pub fn scan_gif(bytes: &[u8], limits: &DecodeLimits) -> Result<Vec<GifFrameInfo>> {
    run_with_panic_policy("decode:gif:scan", || {
        let decoder = decoder(bytes)?;
        let (width, height) = decoder.dimensions();
        limits.enforce_dimensions(width, height)?;

        let mut infos = Vec::new();
        for frame in decoder.into_frames() {
            let frame =
                frame.map_err(|e| RasterKitError::invalid_image(format!("gif frame: {e}")))?;
            limits.enforce_frame_count(infos.len() + 1)?;
            let (w, h) = frame.buffer().dimensions();
            infos.push(GifFrameInfo {
                width: w,
                height: h,
                delay: delay_seconds(frame.delay()),
            });
        }
        if infos.is_empty() {
            return Err(RasterKitError::invalid_image("gif contains no frames"));
        }
        debug!(target: "rasterkit::decode", frames = infos.len(), width, height, "scanned gif");
        Ok(infos)
    })
}

/// Decodes every frame (composited) in one pass. Each frame depends on the
/// canvas left by the previous ones, so there is no cheaper random access.
pub fn decode_gif_frames(bytes: &[u8]) -> Result<Vec<Raster>> {
    run_with_panic_policy("decode:gif:frames", || {
        decoder(bytes)?
            .into_frames()
            .enumerate()
            .map(|(index, frame)| {
                let frame = frame
                    .map_err(|e| RasterKitError::invalid_image(format!("gif frame {index}: {e}")))?;
                Raster::from_dynamic_image(&DynamicImage::ImageRgba8(frame.into_buffer()))
            })
            .collect()
    })
}

/// Encodes `frames` as a looping animation. Frames smaller than the largest
/// one are anchored at the top-left of a transparent canvas.
pub fn encode_gif(frames: &[GifFrameInput<'_>], loop_count: Option<u32>) -> Result<Vec<u8>> {
    let canvas_w = frames.iter().map(|f| f.raster.width()).max().unwrap_or(0);
    let canvas_h = frames.iter().map(|f| f.raster.height()).max().unwrap_or(0);
    if canvas_w == 0 || canvas_h == 0 {
        return Err(RasterKitError::cannot_create_destination(
            "gif",
            "no frames to encode",
        ));
    }

    let mut encoded = Vec::with_capacity(frames.len());
    for input in frames {
        let rgba = input.raster.to_dynamic_image()?.to_rgba8();
        let buffer = if rgba.dimensions() == (canvas_w, canvas_h) {
            rgba
        } else {
            let mut canvas = RgbaImage::new(canvas_w, canvas_h);
            image::imageops::replace(&mut canvas, &rgba, 0, 0);
            canvas
        };
        let millis = (input.delay.max(0.0) * 1000.0).round() as u32;
        encoded.push(Frame::from_parts(
            buffer,
            0,
            0,
            Delay::from_numer_denom_ms(millis, 1),
        ));
    }

    run_with_panic_policy("encode:gif", || {
        let mut buf = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut buf);
            let repeat = match loop_count {
                None | Some(0) => Repeat::Infinite,
                Some(n) => Repeat::Finite(n.min(u16::MAX as u32) as u16),
            };
            encoder
                .set_repeat(repeat)
                .map_err(|e| RasterKitError::cannot_create_destination("gif", e.to_string()))?;
            encoder
                .encode_frames(encoded)
                .map_err(|e| RasterKitError::cannot_create_destination("gif", e.to_string()))?;
        }
        Ok(buf)
    })
}
