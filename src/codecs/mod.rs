// src/codecs/mod.rs
//
// Multi-frame codecs that image-rs does not cover on its own.

pub mod gif_frames;
pub mod tiff_pages;
