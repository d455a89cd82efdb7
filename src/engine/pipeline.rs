// src/engine/pipeline.rs
//
// Pipeline operations: every transformation takes an immutable raster and
// returns a new one. Geometry goes through the drawing context; pixel-exact
// operations (crop, orientation, grayscale, colour conversion) remap the
// buffer directly.

use crate::color::Color;
use crate::engine::context::{shapes, DrawingContext};
use crate::engine::raster::{
    demultiply, premultiply, rgb_to_cmyk, AlphaInfo, ColorModel, Raster,
};
use crate::error::{RasterKitError, Result};
use crate::metadata::Orientation;
use crate::ops::{ColorspaceTarget, FlipType, Operation, Rect, ScalingType, Size};
use std::borrow::Cow;
use tiny_skia::{BlendMode, FilterQuality, Path, Point as SkPoint};
use tracing::debug;

/// Rotated bounds that land a hair under a whole pixel still count as it.
const SIZE_EPSILON: f32 = 1e-3;

/// Rec. 709 luma weights.
const LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];

// =============================================================================
// Geometry helpers
// =============================================================================

/// Where a `source`-sized image is drawn inside `target` for `scaling`.
///
/// AspectFit never exceeds `target` on either axis; AspectFill always covers
/// it. Both are centred.
pub fn aspect_rect(source: Size, target: Size, scaling: ScalingType) -> Rect {
    let (sw, sh) = (source.width, source.height);
    let (tw, th) = (target.width, target.height);
    let (dw, dh) = match scaling {
        ScalingType::AxesIndependent => return Rect::from_size(target),
        ScalingType::AspectFit => {
            let (mut dw, mut dh) = if sw > sh {
                (tw, sh * tw / sw)
            } else {
                (sw * th / sh, th)
            };
            if dw > tw {
                dw = tw;
                dh = sh * tw / sw;
            }
            if dh > th {
                dh = th;
                dw = sw * th / sh;
            }
            (dw, dh)
        }
        ScalingType::AspectFill => {
            let (wr, hr) = (tw / sw, th / sh);
            if hr > wr {
                (sw * th / sh, th)
            } else {
                (tw, sh * tw / sw)
            }
        }
    };
    Rect::new((tw - dw) / 2.0, (th - dh) / 2.0, dw, dh)
}

/// Output size of `rotate_by`.
pub fn rotated_size(width: u32, height: u32, radians: f32) -> Size {
    let bounds = Rect::new(0.0, 0.0, width as f32, height as f32).rotated_bounds(radians);
    Size::new(bounds.width + SIZE_EPSILON, bounds.height + SIZE_EPSILON)
}

/// Draws `raster` at 1:1 into the context's bounds.
fn draw_source(ctx: &mut DrawingContext, raster: &Raster) -> Result<()> {
    ctx.saving_state(|ctx| {
        ctx.set_interpolation(FilterQuality::Nearest);
        ctx.draw_image(raster, raster.rect())
    })
}

fn same_size<F>(raster: &Raster, draw: F) -> Result<Raster>
where
    F: FnOnce(&mut DrawingContext, Size) -> Result<()>,
{
    DrawingContext::create_image(raster.size(), None, draw)
}

fn check_range(name: &'static str, value: f32, min: f32, max: f32) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(RasterKitError::invalid_parameters(
            name,
            value as f64,
            format!("a value in {min}..={max}"),
        ))
    }
}

// =============================================================================
// Geometry
// =============================================================================

/// Copies the pixels inside `rect`. The rect is expanded to whole pixels and
/// intersected with the raster; nothing left means `CannotCreateImage`.
pub fn crop(raster: &Raster, rect: Rect) -> Result<Raster> {
    let x0 = rect.x.floor().max(0.0);
    let y0 = rect.y.floor().max(0.0);
    let x1 = rect.max_x().ceil().min(raster.width() as f32);
    let y1 = rect.max_y().ceil().min(raster.height() as f32);
    if !(x1 > x0 && y1 > y0) {
        return Err(RasterKitError::cannot_create_image(format!(
            "crop rect {rect:?} does not intersect a {}x{} image",
            raster.width(),
            raster.height()
        )));
    }
    let (x0, y0, x1, y1) = (x0 as usize, y0 as usize, x1 as usize, y1 as usize);
    let channels = raster.channels();
    let stride = raster.stride();
    let mut data = Vec::with_capacity((x1 - x0) * (y1 - y0) * channels);
    for row in raster.data().chunks(stride).skip(y0).take(y1 - y0) {
        data.extend_from_slice(&row[x0 * channels..x1 * channels]);
    }
    Raster::from_packed(
        (x1 - x0) as u32,
        (y1 - y0) as u32,
        raster.color_model(),
        raster.alpha_info(),
        data,
    )
}

/// Rotates around the centre; positive angles turn clockwise. The output is
/// the bounding box of the rotated image.
pub fn rotate_by(raster: &Raster, radians: f32) -> Result<Raster> {
    if !radians.is_finite() {
        return Err(RasterKitError::invalid_parameters(
            "radians",
            radians as f64,
            "a finite angle",
        ));
    }
    let size = rotated_size(raster.width(), raster.height(), radians);
    let (w, h) = (raster.width() as f32, raster.height() as f32);
    DrawingContext::create_image(size, None, |ctx, size| {
        ctx.translate_by(size.width / 2.0, size.height / 2.0);
        ctx.rotate_by(radians);
        ctx.draw_image(raster, Rect::new(-w / 2.0, -h / 2.0, w, h))
    })
}

/// Undoes `orientation`, producing an upright raster in the same colour
/// model. `Up` returns an unmodified copy.
pub fn rotate_to(raster: &Raster, orientation: Orientation) -> Result<Raster> {
    if orientation == Orientation::Up {
        return Ok(raster.clone());
    }
    let (w, h) = raster.dimensions();
    let (out_w, out_h) = orientation.oriented_size(w, h);
    let inverse = orientation
        .transform()
        .to_transform(w as f32, h as f32)
        .invert()
        .ok_or_else(|| RasterKitError::cannot_create_image("orientation transform is singular"))?;

    let channels = raster.channels();
    let mut data = Vec::with_capacity(out_w as usize * out_h as usize * channels);
    for y in 0..out_h {
        for x in 0..out_w {
            let mut p = [SkPoint::from_xy(x as f32 + 0.5, y as f32 + 0.5)];
            inverse.map_points(&mut p);
            let sx = (p[0].x.floor().max(0.0) as u32).min(w - 1);
            let sy = (p[0].y.floor().max(0.0) as u32).min(h - 1);
            let px = raster
                .pixel(sx, sy)
                .ok_or_else(|| RasterKitError::cannot_create_image("orientation remap out of bounds"))?;
            data.extend_from_slice(px);
        }
    }
    Raster::from_packed(out_w, out_h, raster.color_model(), raster.alpha_info(), data)
}

/// Alias of [`rotate_to`] under its metadata name.
pub fn remove_orientation(raster: &Raster, orientation: Orientation) -> Result<Raster> {
    rotate_to(raster, orientation)
}

pub fn scale(raster: &Raster, scaling: ScalingType, size: Size) -> Result<Raster> {
    let target = aspect_rect(raster.size(), size, scaling);
    DrawingContext::create_image(size, None, |ctx, _| ctx.draw_image(raster, target))
}

/// Scales both axes by `factor` (aspect fill into the scaled size).
pub fn scale_by(raster: &Raster, factor: f32) -> Result<Raster> {
    if !(factor.is_finite() && factor > 0.0) {
        return Err(RasterKitError::invalid_parameters(
            "factor",
            factor as f64,
            "a finite value greater than 0",
        ));
    }
    scale(raster, ScalingType::AspectFill, raster.size().scaled(factor))
}

pub fn flip(raster: &Raster, flip: FlipType) -> Result<Raster> {
    same_size(raster, |ctx, size| {
        let (sx, sy) = match flip {
            FlipType::Horizontally => (1.0, -1.0),
            FlipType::Vertically => (-1.0, 1.0),
            FlipType::Both => (-1.0, -1.0),
        };
        ctx.scale_by(sx, sy);
        ctx.translate_by(
            if sx < 0.0 { -size.width } else { 0.0 },
            if sy < 0.0 { -size.height } else { 0.0 },
        );
        draw_source(ctx, raster)
    })
}

// =============================================================================
// Drawing
// =============================================================================

/// Draws the source, then hands the context to `draw`.
pub fn draw<F>(raster: &Raster, draw: F) -> Result<Raster>
where
    F: FnOnce(&mut DrawingContext, Size) -> Result<()>,
{
    same_size(raster, |ctx, size| {
        draw_source(ctx, raster)?;
        ctx.saving_state(|ctx| draw(ctx, size))
    })
}

/// Strokes a border of `line_width` just inside the edges.
pub fn border(raster: &Raster, color: Color, line_width: f32) -> Result<Raster> {
    draw(raster, |ctx, size| {
        ctx.set_stroke_color(color);
        ctx.set_line_width(line_width);
        ctx.stroke_rect(Rect::from_size(size).inset_by(line_width / 2.0, line_width / 2.0))
    })
}

/// Keeps the parts of the source inside `path`.
pub fn clip_to_path(raster: &Raster, path: &Path) -> Result<Raster> {
    same_size(raster, |ctx, _| {
        ctx.clip_to_path(path)?;
        draw_source(ctx, raster)
    })
}

/// Runs `draw` on a blank raster of the same size, clips the result to
/// `path` and draws it over the source.
pub fn apply_with_clip<F>(raster: &Raster, path: &Path, draw: F) -> Result<Raster>
where
    F: FnOnce(Raster) -> Result<Raster>,
{
    let blank = same_size(raster, |_, _| Ok(()))?;
    let content = clip_to_path(&draw(blank)?, path)?;
    composite(raster, &content, None, None)
}

pub fn fill_path(raster: &Raster, color: Color, path: &Path) -> Result<Raster> {
    draw(raster, |ctx, _| {
        ctx.set_fill_color(color);
        ctx.fill_path(path)
    })
}

pub fn stroke_path(raster: &Raster, color: Color, line_width: f32, path: &Path) -> Result<Raster> {
    draw(raster, |ctx, _| {
        ctx.set_stroke_color(color);
        ctx.set_line_width(line_width);
        ctx.stroke_path(path)
    })
}

/// Fills then strokes `path`.
pub fn fill_stroke_path(
    raster: &Raster,
    fill: Color,
    stroke: Color,
    line_width: f32,
    path: &Path,
) -> Result<Raster> {
    draw(raster, |ctx, _| {
        ctx.set_fill_color(fill);
        ctx.fill_path(path)?;
        ctx.set_stroke_color(stroke);
        ctx.set_line_width(line_width);
        ctx.stroke_path(path)
    })
}

/// [`fill_stroke_path`] with hex colours.
pub fn fill_stroke_path_hex(
    raster: &Raster,
    fill: &str,
    stroke: &str,
    line_width: f32,
    path: &Path,
) -> Result<Raster> {
    let fill = Color::hex(fill)?;
    let stroke = Color::hex(stroke)?;
    fill_stroke_path(raster, fill, stroke, line_width, path)
}

/// Draws `overlay` into `rect` (the whole base when `None` or zero) over
/// `base`, optionally clipped to `clip`.
pub fn composite(base: &Raster, overlay: &Raster, rect: Option<Rect>, clip: Option<&Path>) -> Result<Raster> {
    same_size(base, |ctx, size| {
        draw_source(ctx, base)?;
        ctx.saving_state(|ctx| {
            if let Some(path) = clip {
                ctx.clip_to_path(path)?;
            }
            let target = rect.filter(|r| !r.is_zero()).unwrap_or(Rect::from_size(size));
            if target.size() == overlay.size() {
                ctx.set_interpolation(FilterQuality::Nearest);
            }
            ctx.draw_image(overlay, target)
        })
    })
}

/// Removes the parts of `base` where `mask` is transparent. The mask is
/// stretched over the base.
pub fn mask(base: &Raster, mask: &Raster) -> Result<Raster> {
    let soft = same_size(base, |ctx, size| {
        ctx.set_interpolation(FilterQuality::Bilinear);
        ctx.clip_to_mask(Rect::from_size(size), mask)?;
        draw_source(ctx, base)
    })
    .map_err(|e| match e {
        RasterKitError::InvalidContext { .. } => RasterKitError::unable_to_mask(e.to_string()),
        other => other,
    })?;

    // Hard pass: nearest-sampled mask pixels with zero alpha clear the output,
    // removing filtered edge bleed.
    let (w, h) = soft.dimensions();
    let (mw, mh) = mask.dimensions();
    let mut data = soft.into_data();
    for y in 0..h {
        let my = ((y as u64 * mh as u64) / h as u64) as u32;
        for x in 0..w {
            let mx = ((x as u64 * mw as u64) / w as u64) as u32;
            let transparent = mask.rgba_at(mx, my).map_or(true, |px| px[3] == 0);
            if transparent {
                let at = (y as usize * w as usize + x as usize) * 4;
                data[at..at + 4].fill(0);
            }
        }
    }
    Raster::from_packed(w, h, ColorModel::Rgb, AlphaInfo::Premultiplied, data)
        .map_err(|e| RasterKitError::unable_to_mask(e.to_string()))
}

// =============================================================================
// Colour
// =============================================================================

/// Replaces hue and saturation with `color`, keeping the source luminosity.
/// Transparent areas become opaque unless `keeping_alpha`.
pub fn tint(raster: &Raster, color: Color, keeping_alpha: bool) -> Result<Raster> {
    same_size(raster, |ctx, size| {
        let bounds = Rect::from_size(size);
        ctx.set_fill_color(Color::BLACK);
        ctx.fill_rect(bounds)?;
        draw_source(ctx, raster)?;

        ctx.set_blend_mode(BlendMode::Color);
        ctx.set_fill_color(color);
        ctx.fill_rect(bounds)?;

        if keeping_alpha {
            ctx.set_blend_mode(BlendMode::DestinationIn);
            draw_source(ctx, raster)?;
        }
        Ok(())
    })
}

/// Single-channel gray. Without alpha, transparent areas become black.
pub fn grayscale(raster: &Raster, keeping_alpha: bool) -> Result<Raster> {
    let (w, h) = raster.dimensions();
    let channels = if keeping_alpha { 2 } else { 1 };
    let mut data = Vec::with_capacity(w as usize * h as usize * channels);
    for y in 0..h {
        for x in 0..w {
            let [r, g, b, a] = raster
                .rgba_at(x, y)
                .ok_or_else(|| RasterKitError::cannot_create_image("pixel out of range"))?;
            let luma = LUMA[0] * r as f32 + LUMA[1] * g as f32 + LUMA[2] * b as f32;
            let gray = premultiply(luma.round().clamp(0.0, 255.0) as u8, a);
            data.push(gray);
            if keeping_alpha {
                data.push(a);
            }
        }
    }
    let alpha = if keeping_alpha {
        AlphaInfo::Premultiplied
    } else {
        AlphaInfo::None
    };
    Raster::from_packed(w, h, ColorModel::Gray, alpha, data)
}

/// Redraws the source at `value` opacity.
pub fn alpha(raster: &Raster, value: f32) -> Result<Raster> {
    check_range("alpha", value, 0.0, 1.0)?;
    same_size(raster, |ctx, _| {
        ctx.set_alpha(value);
        draw_source(ctx, raster)
    })
}

/// CMYK output has no alpha: transparent areas become white (no ink).
pub fn convert_colorspace(raster: &Raster, target: ColorspaceTarget) -> Result<Raster> {
    let (w, h) = raster.dimensions();
    match target {
        ColorspaceTarget::Rgba => same_size(raster, |ctx, _| draw_source(ctx, raster)),
        ColorspaceTarget::Cmyk => {
            let mut data = Vec::with_capacity(w as usize * h as usize * 4);
            for y in 0..h {
                for x in 0..w {
                    let [r, g, b, a] = raster
                        .rgba_at(x, y)
                        .ok_or_else(|| RasterKitError::cannot_create_image("pixel out of range"))?;
                    let over_white = |c: u8| premultiply(c, a) + (255 - a);
                    data.extend_from_slice(&rgb_to_cmyk(over_white(r), over_white(g), over_white(b)));
                }
            }
            Raster::from_packed(w, h, ColorModel::Cmyk, AlphaInfo::None, data)
        }
    }
}

/// Saturation, brightness and contrast in the CIColorControls manner:
/// saturation mixes toward luma, brightness offsets, contrast scales around
/// mid-gray. Alpha is kept.
pub fn adjust_colors(raster: &Raster, saturation: f32, brightness: f32, contrast: f32) -> Result<Raster> {
    check_range("saturation", saturation, 0.0, 2.0)?;
    check_range("brightness", brightness, -1.0, 1.0)?;
    check_range("contrast", contrast, 0.25, 4.0)?;

    let mut pixmap = raster.to_pixmap()?;
    for px in pixmap.data_mut().chunks_exact_mut(4) {
        let a = px[3];
        if a == 0 {
            continue;
        }
        let rgb = [0, 1, 2].map(|i| demultiply(px[i], a) as f32 / 255.0);
        let luma = LUMA[0] * rgb[0] + LUMA[1] * rgb[1] + LUMA[2] * rgb[2];
        for (i, c) in rgb.into_iter().enumerate() {
            let c = luma + (c - luma) * saturation;
            let c = c + brightness;
            let c = (c - 0.5) * contrast + 0.5;
            let straight = (c.clamp(0.0, 1.0) * 255.0).round() as u8;
            px[i] = premultiply(straight, a);
        }
    }
    Raster::from_pixmap(pixmap)
}

// =============================================================================
// Operation queue
// =============================================================================

pub fn apply_op(raster: &Raster, op: &Operation) -> Result<Raster> {
    match op {
        Operation::Crop { rect } => crop(raster, *rect),
        Operation::RotateBy { radians } => rotate_by(raster, *radians),
        Operation::RotateTo { orientation } => rotate_to(raster, *orientation),
        Operation::Scale { scaling, size } => scale(raster, *scaling, *size),
        Operation::ScaleBy { factor } => scale_by(raster, *factor),
        Operation::Flip { flip: f } => flip(raster, *f),
        Operation::Border { color, line_width } => border(raster, *color, *line_width),
        Operation::Tint {
            color,
            keeping_alpha,
        } => tint(raster, *color, *keeping_alpha),
        Operation::Grayscale { keeping_alpha } => grayscale(raster, *keeping_alpha),
        Operation::Alpha { value } => alpha(raster, *value),
        Operation::ConvertColorspace { target } => convert_colorspace(raster, *target),
        Operation::AdjustColors {
            saturation,
            brightness,
            contrast,
        } => adjust_colors(raster, *saturation, *brightness, *contrast),
    }
}

/// Applies `ops` in order. With no operations the input is returned
/// borrowed; otherwise each step consumes the previous output.
pub fn apply_ops<'a>(raster: Cow<'a, Raster>, ops: &[Operation]) -> Result<Cow<'a, Raster>> {
    if ops.is_empty() {
        return Ok(raster);
    }
    let mut current = raster.into_owned();
    for op in ops {
        current = apply_op(&current, op)?;
        debug!(
            target: "rasterkit::pipeline",
            ?op,
            width = current.width(),
            height = current.height(),
            "applied operation"
        );
    }
    Ok(Cow::Owned(current))
}

/// Builds the path for a rectangle, for callers without a path builder.
pub fn rect_path(rect: Rect) -> Result<Path> {
    shapes::rect(rect).ok_or_else(|| {
        RasterKitError::invalid_parameters("rect", rect.width.min(rect.height) as f64, "a non-empty rect")
    })
}
