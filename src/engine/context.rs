// src/engine/context.rs
//
// Offscreen drawing context over a tiny-skia pixmap.
//
// The context keeps a graphics-state stack (transform, clip, alpha, blend
// mode, paints, line width). `save()` hands out a guard that restores the
// state when dropped, so a callback that returns early, fails or unwinds
// cannot leak transform or clip state into the next drawing call.

use crate::color::Color;
use crate::engine::raster::Raster;
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::{RasterKitError, Result};
use crate::ops::{Rect, Size};
use crate::pattern::PatternFill;
use std::ops::{Deref, DerefMut};
use tiny_skia::{
    BlendMode, FillRule, FilterQuality, Mask, MaskType, Paint, Path, PathBuilder, Pixmap,
    PixmapPaint, Shader, Stroke, Transform,
};

/// What a fill or stroke paints with.
#[derive(Clone, Debug)]
pub enum FillStyle {
    Solid(Color),
    Pattern(PatternFill),
}

#[derive(Clone, Debug)]
struct GraphicsState {
    transform: Transform,
    clip: Option<Mask>,
    alpha: f32,
    blend_mode: BlendMode,
    fill: FillStyle,
    stroke: Color,
    line_width: f32,
    anti_alias: bool,
    interpolation: FilterQuality,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            transform: Transform::identity(),
            clip: None,
            alpha: 1.0,
            blend_mode: BlendMode::SourceOver,
            fill: FillStyle::Solid(Color::BLACK),
            stroke: Color::BLACK,
            line_width: 1.0,
            anti_alias: true,
            interpolation: FilterQuality::Bicubic,
        }
    }
}

/// A premultiplied sRGB RGBA drawing surface with a top-left origin.
pub struct DrawingContext {
    pixmap: Pixmap,
    state: GraphicsState,
    saved: Vec<GraphicsState>,
}

impl DrawingContext {
    /// Allocates a transparent surface of `size`, truncated to whole pixels.
    pub fn new(size: Size) -> Result<Self> {
        let (width, height) = size.to_pixels().ok_or_else(|| {
            RasterKitError::invalid_context(
                size.width.max(0.0) as u32,
                size.height.max(0.0) as u32,
                "size must be at least one pixel on each side",
            )
        })?;
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(RasterKitError::invalid_context(
                width,
                height,
                format!("dimensions exceed {MAX_DIMENSION}"),
            ));
        }
        if width as u64 * height as u64 > MAX_PIXELS {
            return Err(RasterKitError::invalid_context(
                width,
                height,
                format!("pixel count exceeds {MAX_PIXELS}"),
            ));
        }
        let pixmap = Pixmap::new(width, height).ok_or_else(|| {
            RasterKitError::invalid_context(width, height, "rasterizer could not allocate")
        })?;
        Ok(Self {
            pixmap,
            state: GraphicsState::default(),
            saved: Vec::new(),
        })
    }

    /// Allocate, optionally flood-fill, run `draw`, snapshot.
    ///
    /// The background fill and the callback each run inside their own saved
    /// state.
    pub fn create_image<F>(size: Size, background: Option<Color>, draw: F) -> Result<Raster>
    where
        F: FnOnce(&mut DrawingContext, Size) -> Result<()>,
    {
        let mut ctx = DrawingContext::new(size)?;
        let size = ctx.size();
        if let Some(color) = background {
            ctx.saving_state(|ctx| {
                ctx.set_fill_color(color);
                ctx.fill_rect(Rect::from_size(size))
            })?;
        }
        ctx.saving_state(|ctx| draw(ctx, size))?;
        ctx.make_image()
    }

    pub fn size(&self) -> Size {
        Size::from_pixels(self.pixmap.width(), self.pixmap.height())
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.size())
    }

    // =========================================================================
    // State stack
    // =========================================================================

    /// Push the current graphics state. The returned guard pops it on drop.
    pub fn save(&mut self) -> StateGuard<'_> {
        let depth = self.saved.len();
        self.saved.push(self.state.clone());
        StateGuard { ctx: self, depth }
    }

    /// Run `body` with the state saved beforehand and restored afterwards.
    pub fn saving_state<R>(&mut self, body: impl FnOnce(&mut DrawingContext) -> R) -> R {
        let mut guard = self.save();
        body(&mut guard)
    }

    pub fn state_depth(&self) -> usize {
        self.saved.len()
    }

    fn restore_to(&mut self, depth: usize) {
        if depth < self.saved.len() {
            self.saved.truncate(depth + 1);
            if let Some(state) = self.saved.pop() {
                self.state = state;
            }
        }
    }

    // =========================================================================
    // Transform
    // =========================================================================

    pub fn translate_by(&mut self, dx: f32, dy: f32) {
        self.state.transform = self.state.transform.pre_translate(dx, dy);
    }

    pub fn scale_by(&mut self, sx: f32, sy: f32) {
        self.state.transform = self.state.transform.pre_scale(sx, sy);
    }

    /// Positive angles turn clockwise on screen.
    pub fn rotate_by(&mut self, radians: f32) {
        self.state.transform = self.state.transform.pre_concat(Transform::from_rotate(radians.to_degrees()));
    }

    pub fn concat(&mut self, transform: Transform) {
        self.state.transform = self.state.transform.pre_concat(transform);
    }

    pub fn transform(&self) -> Transform {
        self.state.transform
    }

    // =========================================================================
    // Paint state
    // =========================================================================

    pub fn set_alpha(&mut self, alpha: f32) {
        self.state.alpha = alpha.clamp(0.0, 1.0);
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.state.blend_mode = mode;
    }

    pub fn set_fill_color(&mut self, color: Color) {
        self.state.fill = FillStyle::Solid(color);
    }

    pub fn set_fill_pattern(&mut self, pattern: PatternFill) {
        self.state.fill = FillStyle::Pattern(pattern);
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        self.state.stroke = color;
    }

    pub fn set_line_width(&mut self, width: f32) {
        self.state.line_width = width;
    }

    pub fn set_anti_alias(&mut self, anti_alias: bool) {
        self.state.anti_alias = anti_alias;
    }

    pub fn set_interpolation(&mut self, quality: FilterQuality) {
        self.state.interpolation = quality;
    }

    // =========================================================================
    // Clipping
    // =========================================================================

    /// Intersect the clip with `path` under the current transform.
    pub fn clip_to_path(&mut self, path: &Path) -> Result<()> {
        let transform = self.state.transform;
        let anti_alias = self.state.anti_alias;
        match self.state.clip.as_mut() {
            Some(mask) => mask.intersect_path(path, FillRule::Winding, anti_alias, transform),
            None => {
                let mut mask = self.empty_mask()?;
                mask.fill_path(path, FillRule::Winding, anti_alias, transform);
                self.state.clip = Some(mask);
            }
        }
        Ok(())
    }

    pub fn clip_to_rect(&mut self, rect: Rect) -> Result<()> {
        match rect.to_skia() {
            Some(r) => self.clip_to_path(&PathBuilder::from_rect(r)),
            // Clipping to an empty rect leaves nothing drawable.
            None => {
                self.state.clip = Some(self.empty_mask()?);
                Ok(())
            }
        }
    }

    /// Intersect the clip with the alpha of `mask` drawn into `rect`.
    pub fn clip_to_mask(&mut self, rect: Rect, mask: &Raster) -> Result<()> {
        let source = mask.to_pixmap()?;
        let mut layer = Pixmap::new(self.pixmap.width(), self.pixmap.height())
            .ok_or_else(|| RasterKitError::unable_to_mask("could not allocate mask layer"))?;
        let transform = self
            .state
            .transform
            .pre_concat(rect_transform(mask.width(), mask.height(), rect));
        layer.draw_pixmap(
            0,
            0,
            source.as_ref(),
            &PixmapPaint {
                quality: self.state.interpolation,
                ..PixmapPaint::default()
            },
            transform,
            None,
        );
        let incoming = Mask::from_pixmap(layer.as_ref(), MaskType::Alpha);
        let combined = match self.state.clip.take() {
            Some(current) => multiply_masks(&current, &incoming)?,
            None => incoming,
        };
        self.state.clip = Some(combined);
        Ok(())
    }

    fn empty_mask(&self) -> Result<Mask> {
        Mask::new(self.pixmap.width(), self.pixmap.height()).ok_or_else(|| {
            RasterKitError::invalid_context(
                self.pixmap.width(),
                self.pixmap.height(),
                "could not allocate clip mask",
            )
        })
    }

    // =========================================================================
    // Drawing
    // =========================================================================

    pub fn fill_rect(&mut self, rect: Rect) -> Result<()> {
        match rect.to_skia() {
            Some(r) => self.fill_path(&PathBuilder::from_rect(r)),
            None => Ok(()),
        }
    }

    pub fn fill_path(&mut self, path: &Path) -> Result<()> {
        let tile;
        let shader = match &self.state.fill {
            FillStyle::Solid(color) => Shader::SolidColor(color.with_alpha(color.a * self.state.alpha).to_skia()),
            FillStyle::Pattern(fill) => {
                tile = fill.render_tile()?;
                fill.shader(&tile, self.state.alpha)
            }
        };
        let paint = Paint {
            shader,
            blend_mode: self.state.blend_mode,
            anti_alias: self.state.anti_alias,
            ..Paint::default()
        };
        self.pixmap.fill_path(
            path,
            &paint,
            FillRule::Winding,
            self.state.transform,
            self.state.clip.as_ref(),
        );
        Ok(())
    }

    pub fn stroke_rect(&mut self, rect: Rect) -> Result<()> {
        match rect.to_skia() {
            Some(r) => self.stroke_path(&PathBuilder::from_rect(r)),
            None => Ok(()),
        }
    }

    pub fn stroke_path(&mut self, path: &Path) -> Result<()> {
        if !(self.state.line_width > 0.0) {
            return Ok(());
        }
        let color = self.state.stroke;
        let paint = Paint {
            shader: Shader::SolidColor(color.with_alpha(color.a * self.state.alpha).to_skia()),
            blend_mode: self.state.blend_mode,
            anti_alias: self.state.anti_alias,
            ..Paint::default()
        };
        let stroke = Stroke {
            width: self.state.line_width,
            ..Stroke::default()
        };
        self.pixmap.stroke_path(
            path,
            &paint,
            &stroke,
            self.state.transform,
            self.state.clip.as_ref(),
        );
        Ok(())
    }

    /// Draw `raster` scaled into `rect` under the current state.
    pub fn draw_image(&mut self, raster: &Raster, rect: Rect) -> Result<()> {
        if rect.is_empty() {
            return Ok(());
        }
        let source = raster.to_pixmap()?;
        self.draw_pixmap(&source, rect)
    }

    pub(crate) fn draw_pixmap(&mut self, source: &Pixmap, rect: Rect) -> Result<()> {
        let transform = self
            .state
            .transform
            .pre_concat(rect_transform(source.width(), source.height(), rect));
        let paint = PixmapPaint {
            opacity: self.state.alpha,
            blend_mode: self.state.blend_mode,
            quality: self.state.interpolation,
        };
        self.pixmap
            .draw_pixmap(0, 0, source.as_ref(), &paint, transform, self.state.clip.as_ref());
        Ok(())
    }

    /// Snapshot the surface into a new raster; the context stays usable.
    pub fn make_image(&self) -> Result<Raster> {
        Raster::from_pixmap(self.pixmap.clone())
            .map_err(|_| RasterKitError::unable_to_create_image_from_context())
    }

    pub(crate) fn into_pixmap(self) -> Pixmap {
        self.pixmap
    }
}

/// Restores the graphics state captured by [`DrawingContext::save`] on drop.
pub struct StateGuard<'a> {
    ctx: &'a mut DrawingContext,
    depth: usize,
}

impl Deref for StateGuard<'_> {
    type Target = DrawingContext;

    fn deref(&self) -> &DrawingContext {
        self.ctx
    }
}

impl DerefMut for StateGuard<'_> {
    fn deref_mut(&mut self) -> &mut DrawingContext {
        self.ctx
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.ctx.restore_to(self.depth);
    }
}

/// Maps a `width`x`height` pixmap onto `rect`.
fn rect_transform(width: u32, height: u32, rect: Rect) -> Transform {
    Transform::from_row(
        rect.width / width as f32,
        0.0,
        0.0,
        rect.height / height as f32,
        rect.x,
        rect.y,
    )
}

fn multiply_masks(a: &Mask, b: &Mask) -> Result<Mask> {
    let mut out = Mask::new(a.width(), a.height())
        .ok_or_else(|| RasterKitError::unable_to_mask("could not allocate combined mask"))?;
    for ((dst, x), y) in out.data_mut().iter_mut().zip(a.data()).zip(b.data()) {
        *dst = ((*x as u16 * *y as u16 + 127) / 255) as u8;
    }
    Ok(out)
}

/// Common path shapes.
pub mod shapes {
    use crate::ops::Rect;
    use tiny_skia::{Path, PathBuilder};

    pub fn rect(rect: Rect) -> Option<Path> {
        rect.to_skia().map(PathBuilder::from_rect)
    }

    pub fn ellipse(rect: Rect) -> Option<Path> {
        rect.to_skia().and_then(PathBuilder::from_oval)
    }

    pub fn rounded_rect(rect: Rect, radius: f32) -> Option<Path> {
        let r = radius.max(0.0).min(rect.width / 2.0).min(rect.height / 2.0);
        if r == 0.0 {
            return self::rect(rect);
        }
        // Quarter-circle cubic approximation constant.
        let k = 0.552_284_8 * r;
        let (x0, y0, x1, y1) = (rect.x, rect.y, rect.max_x(), rect.max_y());
        let mut pb = PathBuilder::new();
        pb.move_to(x0 + r, y0);
        pb.line_to(x1 - r, y0);
        pb.cubic_to(x1 - r + k, y0, x1, y0 + r - k, x1, y0 + r);
        pb.line_to(x1, y1 - r);
        pb.cubic_to(x1, y1 - r + k, x1 - r + k, y1, x1 - r, y1);
        pb.line_to(x0 + r, y1);
        pb.cubic_to(x0 + r - k, y1, x0, y1 - r + k, x0, y1 - r);
        pb.line_to(x0, y0 + r);
        pb.cubic_to(x0, y0 + r - k, x0 + r - k, y0, x0 + r, y0);
        pb.close();
        pb.finish()
    }
}
