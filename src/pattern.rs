// src/pattern.rs
//
// Tiling pattern fills driven by caller-supplied draw callbacks.
//
// **Lifetime model**: a generator (`ColorPattern` / `MaskPattern`) owns its
// callback through a process-wide token table. Fills (`PatternFill`) only
// carry the token, so a fill that outlives its generator cannot reach a
// dropped closure: the lookup fails with `PatternReleased` instead.
//
// The table lock is held only long enough to clone the callback's `Arc`;
// callbacks run unlocked and may themselves fill with other patterns.

use crate::color::Color;
use crate::engine::context::DrawingContext;
use crate::error::{RasterKitError, Result};
use crate::ops::{Rect, Size, Tiling};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tiny_skia::{BlendMode, FilterQuality, Pattern, Pixmap, Shader, SpreadMode, Transform};
use tracing::debug;

/// Draws one pattern cell. Coordinates are in pattern space, the cell
/// occupies the pattern's `bounds`.
pub type PatternDrawFn = dyn Fn(&mut DrawingContext) -> Result<()> + Send + Sync;

static REGISTRY: Lazy<Mutex<HashMap<u64, Arc<PatternDrawFn>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

fn register(draw: Arc<PatternDrawFn>) -> u64 {
    let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    REGISTRY.lock().insert(token, draw);
    debug!(target: "rasterkit::pattern", token, "registered pattern");
    token
}

fn unregister(token: u64) {
    if REGISTRY.lock().remove(&token).is_some() {
        debug!(target: "rasterkit::pattern", token, "released pattern");
    }
}

fn lookup(token: u64) -> Result<Arc<PatternDrawFn>> {
    REGISTRY
        .lock()
        .get(&token)
        .cloned()
        .ok_or_else(|| RasterKitError::pattern_released(token))
}

/// Number of live pattern generators in this process.
pub fn live_pattern_count() -> usize {
    REGISTRY.lock().len()
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Cell {
    bounds: Rect,
    x_step: f32,
    y_step: f32,
    tiling: Tiling,
}

impl Cell {
    fn new(bounds: Rect, x_step: f32, y_step: f32, tiling: Tiling) -> Result<Self> {
        for (name, value) in [("x_step", x_step), ("y_step", y_step)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(RasterKitError::invalid_parameters(
                    name,
                    value as f64,
                    "a finite step greater than 0",
                ));
            }
        }
        if bounds.is_empty() {
            return Err(RasterKitError::invalid_parameters(
                "bounds",
                bounds.width.min(bounds.height) as f64,
                "a non-empty cell",
            ));
        }
        Ok(Self {
            bounds,
            x_step,
            y_step,
            tiling,
        })
    }

    /// Pixel size of the rendered tile.
    fn tile_size(&self) -> Size {
        let snap = |v: f32| match self.tiling {
            Tiling::ConstantSpacing => v.ceil(),
            Tiling::NoDistortion | Tiling::ConstantSpacingMinimalDistortion => v.round().max(1.0),
        };
        Size::new(snap(self.x_step), snap(self.y_step))
    }

    fn quality(&self) -> FilterQuality {
        match self.tiling {
            Tiling::NoDistortion => FilterQuality::Nearest,
            Tiling::ConstantSpacing => FilterQuality::Bilinear,
            Tiling::ConstantSpacingMinimalDistortion => FilterQuality::Bicubic,
        }
    }

    /// Places tile pixels in pattern space.
    fn shader_transform(&self, tile: &Pixmap) -> Transform {
        let t = Transform::from_translate(self.bounds.x, self.bounds.y);
        match self.tiling {
            Tiling::NoDistortion => t,
            _ => t.pre_scale(
                self.x_step / tile.width() as f32,
                self.y_step / tile.height() as f32,
            ),
        }
    }
}

/// A paint referring to a live pattern generator.
#[derive(Clone, Debug, PartialEq)]
pub struct PatternFill {
    token: u64,
    cell: Cell,
    color: Option<Color>,
}

impl PatternFill {
    pub fn token(&self) -> u64 {
        self.token
    }

    /// The recolour applied to a mask pattern's shape, if any.
    pub fn color(&self) -> Option<Color> {
        self.color
    }

    pub fn is_live(&self) -> bool {
        REGISTRY.lock().contains_key(&self.token)
    }

    /// Renders one tile by invoking the registered callback.
    pub(crate) fn render_tile(&self) -> Result<Pixmap> {
        let draw = lookup(self.token)?;
        let cell = self.cell;
        let mut ctx = DrawingContext::new(cell.tile_size())?;
        let scale_x = ctx.size().width / cell.x_step;
        let scale_y = ctx.size().height / cell.y_step;
        ctx.saving_state(|ctx| {
            if cell.tiling != Tiling::NoDistortion {
                ctx.scale_by(scale_x, scale_y);
            }
            ctx.translate_by(-cell.bounds.x, -cell.bounds.y);
            ctx.clip_to_rect(cell.bounds)?;
            draw(ctx)
        })?;
        if let Some(color) = self.color {
            ctx.saving_state(|ctx| {
                ctx.set_blend_mode(BlendMode::SourceIn);
                ctx.set_fill_color(color);
                let bounds = ctx.bounds();
                ctx.fill_rect(bounds)
            })?;
        }
        Ok(ctx.into_pixmap())
    }

    pub(crate) fn shader<'a>(&self, tile: &'a Pixmap, opacity: f32) -> Shader<'a> {
        Pattern::new(
            tile.as_ref(),
            SpreadMode::Repeat,
            self.cell.quality(),
            opacity,
            self.cell.shader_transform(tile),
        )
    }
}

/// Pattern whose callback draws its own colours.
pub struct ColorPattern {
    token: u64,
    cell: Cell,
}

impl ColorPattern {
    pub fn new<F>(bounds: Rect, x_step: f32, y_step: f32, tiling: Tiling, draw: F) -> Result<Self>
    where
        F: Fn(&mut DrawingContext) -> Result<()> + Send + Sync + 'static,
    {
        let cell = Cell::new(bounds, x_step, y_step, tiling)?;
        let token = register(Arc::new(draw));
        Ok(Self { token, cell })
    }

    pub fn fill(&self) -> PatternFill {
        PatternFill {
            token: self.token,
            cell: self.cell,
            color: None,
        }
    }

    pub fn token(&self) -> u64 {
        self.token
    }
}

impl Drop for ColorPattern {
    fn drop(&mut self) {
        unregister(self.token);
    }
}

impl fmt::Debug for ColorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColorPattern")
            .field("token", &self.token)
            .field("bounds", &self.cell.bounds)
            .finish_non_exhaustive()
    }
}

/// Pattern whose callback supplies only a shape; the colour is chosen per
/// fill.
pub struct MaskPattern {
    token: u64,
    cell: Cell,
}

impl MaskPattern {
    pub fn new<F>(bounds: Rect, x_step: f32, y_step: f32, tiling: Tiling, draw: F) -> Result<Self>
    where
        F: Fn(&mut DrawingContext) -> Result<()> + Send + Sync + 'static,
    {
        let cell = Cell::new(bounds, x_step, y_step, tiling)?;
        let token = register(Arc::new(draw));
        Ok(Self { token, cell })
    }

    pub fn fill(&self, color: Color) -> PatternFill {
        PatternFill {
            token: self.token,
            cell: self.cell,
            color: Some(color),
        }
    }

    pub fn token(&self) -> u64 {
        self.token
    }
}

impl Drop for MaskPattern {
    fn drop(&mut self) {
        unregister(self.token);
    }
}

impl fmt::Debug for MaskPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaskPattern")
            .field("token", &self.token)
            .field("bounds", &self.cell.bounds)
            .finish_non_exhaustive()
    }
}
