// src/thumbnail.rs
//
// Fire-and-forget file thumbnails. The completion runs exactly once, on a
// worker thread, or on the calling thread when no worker can be spawned.

use crate::color::Color;
use crate::container::ImageContainer;
use crate::engine::context::DrawingContext;
use crate::engine::pipeline::{aspect_rect, scale};
use crate::engine::raster::Raster;
use crate::error::{RasterKitError, Result};
use crate::ops::{Rect, ScalingType, Size};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Card margin in icon mode, as a fraction of the shorter edge.
const ICON_MARGIN: f32 = 0.08;

/// A generated thumbnail.
#[derive(Clone, Debug)]
pub struct FileThumbnail {
    thumbnail: Raster,
}

impl FileThumbnail {
    pub fn raster(&self) -> &Raster {
        &self.thumbnail
    }

    pub fn into_raster(self) -> Raster {
        self.thumbnail
    }

    /// Generates a thumbnail of `path` no larger than `size` × `scale` pixels
    /// and hands it to `completion`, or `None` on any failure.
    ///
    /// In icon mode the preview sits on a white card with a gray border that
    /// fills the whole requested size.
    pub fn generate<F>(path: impl AsRef<Path>, size: Size, scale: f32, icon: bool, completion: F)
    where
        F: FnOnce(Option<FileThumbnail>) + Send + 'static,
    {
        let path = path.as_ref().to_path_buf();
        let completion = Arc::new(Mutex::new(Some(completion)));
        let worker_completion = Arc::clone(&completion);
        let worker_path = path.clone();

        let spawned = thread::Builder::new()
            .name("rasterkit-thumbnail".into())
            .spawn(move || finish(&worker_completion, &worker_path, size, scale, icon));

        if let Err(e) = spawned {
            warn!(target: "rasterkit::thumbnail", error = %e, "no worker thread, rendering inline");
            finish(&completion, &path, size, scale, icon);
        }
    }

    /// Renders synchronously.
    pub fn render(path: impl AsRef<Path>, size: Size, scale: f32, icon: bool) -> Result<FileThumbnail> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(RasterKitError::invalid_parameters(
                "scale",
                scale as f64,
                "a finite value greater than 0",
            ));
        }
        let target = size.scaled(scale);
        let container = ImageContainer::from_path(path)?;
        let frame = container
            .first()
            .ok_or_else(|| RasterKitError::invalid_image("file holds no images"))?;
        let source = frame.normalized_raster()?;

        let thumbnail = if icon {
            icon_card(source, target)?
        } else {
            let fitted = aspect_rect(source.size(), target, ScalingType::AspectFit).size();
            scale_to(source, fitted)?
        };
        Ok(FileThumbnail { thumbnail })
    }
}

fn finish<F>(completion: &Mutex<Option<F>>, path: &Path, size: Size, scale: f32, icon: bool)
where
    F: FnOnce(Option<FileThumbnail>),
{
    let Some(completion) = completion.lock().take() else {
        return;
    };
    let result = match FileThumbnail::render(path, size, scale, icon) {
        Ok(thumb) => {
            debug!(
                target: "rasterkit::thumbnail",
                path = %path.display(),
                width = thumb.raster().width(),
                height = thumb.raster().height(),
                "generated thumbnail"
            );
            Some(thumb)
        }
        Err(e) => {
            warn!(target: "rasterkit::thumbnail", path = %path.display(), error = %e, "thumbnail failed");
            None
        }
    };
    completion(result);
}

fn scale_to(source: &Raster, size: Size) -> Result<Raster> {
    let size = Size::new(size.width.max(1.0), size.height.max(1.0));
    scale(source, ScalingType::AxesIndependent, size)
}

fn icon_card(source: &Raster, target: Size) -> Result<Raster> {
    DrawingContext::create_image(target, Some(Color::WHITE), |ctx, size| {
        let margin = (size.width.min(size.height) * ICON_MARGIN).max(1.0);
        let inner = Rect::from_size(size).inset_by(margin, margin);
        if !inner.is_empty() {
            let fitted = aspect_rect(source.size(), inner.size(), ScalingType::AspectFit);
            ctx.draw_image(source, fitted.offset_by(inner.x, inner.y))?;
        }
        ctx.set_stroke_color(Color::GRAY);
        ctx.set_line_width(1.0);
        ctx.stroke_rect(Rect::from_size(size).inset_by(0.5, 0.5))
    })
}
