//! Text watermark measurement and rasterization.
//!
//! A text watermark is measured at its nominal size, shrunk (never
//! enlarged) until it fits the box computed by the size policy, then
//! rasterized into a watermark-sized RGBA buffer. The buffer goes through
//! the same per-pixel compositor as image watermarks, so backends agree
//! on text pixels by construction.

use std::path::{Path, PathBuf};

use ab_glyph::{point, Font, FontVec, PxScale, ScaleFont};

use crate::error::{Error, Result};
use crate::raster::Canvas;

/// Measured extent of a string at one font size, in pixels.
///
/// Derived, never stored; recomputed at whatever size is currently being
/// tested by the fitting algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    /// Advance width of the string
    pub width: f32,
    /// Line height, `ascent - descent`
    pub height: f32,
    /// Distance from the top of the line box to the baseline
    pub ascent: f32,
    /// Distance from the baseline to the bottom of the line box (negative)
    pub descent: f32,
}

/// A loaded font plus fill color.
#[derive(Debug)]
pub struct TextStyle {
    font: FontVec,
    color: [u8; 3],
}

impl TextStyle {
    /// Load a font file and pair it with a fill color.
    ///
    /// Returns [`Error::MissingFont`] when the file is absent or is not a
    /// parseable font.
    pub fn load(font_path: &Path, color: [u8; 3]) -> Result<Self> {
        let data = std::fs::read(font_path).map_err(|e| Error::MissingFont {
            path: font_path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let font = FontVec::try_from_vec(data).map_err(|e| Error::MissingFont {
            path: PathBuf::from(font_path),
            reason: e.to_string(),
        })?;
        Ok(Self { font, color })
    }

    /// Measure `text` at `px_size` using the font's real metrics.
    pub fn measure(&self, px_size: f32, text: &str) -> TextMetrics {
        let scaled = self.font.as_scaled(PxScale::from(px_size.max(1.0)));
        let mut width = 0.0f32;
        let mut prev = None;
        for ch in text.chars() {
            let id = self.font.glyph_id(ch);
            if let Some(prev) = prev {
                width += scaled.kern(prev, id);
            }
            width += scaled.h_advance(id);
            prev = Some(id);
        }
        TextMetrics {
            width,
            height: scaled.ascent() - scaled.descent(),
            ascent: scaled.ascent(),
            descent: scaled.descent(),
        }
    }
}

/// Shrink factor that fits a measured base box into a target box.
///
/// `min(target_w / base_w, target_h / base_h, 1.0)` — text is only ever
/// shrunk to fit, never upscaled past its nominal configured size.
pub fn fit_scale(base_w: f32, base_h: f32, target_w: f32, target_h: f32) -> f32 {
    if base_w <= 0.0 || base_h <= 0.0 {
        return 1.0;
    }
    (target_w / base_w).min(target_h / base_h).min(1.0)
}

/// Font size to render at after fitting: `round(nominal * scale)`, at
/// least 1.
pub fn fitted_size(nominal: f32, scale: f32) -> f32 {
    (nominal * scale).round().max(1.0)
}

/// Rasterize `text` at `px_size` into a tight RGBA canvas.
///
/// The canvas is `ceil(width) x ceil(height)` of the measured metrics,
/// with the baseline placed `ascent` pixels from the top. Positioning the
/// canvas's top-left corner at a computed anchor position therefore puts
/// the baseline at `y + ascent`, matching how image watermark boxes
/// anchor. Pixel alpha is the rasterizer's glyph coverage; color is flat
/// RGB. Global opacity is applied later by the compositor.
pub fn render(style: &TextStyle, px_size: f32, text: &str) -> Result<Canvas> {
    let metrics = style.measure(px_size, text);
    let width = (metrics.width.ceil() as u32).max(1);
    let height = (metrics.height.ceil() as u32).max(1);
    let mut canvas = Canvas::new(width, height);

    let scaled = style.font.as_scaled(PxScale::from(px_size.max(1.0)));
    let mut pen_x = 0.0f32;
    let mut prev = None;
    for ch in text.chars() {
        let id = style.font.glyph_id(ch);
        if let Some(prev) = prev {
            pen_x += scaled.kern(prev, id);
        }
        let glyph = id.with_scale_and_position(
            PxScale::from(px_size.max(1.0)),
            point(pen_x, metrics.ascent),
        );
        if let Some(outlined) = style.font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            let [r, g, b] = style.color;
            outlined.draw(|gx, gy, coverage| {
                let px = bounds.min.x as i32 + gx as i32;
                let py = bounds.min.y as i32 + gy as i32;
                if px < 0 || py < 0 || px as u32 >= width || py as u32 >= height {
                    return;
                }
                let alpha = (coverage * 255.0).round() as u8;
                if alpha == 0 {
                    return;
                }
                // Overlapping outlines keep the strongest coverage.
                let existing = canvas.pixel(px as u32, py as u32);
                if alpha > existing[3] {
                    canvas.set_pixel(px as u32, py as u32, [r, g, b, alpha]);
                }
            });
        }
        pen_x += scaled.h_advance(id);
        prev = Some(id);
    }
    Ok(canvas)
}
