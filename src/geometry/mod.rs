//! Placement geometry for watermark boxes.
//!
//! Pure functions turning (target image dimensions, watermark natural
//! dimensions, size policy, anchor, offset) into a concrete pixel box.
//! No I/O and no pixel data; everything here is unit-testable arithmetic.

use crate::config::{Anchor, HorizontalAlign, Offset, OffsetUnit, SizePolicy, VerticalAlign};

/// Compute the watermark box size for a target image.
///
/// The result always fits within the image: `1 <= box_w <= image_w` and
/// `1 <= box_h <= image_h`, rounded to the nearest pixel.
///
/// # Examples
///
/// ```
/// use aquamark::geometry::compute_box_size;
/// use aquamark::config::SizePolicy;
///
/// // A 200x100 watermark scaled to 100% of a 600x400 image fills the width.
/// assert_eq!(
///     compute_box_size(600, 400, 200, 100, SizePolicy::ScaledPercent(100)),
///     (600, 300)
/// );
/// assert_eq!(
///     compute_box_size(600, 400, 200, 100, SizePolicy::ScaledPercent(50)),
///     (300, 150)
/// );
/// ```
pub fn compute_box_size(
    image_w: u32,
    image_h: u32,
    wm_w: u32,
    wm_h: u32,
    policy: SizePolicy,
) -> (u32, u32) {
    let (w, h) = match policy {
        SizePolicy::Original => fit_within(wm_w as f64, wm_h as f64, image_w, image_h),
        SizePolicy::Absolute(w, h) => fit_within(w as f64, h as f64, image_w, image_h),
        SizePolicy::ScaledPercent(p) => {
            let target_w = image_w as f64 * f64::from(p) / 100.0;
            let ratio = if wm_w == 0 { 1.0 } else { target_w / wm_w as f64 };
            let target_h = wm_h as f64 * ratio;
            if target_h > image_h as f64 && wm_h > 0 {
                // Height overflows; refit both dimensions from the height
                // constraint instead (fit-within, not crop).
                let ratio = image_h as f64 / wm_h as f64;
                (wm_w as f64 * ratio, image_h as f64)
            } else {
                (target_w, target_h)
            }
        },
    };
    (round_dim(w, image_w), round_dim(h, image_h))
}

/// Proportionally shrink `(w, h)` until both axes fit `(max_w, max_h)`.
fn fit_within(w: f64, h: f64, max_w: u32, max_h: u32) -> (f64, f64) {
    if w <= 0.0 || h <= 0.0 {
        return (1.0, 1.0);
    }
    let scale = (f64::from(max_w) / w).min(f64::from(max_h) / h).min(1.0);
    (w * scale, h * scale)
}

/// Round to nearest pixel, clamped to `1..=max`.
fn round_dim(v: f64, max: u32) -> u32 {
    (v.round() as i64).clamp(1, i64::from(max.max(1))) as u32
}

/// Compute the watermark's top-left position on the target image.
///
/// Base placement comes from the anchor; the offset then pulls the box
/// away from the edge it is anchored to. For `Right`/`Bottom` anchors the
/// offset is *subtracted* (a positive offset moves the box left/up toward
/// the image center); for `Left`/`Top` it is added; `Center`/`Middle`
/// anchors simply add it. Percent offsets resolve against the image
/// dimensions.
///
/// The result is deliberately unclamped: a pathological offset may push
/// the box partly or fully off-canvas, which is accepted input behavior.
pub fn compute_position(
    image_w: u32,
    image_h: u32,
    box_w: u32,
    box_h: u32,
    anchor: Anchor,
    offset: Offset,
) -> (i64, i64) {
    let (dx, dy) = resolve_offset(image_w, image_h, offset);

    let base_x = match anchor.horizontal() {
        HorizontalAlign::Left => 0,
        HorizontalAlign::Center => (i64::from(image_w) - i64::from(box_w)) / 2,
        HorizontalAlign::Right => i64::from(image_w) - i64::from(box_w),
    };
    let base_y = match anchor.vertical() {
        VerticalAlign::Top => 0,
        VerticalAlign::Middle => (i64::from(image_h) - i64::from(box_h)) / 2,
        VerticalAlign::Bottom => i64::from(image_h) - i64::from(box_h),
    };

    // Directional application: right/bottom subtract, everything else adds.
    let x = match anchor.horizontal() {
        HorizontalAlign::Right => base_x - dx,
        _ => base_x + dx,
    };
    let y = match anchor.vertical() {
        VerticalAlign::Bottom => base_y - dy,
        _ => base_y + dy,
    };
    (x, y)
}

/// Resolve an offset to pixels against the image dimensions.
fn resolve_offset(image_w: u32, image_h: u32, offset: Offset) -> (i64, i64) {
    match offset.unit {
        OffsetUnit::Pixels => (i64::from(offset.dx), i64::from(offset.dy)),
        OffsetUnit::PercentOfImage => (
            (f64::from(offset.dx) * f64::from(image_w) / 100.0).round() as i64,
            (f64::from(offset.dy) * f64::from(image_h) / 100.0).round() as i64,
        ),
    }
}
