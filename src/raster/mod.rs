//! Raster pixel buffers, alpha compositing, and codec backends.
//!
//! All pixel math in the engine happens on [`Canvas`], a straight
//! (non-premultiplied) RGBA8 buffer. Codec backends only decode into and
//! encode out of this representation; the compositor and text drawing are
//! shared code, so composited pixels are identical regardless of which
//! backend loaded the file.

mod image_backend;
mod skia_backend;

pub use image_backend::ImageBackend;
pub use skia_backend::SkiaBackend;

use std::path::Path;

use crate::config::Interlace;
use crate::error::{Error, Result};
use crate::text::TextStyle;

/// A straight-alpha RGBA8 pixel buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Canvas {
    /// Create a fully transparent canvas.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Wrap an existing RGBA8 buffer. Returns `None` when the buffer
    /// length does not match `width * height * 4`.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() == width as usize * height as usize * 4 {
            Some(Self {
                width,
                height,
                data,
            })
        } else {
            None
        }
    }

    /// Canvas width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Canvas height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The underlying RGBA8 bytes, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the canvas, returning its RGBA8 bytes.
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Read one pixel. Panics when out of bounds (callers clip first).
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    /// Write one pixel. Panics when out of bounds (callers clip first).
    pub fn set_pixel(&mut self, x: u32, y: u32, px: [u8; 4]) {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.data[i..i + 4].copy_from_slice(&px);
    }

    /// Resample this canvas to a new size with a bilinear filter.
    ///
    /// Used to bring an image watermark's natural size to its computed
    /// box. Shared by every backend so scaled pixels never differ between
    /// them.
    pub fn scaled(&self, new_w: u32, new_h: u32) -> Canvas {
        if new_w == self.width && new_h == self.height {
            return self.clone();
        }
        let src = image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .expect("canvas buffer length is checked at construction");
        let resized =
            image::imageops::resize(&src, new_w, new_h, image::imageops::FilterType::Triangle);
        Canvas {
            width: new_w,
            height: new_h,
            data: resized.into_raw(),
        }
    }
}

/// Alpha-blend `src` over `dest` with its top-left corner at `(x, y)`.
///
/// Straight-alpha "over" compositing, computed per pixel: the effective
/// alpha is `src_alpha * (opacity / 100)`, so fully transparent source
/// pixels stay transparent at any global opacity. The source rectangle is
/// clipped against the destination; `(x, y)` may be negative or beyond
/// the canvas. Writes in place; no destination-sized temporaries.
pub fn blend_into(dest: &mut Canvas, src: &Canvas, x: i64, y: i64, opacity: u8) {
    let opacity = f32::from(opacity.min(100)) / 100.0;
    if opacity <= 0.0 {
        return;
    }

    // Clip the source rectangle to the destination bounds.
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + i64::from(src.width())).min(i64::from(dest.width()));
    let y1 = (y + i64::from(src.height())).min(i64::from(dest.height()));
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    for dy in y0..y1 {
        for dx in x0..x1 {
            let sx = (dx - x) as u32;
            let sy = (dy - y) as u32;
            let s = src.pixel(sx, sy);
            let eff = (f32::from(s[3]) / 255.0) * opacity;
            if eff <= 0.0 {
                continue;
            }
            let d = dest.pixel(dx as u32, dy as u32);
            let inv = 1.0 - eff;
            let da = f32::from(d[3]) / 255.0;
            let out_a = eff + da * inv;
            let blend = |sc: u8, dc: u8| -> u8 {
                (f32::from(sc) * eff + f32::from(dc) * inv + 0.5) as u8
            };
            dest.set_pixel(
                dx as u32,
                dy as u32,
                [
                    blend(s[0], d[0]),
                    blend(s[1], d[1]),
                    blend(s[2], d[2]),
                    (out_a * 255.0 + 0.5) as u8,
                ],
            );
        }
    }
}

/// Parameters forwarded to an encoder.
#[derive(Debug, Clone, Copy)]
pub struct EncodeParams {
    /// Lossy-format quality, 0-100
    pub quality: u8,
    /// Requested scan layout; best effort per codec
    pub interlace: Interlace,
}

/// A raster codec adapter.
///
/// Backends differ only in how bytes become a [`Canvas`] and back;
/// compositing and text drawing are provided methods over the shared
/// pixel code, so every backend produces identical composited pixels.
pub trait RasterBackend {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Whether this backend can decode and encode the given MIME type.
    fn supports(&self, mime: &str) -> bool;

    /// Decode the file at `path` into a straight-RGBA canvas.
    fn load(&self, path: &Path) -> Result<Canvas>;

    /// Encode a canvas into the container format for `mime`.
    fn encode(&self, canvas: &Canvas, mime: &str, params: &EncodeParams) -> Result<Vec<u8>>;

    /// Blend a watermark canvas over `dest` at `(x, y)`.
    fn blend(&self, dest: &mut Canvas, src: &Canvas, x: i64, y: i64, opacity: u8) {
        blend_into(dest, src, x, y, opacity);
    }

    /// Rasterize text and blend it over `dest` at `(x, y)`.
    ///
    /// The glyph buffer places the baseline at `ascent` from its top, so
    /// anchoring the buffer's top-left at the computed position aligns
    /// text identically to image watermarks.
    fn draw_text(
        &self,
        dest: &mut Canvas,
        style: &TextStyle,
        text: &str,
        px_size: f32,
        x: i64,
        y: i64,
        opacity: u8,
    ) -> Result<()> {
        let rendered = crate::text::render(style, px_size, text)?;
        blend_into(dest, &rendered, x, y, opacity);
        Ok(())
    }
}

/// Ordered set of available backends.
///
/// Selection is by capability probing in registration order; the engine
/// never branches on a backend's identity.
pub struct BackendRegistry {
    backends: Vec<Box<dyn RasterBackend>>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_default_backends()
    }
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    /// The standard registry: the image-crate backend first (widest
    /// format coverage), tiny-skia second.
    pub fn with_default_backends() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ImageBackend::new()));
        registry.register(Box::new(SkiaBackend::new()));
        registry
    }

    /// Append a backend to the probe order.
    pub fn register(&mut self, backend: Box<dyn RasterBackend>) {
        self.backends.push(backend);
    }

    /// Select the first backend supporting `mime`.
    pub fn select(&self, mime: &str) -> Result<&dyn RasterBackend> {
        for backend in &self.backends {
            if backend.supports(mime) {
                log::debug!("Selected raster backend '{}' for {}", backend.name(), mime);
                return Ok(backend.as_ref());
            }
        }
        Err(Error::UnsupportedFormat(mime.to_string()))
    }
}

/// Guess a MIME type from a file extension.
///
/// Used for the watermark asset, whose variant record (and therefore
/// recorded MIME) lives in the excluded upload layer.
pub fn mime_from_path(path: &Path) -> Option<&'static str> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())?
        .as_str()
    {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn solid(w: u32, h: u32, px: [u8; 4]) -> Canvas {
        let mut c = Canvas::new(w, h);
        for y in 0..h {
            for x in 0..w {
                c.set_pixel(x, y, px);
            }
        }
        c
    }

    #[test]
    fn test_blend_opacity_zero_is_noop() {
        let mut dest = solid(4, 4, [10, 20, 30, 255]);
        let before = dest.clone();
        let src = solid(2, 2, [200, 200, 200, 255]);
        blend_into(&mut dest, &src, 1, 1, 0);
        assert_eq!(dest, before);
    }

    #[test]
    fn test_blend_opaque_at_full_opacity_copies_source() {
        let mut dest = solid(4, 4, [10, 20, 30, 255]);
        let src = solid(2, 2, [200, 100, 50, 255]);
        blend_into(&mut dest, &src, 1, 1, 100);
        assert_eq!(dest.pixel(1, 1), [200, 100, 50, 255]);
        assert_eq!(dest.pixel(2, 2), [200, 100, 50, 255]);
        // Outside the box untouched.
        assert_eq!(dest.pixel(0, 0), [10, 20, 30, 255]);
        assert_eq!(dest.pixel(3, 3), [10, 20, 30, 255]);
    }

    #[test]
    fn test_blend_transparent_source_pixels_stay_transparent() {
        let mut dest = solid(4, 4, [10, 20, 30, 255]);
        let before = dest.clone();
        let src = solid(2, 2, [255, 255, 255, 0]);
        // Global opacity must not resurrect alpha-0 source pixels.
        blend_into(&mut dest, &src, 0, 0, 100);
        assert_eq!(dest, before);
        blend_into(&mut dest, &src, 0, 0, 50);
        assert_eq!(dest, before);
    }

    #[test]
    fn test_blend_global_opacity_attenuates_per_pixel() {
        let mut dest = solid(1, 1, [0, 0, 0, 255]);
        let src = solid(1, 1, [255, 255, 255, 255]);
        blend_into(&mut dest, &src, 0, 0, 50);
        let px = dest.pixel(0, 0);
        // 255 * 0.5 rounded.
        assert_eq!(px[0], 128);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn test_blend_source_alpha_modulates_under_global_opacity() {
        let mut dest = solid(1, 1, [0, 0, 0, 255]);
        let src = solid(1, 1, [255, 255, 255, 128]);
        blend_into(&mut dest, &src, 0, 0, 50);
        // eff = (128/255) * 0.5 ≈ 0.251
        let px = dest.pixel(0, 0);
        assert!((63..=65).contains(&px[0]), "got {}", px[0]);
    }

    #[test]
    fn test_blend_clips_negative_and_overflowing_positions() {
        let mut dest = solid(4, 4, [0, 0, 0, 255]);
        let src = solid(3, 3, [255, 0, 0, 255]);
        blend_into(&mut dest, &src, -2, -2, 100);
        assert_eq!(dest.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(dest.pixel(1, 1), [0, 0, 0, 255]);

        let mut dest = solid(4, 4, [0, 0, 0, 255]);
        blend_into(&mut dest, &src, 3, 3, 100);
        assert_eq!(dest.pixel(3, 3), [255, 0, 0, 255]);
        assert_eq!(dest.pixel(2, 2), [0, 0, 0, 255]);

        // Fully off-canvas: no-op, no panic.
        let mut dest = solid(4, 4, [0, 0, 0, 255]);
        let before = dest.clone();
        blend_into(&mut dest, &src, 10, 10, 100);
        assert_eq!(dest, before);
    }

    #[test]
    fn test_scaled_identity_and_downscale() {
        let src = solid(4, 4, [9, 9, 9, 255]);
        assert_eq!(src.scaled(4, 4), src);
        let half = src.scaled(2, 2);
        assert_eq!(half.width(), 2);
        assert_eq!(half.height(), 2);
        assert_eq!(half.pixel(0, 0), [9, 9, 9, 255]);
    }

    #[test]
    fn test_mime_from_path() {
        assert_eq!(
            mime_from_path(&PathBuf::from("a/logo.PNG")),
            Some("image/png")
        );
        assert_eq!(
            mime_from_path(&PathBuf::from("b/photo.jpeg")),
            Some("image/jpeg")
        );
        assert_eq!(
            mime_from_path(&PathBuf::from("c/anim.webp")),
            Some("image/webp")
        );
        assert_eq!(mime_from_path(&PathBuf::from("d/doc.gif")), None);
    }

    #[test]
    fn test_registry_probes_in_order() {
        let registry = BackendRegistry::with_default_backends();
        assert_eq!(registry.select("image/jpeg").unwrap().name(), "image");
        assert_eq!(registry.select("image/png").unwrap().name(), "image");
        assert!(matches!(
            registry.select("image/gif"),
            Err(Error::UnsupportedFormat(_))
        ));

        // A PNG-only registry still resolves PNG via tiny-skia.
        let mut registry = BackendRegistry::new();
        registry.register(Box::new(SkiaBackend::new()));
        assert_eq!(registry.select("image/png").unwrap().name(), "tiny-skia");
        assert!(registry.select("image/jpeg").is_err());
    }
}
