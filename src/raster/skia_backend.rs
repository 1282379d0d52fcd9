//! Codec adapter over tiny-skia (PNG only).
//!
//! tiny-skia stores premultiplied RGBA; the conversion to and from the
//! engine's straight-alpha [`Canvas`] happens entirely at this boundary
//! so shared compositing code never sees premultiplied pixels.

use std::path::Path;

use tiny_skia::Pixmap;

use super::{Canvas, EncodeParams, RasterBackend};
use crate::error::{Error, Result};

/// Backend backed by tiny-skia's PNG codec.
pub struct SkiaBackend;

impl SkiaBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }
}

impl Default for SkiaBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterBackend for SkiaBackend {
    fn name(&self) -> &'static str {
        "tiny-skia"
    }

    fn supports(&self, mime: &str) -> bool {
        mime == "image/png"
    }

    fn load(&self, path: &Path) -> Result<Canvas> {
        let bytes = std::fs::read(path).map_err(|e| Error::UnreadableSource {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let pixmap = Pixmap::decode_png(&bytes).map_err(|e| Error::UnreadableSource {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut data = Vec::with_capacity(pixmap.pixels().len() * 4);
        for px in pixmap.pixels() {
            let c = px.demultiply();
            data.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        Canvas::from_raw(pixmap.width(), pixmap.height(), data).ok_or_else(|| {
            Error::UnreadableSource {
                path: path.to_path_buf(),
                reason: "decoded buffer size mismatch".to_string(),
            }
        })
    }

    fn encode(&self, canvas: &Canvas, mime: &str, _params: &EncodeParams) -> Result<Vec<u8>> {
        if mime != "image/png" {
            return Err(Error::UnsupportedFormat(mime.to_string()));
        }
        let mut pixmap =
            Pixmap::new(canvas.width(), canvas.height()).ok_or_else(|| Error::EncodeFailed {
                path: Path::new(mime).to_path_buf(),
                reason: "zero-sized canvas".to_string(),
            })?;
        let src = canvas.data();
        for (i, px) in pixmap.pixels_mut().iter_mut().enumerate() {
            let o = i * 4;
            *px = tiny_skia::ColorU8::from_rgba(src[o], src[o + 1], src[o + 2], src[o + 3])
                .premultiply();
        }
        pixmap.encode_png().map_err(|e| Error::EncodeFailed {
            path: Path::new(mime).to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports_png_only() {
        let backend = SkiaBackend::new();
        assert!(backend.supports("image/png"));
        assert!(!backend.supports("image/jpeg"));
        assert!(!backend.supports("image/webp"));
    }

    #[test]
    fn test_roundtrip_preserves_opaque_pixels() {
        let backend = SkiaBackend::new();
        let mut canvas = Canvas::new(3, 2);
        canvas.set_pixel(0, 0, [255, 0, 0, 255]);
        canvas.set_pixel(1, 0, [0, 255, 0, 255]);
        canvas.set_pixel(2, 1, [0, 0, 255, 255]);

        let params = EncodeParams {
            quality: 90,
            interlace: crate::config::Interlace::Baseline,
        };
        let bytes = backend
            .encode(&canvas, "image/png", &params)
            .expect("PNG encode should succeed");

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rt.png");
        std::fs::write(&path, &bytes).expect("write png");
        let loaded = backend.load(&path).expect("PNG load should succeed");
        assert_eq!(loaded, canvas);
    }

    #[test]
    fn test_backends_agree_on_opaque_png() {
        // Same file decoded by both adapters yields identical straight
        // RGBA for opaque pixels.
        let mut canvas = Canvas::new(4, 4);
        for y in 0..4 {
            for x in 0..4 {
                canvas.set_pixel(x, y, [(x * 60) as u8, (y * 60) as u8, 128, 255]);
            }
        }
        let params = EncodeParams {
            quality: 90,
            interlace: crate::config::Interlace::Baseline,
        };
        let bytes = SkiaBackend::new()
            .encode(&canvas, "image/png", &params)
            .expect("encode");
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("agree.png");
        std::fs::write(&path, &bytes).expect("write png");

        let a = super::super::ImageBackend::new().load(&path).expect("image backend load");
        let b = SkiaBackend::new().load(&path).expect("skia backend load");
        assert_eq!(a, b);
    }

    #[test]
    fn test_encode_rejects_other_mime() {
        let backend = SkiaBackend::new();
        let canvas = Canvas::new(2, 2);
        let params = EncodeParams {
            quality: 90,
            interlace: crate::config::Interlace::Baseline,
        };
        assert!(matches!(
            backend.encode(&canvas, "image/jpeg", &params),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
