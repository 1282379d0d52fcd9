//! Codec adapter over the `image` crate (JPEG, PNG, WebP).

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder};

use super::{Canvas, EncodeParams, RasterBackend};
use crate::config::Interlace;
use crate::error::{Error, Result};

/// Backend backed by the `image` crate's decoders and encoders.
pub struct ImageBackend;

impl ImageBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterBackend for ImageBackend {
    fn name(&self) -> &'static str {
        "image"
    }

    fn supports(&self, mime: &str) -> bool {
        matches!(mime, "image/jpeg" | "image/png" | "image/webp")
    }

    fn load(&self, path: &Path) -> Result<Canvas> {
        let img = image::open(path).map_err(|e| Error::UnreadableSource {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let rgba = img.to_rgba8();
        let (w, h) = (rgba.width(), rgba.height());
        Canvas::from_raw(w, h, rgba.into_raw()).ok_or_else(|| Error::UnreadableSource {
            path: path.to_path_buf(),
            reason: "decoded buffer size mismatch".to_string(),
        })
    }

    fn encode(&self, canvas: &Canvas, mime: &str, params: &EncodeParams) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let (w, h) = (canvas.width(), canvas.height());
        match mime {
            "image/jpeg" => {
                if params.interlace == Interlace::Progressive {
                    // The image crate's JPEG encoder emits baseline scans
                    // only; the request is honored as best effort.
                    log::debug!("Progressive JPEG not supported by encoder, using baseline");
                }
                let rgba = image::RgbaImage::from_raw(w, h, canvas.data().to_vec())
                    .ok_or_else(|| Error::EncodeFailed {
                        path: Path::new(mime).to_path_buf(),
                        reason: "canvas buffer size mismatch".to_string(),
                    })?;
                let rgb = image::DynamicImage::ImageRgba8(rgba).to_rgb8();
                let mut encoder =
                    JpegEncoder::new_with_quality(Cursor::new(&mut out), params.quality.max(1));
                encoder
                    .encode(rgb.as_raw(), w, h, ExtendedColorType::Rgb8)
                    .map_err(|e| encode_failed(mime, e))?;
            },
            "image/png" => {
                let encoder = PngEncoder::new_with_quality(
                    Cursor::new(&mut out),
                    png_compression(params.quality),
                    FilterType::Adaptive,
                );
                encoder
                    .write_image(canvas.data(), w, h, ExtendedColorType::Rgba8)
                    .map_err(|e| encode_failed(mime, e))?;
            },
            "image/webp" => {
                if params.quality < 100 {
                    // The image crate only ships a lossless WebP encoder;
                    // the lossy-quality request is honored as best effort.
                    log::debug!("Lossy WebP not supported by encoder, using lossless");
                }
                let encoder = WebPEncoder::new_lossless(Cursor::new(&mut out));
                encoder
                    .encode(canvas.data(), w, h, ExtendedColorType::Rgba8)
                    .map_err(|e| encode_failed(mime, e))?;
            },
            other => return Err(Error::UnsupportedFormat(other.to_string())),
        }
        Ok(out)
    }
}

/// PNG has no lossy quality; the knob maps to compression effort.
fn png_compression(quality: u8) -> CompressionType {
    match quality {
        0..=39 => CompressionType::Fast,
        40..=89 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

fn encode_failed(mime: &str, e: image::ImageError) -> Error {
    Error::EncodeFailed {
        path: Path::new(mime).to_path_buf(),
        reason: e.to_string(),
    }
}
