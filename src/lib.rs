#![allow(clippy::too_many_arguments)]

//! # Aquamark
//!
//! Deterministic image watermarking engine: placement geometry, per-pixel
//! alpha compositing, reversible application backed by pristine-original
//! backups, and EXIF/IPTC preservation across the JPEG re-encode.
//!
//! The engine adds exactly one overlay — a raster image or a rendered
//! text string — to an existing raster file, and can remove and re-add it
//! without visual drift. It is not a general image editor: no format
//! conversion, no resizing-for-display, no content analysis.
//!
//! ## Core pieces
//!
//! - [`geometry`] — pure math from (image size, watermark size, size
//!   policy, anchor, offset) to a concrete pixel box.
//! - [`text`] — font metrics, shrink-to-fit scaling, glyph rasterization.
//! - [`raster`] — straight-RGBA canvases, the "over" compositor, and
//!   pluggable codec backends selected by capability probing.
//! - [`metadata`] — JPEG APP1/APP13 segment capture and splicing.
//! - [`backup`] — mirrored-path original backups plus the per-attachment
//!   watermarked flag, together the idempotency guard.
//! - [`engine`] — the orchestrator gluing the above into
//!   [`apply_watermark`](engine::WatermarkEngine::apply_watermark) and
//!   [`remove_watermark`](engine::WatermarkEngine::remove_watermark).
//!
//! ## Quick start
//!
//! ```ignore
//! use aquamark::{
//!     BackupStore, RasterVariant, Trigger, WatermarkConfig, WatermarkEngine, WatermarkSource,
//! };
//!
//! let store = BackupStore::new("/var/uploads", "/var/uploads-backups");
//! let engine = WatermarkEngine::new(store);
//!
//! let config = WatermarkConfig::new(WatermarkSource::Image {
//!     path: "/var/assets/logo.png".into(),
//!     width: 150,
//!     height: 150,
//! });
//!
//! let variants = vec![RasterVariant {
//!     file_path: "/var/uploads/2024/05/photo.jpg".into(),
//!     width: 800,
//!     height: 600,
//!     mime_type: "image/jpeg".into(),
//! }];
//!
//! let report = engine.apply_watermark(&variants, &config, "attachment-42", Trigger::Automatic)?;
//! assert_eq!(report.applied(), 1);
//! # Ok::<(), aquamark::Error>(())
//! ```

pub mod backup;
pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod metadata;
pub mod raster;
pub mod text;

pub use backup::{BackupRecord, BackupStore};
pub use config::{
    Anchor, Interlace, Offset, OffsetUnit, SizePolicy, WatermarkConfig, WatermarkIdentity,
    WatermarkKind, WatermarkSource,
};
pub use engine::{AppliedReport, Outcome, RasterVariant, Trigger, VariantReport, WatermarkEngine};
pub use error::{Error, Result};
pub use raster::{BackendRegistry, Canvas, EncodeParams, ImageBackend, RasterBackend, SkiaBackend};
pub use text::{TextMetrics, TextStyle};
