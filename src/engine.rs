//! The watermark orchestrator.
//!
//! [`WatermarkEngine`] is the crate's entry point. Given an attachment's
//! raster variants and a [`WatermarkConfig`], it decides per variant
//! whether to skip, apply, or restore-then-reapply, runs the geometry,
//! compositing, and metadata steps in order, and reports every variant's
//! outcome. One variant failing never aborts its siblings.
//!
//! Per-variant state machine: `Untouched -> Watermarked -> (Removed |
//! Reapplying) -> Watermarked`. The watermarked flag plus the backup
//! store form the idempotency guard: when the flag says the pixels
//! already carry the overlay, the engine restores the pristine bytes
//! first or fails that variant — it never stacks a second watermark.

use std::path::PathBuf;

use serde::Serialize;

use crate::backup::{atomic_write, BackupStore};
use crate::config::{WatermarkConfig, WatermarkIdentity, WatermarkSource};
use crate::error::{Error, Result};
use crate::geometry::{compute_box_size, compute_position};
use crate::metadata;
use crate::raster::{mime_from_path, BackendRegistry, EncodeParams};
use crate::text::{fit_scale, fitted_size, TextStyle};

/// One generated size of one attachment.
///
/// `width`/`height` reflect the current on-disk pixels; the engine
/// refreshes them after every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RasterVariant {
    /// Absolute path of the variant file
    pub file_path: PathBuf,
    /// Current pixel width
    pub width: u32,
    /// Current pixel height
    pub height: u32,
    /// MIME type of the file; never changed by the engine
    pub mime_type: String,
}

/// What caused an apply run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trigger {
    /// Upload pipeline invoked the engine after generating sizes
    Automatic,
    /// An explicit user action requested (re)application
    Manual,
}

/// Per-variant outcome of an apply run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Outcome {
    /// Watermark composited and written
    Applied,
    /// Variant intentionally left untouched
    Skipped {
        /// Why the variant was skipped
        reason: String,
    },
    /// Processing failed; the file was left un-mutated
    Failed {
        /// Why the variant failed
        reason: String,
    },
}

/// Report entry for one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantReport {
    /// The variant, with dimensions refreshed after processing
    pub variant: RasterVariant,
    /// What happened to it
    pub outcome: Outcome,
}

/// Result of [`WatermarkEngine::apply_watermark`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedReport {
    /// Identity of the attachment that was processed
    pub attachment: String,
    /// What caused the run
    pub trigger: Trigger,
    /// Per-variant outcomes, in input order
    pub variants: Vec<VariantReport>,
}

impl AppliedReport {
    /// Number of variants the watermark was applied to.
    pub fn applied(&self) -> usize {
        self.variants
            .iter()
            .filter(|v| v.outcome == Outcome::Applied)
            .count()
    }

    /// Number of variants that failed.
    pub fn failed(&self) -> usize {
        self.variants
            .iter()
            .filter(|v| matches!(v.outcome, Outcome::Failed { .. }))
            .count()
    }
}

/// The watermarking engine.
pub struct WatermarkEngine {
    backends: BackendRegistry,
    store: BackupStore,
}

impl WatermarkEngine {
    /// Create an engine with the default backend registry.
    pub fn new(store: BackupStore) -> Self {
        Self {
            backends: BackendRegistry::with_default_backends(),
            store,
        }
    }

    /// Create an engine with a custom backend registry.
    pub fn with_registry(store: BackupStore, backends: BackendRegistry) -> Self {
        Self { backends, store }
    }

    /// The engine's backup store.
    pub fn store(&self) -> &BackupStore {
        &self.store
    }

    /// Apply (or reapply) the configured watermark to every variant of an
    /// attachment.
    ///
    /// Variants are processed independently and sequentially; a failure
    /// is recorded in the report and the next sibling continues. An
    /// attachment that is itself the configured watermark source is
    /// rejected wholesale: a watermark is never watermarked against
    /// itself.
    pub fn apply_watermark(
        &self,
        variants: &[RasterVariant],
        config: &WatermarkConfig,
        attachment: &str,
        trigger: Trigger,
    ) -> Result<AppliedReport> {
        let mut report = AppliedReport {
            attachment: attachment.to_string(),
            trigger,
            variants: Vec::with_capacity(variants.len()),
        };

        if variants.iter().any(|v| config.is_own_source(&v.file_path)) {
            log::info!(
                "Attachment '{}' is the watermark source itself; refusing to process",
                attachment
            );
            for variant in variants {
                report.variants.push(VariantReport {
                    variant: variant.clone(),
                    outcome: Outcome::Skipped {
                        reason: "attachment is the configured watermark source".to_string(),
                    },
                });
            }
            return Ok(report);
        }

        let already_watermarked = self.store.watermarked(attachment)?;
        let identity = config.identity();
        let mut any_applied = false;

        // Flag before pixels: an interrupted run must leave watermarked
        // bytes with the flag raised, never the reverse. The next apply
        // then restores from backup instead of stacking a second overlay.
        // A store that cannot persist the flag refuses to composite.
        self.store.set_watermarked(attachment, true)?;

        for variant in variants {
            let entry = match self.apply_one(variant, config, &identity, already_watermarked) {
                Ok((width, height)) => {
                    any_applied = true;
                    VariantReport {
                        variant: RasterVariant {
                            width,
                            height,
                            ..variant.clone()
                        },
                        outcome: Outcome::Applied,
                    }
                },
                Err(e) => {
                    log::warn!(
                        "Watermarking failed for '{}': {}",
                        variant.file_path.display(),
                        e
                    );
                    VariantReport {
                        variant: variant.clone(),
                        outcome: Outcome::Failed {
                            reason: e.to_string(),
                        },
                    }
                },
            };
            report.variants.push(entry);
        }

        if !any_applied && !already_watermarked {
            // Nothing was composited; put the flag back.
            self.store.set_watermarked(attachment, false)?;
        }
        log::info!(
            "Watermarked attachment '{}': {} applied, {} failed of {} variants",
            attachment,
            report.applied(),
            report.failed(),
            report.variants.len()
        );
        Ok(report)
    }

    /// Restore one variant's pristine bytes from backup and clear the
    /// attachment's watermarked flag.
    pub fn remove_watermark(
        &self,
        variant: &RasterVariant,
        attachment: &str,
    ) -> Result<RasterVariant> {
        if !self.store.restore(&variant.file_path)? {
            return Err(Error::NoBackupAvailable(variant.file_path.clone()));
        }
        let (width, height) =
            image::image_dimensions(&variant.file_path).map_err(|e| Error::UnreadableSource {
                path: variant.file_path.clone(),
                reason: e.to_string(),
            })?;
        self.store.set_watermarked(attachment, false)?;
        log::info!(
            "Removed watermark from '{}' (attachment '{}')",
            variant.file_path.display(),
            attachment
        );
        Ok(RasterVariant {
            width,
            height,
            ..variant.clone()
        })
    }

    /// Process a single variant; returns the refreshed dimensions.
    fn apply_one(
        &self,
        variant: &RasterVariant,
        config: &WatermarkConfig,
        identity: &WatermarkIdentity,
        already_watermarked: bool,
    ) -> Result<(u32, u32)> {
        let path = &variant.file_path;

        // Reapply guard: pixels already carry the overlay, so the pristine
        // bytes must come back first. Without a backup this variant fails;
        // compositing on top would stack a second watermark.
        if already_watermarked {
            if !self.store.restore(path)? {
                return Err(Error::NoBackupAvailable(path.clone()));
            }
            log::debug!("Restored '{}' before reapply", path.display());
        }

        // Pre-composite bytes, read before anything mutates: metadata
        // capture works from these, and a missing file surfaces here.
        let original_bytes = std::fs::read(path).map_err(|e| Error::UnreadableSource {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let state = self.store.ensure_backup(path, identity)?;
        let backend = self.backends.select(&variant.mime_type)?;
        let mut canvas = backend.load(path)?;
        let (image_w, image_h) = (canvas.width(), canvas.height());

        match &config.source {
            WatermarkSource::Image { path: wm_path, .. } => {
                let wm_mime = mime_from_path(wm_path).ok_or_else(|| {
                    Error::MissingWatermarkAsset {
                        path: wm_path.clone(),
                        reason: "unrecognized file extension".to_string(),
                    }
                })?;
                let wm_backend = self.backends.select(wm_mime)?;
                let watermark =
                    wm_backend
                        .load(wm_path)
                        .map_err(|e| Error::MissingWatermarkAsset {
                            path: wm_path.clone(),
                            reason: e.to_string(),
                        })?;

                let (box_w, box_h) = compute_box_size(
                    image_w,
                    image_h,
                    watermark.width(),
                    watermark.height(),
                    config.size_policy,
                );
                let (x, y) =
                    compute_position(image_w, image_h, box_w, box_h, config.anchor, config.offset);
                log::debug!(
                    "Compositing {}x{} watermark at ({}, {}) on '{}'",
                    box_w,
                    box_h,
                    x,
                    y,
                    path.display()
                );
                let scaled = watermark.scaled(box_w, box_h);
                backend.blend(&mut canvas, &scaled, x, y, config.opacity);
            },
            WatermarkSource::Text {
                text,
                font_path,
                size,
                color,
            } => {
                let style = TextStyle::load(font_path, *color)?;
                let base = style.measure(*size, text);
                let (target_w, target_h) = compute_box_size(
                    image_w,
                    image_h,
                    (base.width.round() as u32).max(1),
                    (base.height.round() as u32).max(1),
                    config.size_policy,
                );
                let scale = fit_scale(base.width, base.height, target_w as f32, target_h as f32);
                let render_size = fitted_size(*size, scale);
                // Position from the re-measured box at the render size,
                // not the nominal one.
                let fitted = style.measure(render_size, text);
                let box_w = (fitted.width.ceil() as u32).max(1);
                let box_h = (fitted.height.ceil() as u32).max(1);
                let (x, y) =
                    compute_position(image_w, image_h, box_w, box_h, config.anchor, config.offset);
                log::debug!(
                    "Drawing text watermark at {}px ({}x{}) at ({}, {}) on '{}'",
                    render_size,
                    box_w,
                    box_h,
                    x,
                    y,
                    path.display()
                );
                backend.draw_text(&mut canvas, &style, text, render_size, x, y, config.opacity)?;
            },
        }

        let params = EncodeParams {
            quality: config.quality,
            interlace: config.interlace,
        };
        let mut encoded = backend.encode(&canvas, &variant.mime_type, &params)?;

        // JPEG keeps its EXIF/IPTC across the re-encode; other formats
        // have no marker-segment structure to preserve.
        if variant.mime_type == "image/jpeg" && metadata::is_jpeg(&original_bytes) {
            let captured = metadata::capture(&original_bytes);
            if !captured.is_empty() {
                log::debug!(
                    "Preserving {} metadata segment(s) for '{}'",
                    captured.len(),
                    path.display()
                );
            }
            encoded = metadata::splice(&encoded, &captured);
        }

        atomic_write(path, &encoded).map_err(|e| Error::EncodeFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        if state.stale {
            self.store.update_identity(path, identity)?;
        }
        Ok((canvas.width(), canvas.height()))
    }
}
