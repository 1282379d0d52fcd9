//! Error types for the watermarking engine.
//!
//! This module defines all error types that can occur while applying,
//! reapplying, or removing a watermark.

use std::path::PathBuf;

/// Result type alias for watermark engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during watermark processing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Original file missing, unreadable, or with a corrupt header
    #[error("Unreadable source '{path}': {reason}")]
    UnreadableSource {
        /// Path of the file that could not be read
        path: PathBuf,
        /// Reason the read or decode failed
        reason: String,
    },

    /// MIME type outside the supported raster set
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Configured image watermark asset absent or itself unreadable
    #[error("Missing watermark asset '{path}': {reason}")]
    MissingWatermarkAsset {
        /// Path of the configured watermark image
        path: PathBuf,
        /// Reason the asset could not be loaded
        reason: String,
    },

    /// Text watermark's font file absent or invalid
    #[error("Missing font '{path}': {reason}")]
    MissingFont {
        /// Path of the configured font file
        path: PathBuf,
        /// Reason the font could not be loaded
        reason: String,
    },

    /// Restore or reapply requested with nothing to restore from
    #[error("No backup available for '{0}'")]
    NoBackupAvailable(PathBuf),

    /// Disk or permission failure while writing a backup
    #[error("Backup write failed for '{path}': {source}")]
    BackupWriteFailed {
        /// Path of the backup that could not be written
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Final encode or write of the composited image failed
    #[error("Encode failed for '{path}': {reason}")]
    EncodeFailed {
        /// Destination path of the failed write
        path: PathBuf,
        /// Reason the encode or write failed
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// State file (backup record or flag map) could not be parsed
    #[error("Corrupt state file '{path}': {reason}")]
    CorruptState {
        /// Path of the unparseable state file
        path: PathBuf,
        /// Parse failure detail
        reason: String,
    },
}
