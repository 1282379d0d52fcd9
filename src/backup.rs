//! Original-file backups and the per-attachment watermarked flag.
//!
//! Before the first watermark touches a variant, its on-disk bytes are
//! copied verbatim under a backup root that mirrors the upload
//! directory's relative layout (`uploads/2024/05/photo-300x200.jpg`
//! backs up to `backups/2024/05/photo-300x200.jpg`). A JSON sidecar next
//! to each backup records which watermark the file was first processed
//! with, so a settings change is detectable as a stale identity.
//!
//! The store also persists the watermarked flag per attachment — the
//! idempotency guard that tells the orchestrator a file already carries
//! the overlay and must be restored before any recomposite.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::WatermarkIdentity;
use crate::error::{Error, Result};

/// Sidecar record for one backed-up variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Path of the live file this backup protects
    pub original_path: PathBuf,
    /// Where the pristine bytes live
    pub backup_path: PathBuf,
    /// Identity of the watermark in use when the backup was taken
    pub watermark_identity: WatermarkIdentity,
}

/// Result of [`BackupStore::ensure_backup`].
#[derive(Debug)]
pub struct BackupState {
    /// The current sidecar record
    pub record: BackupRecord,
    /// True when the backup was created by this call
    pub created: bool,
    /// True when the record was taken under a different watermark
    /// identity; the backup bytes are still the true original
    pub stale: bool,
}

/// Filesystem store for pristine originals and the watermarked flag.
pub struct BackupStore {
    uploads_root: PathBuf,
    backup_root: PathBuf,
}

impl BackupStore {
    /// Create a store mirroring `uploads_root` under `backup_root`.
    pub fn new(uploads_root: impl Into<PathBuf>, backup_root: impl Into<PathBuf>) -> Self {
        Self {
            uploads_root: uploads_root.into(),
            backup_root: backup_root.into(),
        }
    }

    /// Backup location for an original: the original's path relative to
    /// the uploads root, re-rooted under the backup root. Files outside
    /// the uploads root fall back to their file name.
    pub fn backup_path_for(&self, original: &Path) -> PathBuf {
        match original.strip_prefix(&self.uploads_root) {
            Ok(relative) => self.backup_root.join(relative),
            Err(_) => {
                let name = original.file_name().unwrap_or(original.as_os_str());
                self.backup_root.join(name)
            },
        }
    }

    fn sidecar_path(backup: &Path) -> PathBuf {
        let mut s: OsString = backup.as_os_str().to_os_string();
        s.push(".json");
        PathBuf::from(s)
    }

    /// Load the sidecar record for an original, if one exists.
    pub fn record_for(&self, original: &Path) -> Result<Option<BackupRecord>> {
        let sidecar = Self::sidecar_path(&self.backup_path_for(original));
        if !sidecar.exists() {
            return Ok(None);
        }
        let data = std::fs::read(&sidecar)?;
        let record = serde_json::from_slice(&data).map_err(|e| Error::CorruptState {
            path: sidecar,
            reason: e.to_string(),
        })?;
        Ok(Some(record))
    }

    /// True when both the backup bytes and the sidecar exist.
    pub fn has_backup(&self, original: &Path) -> bool {
        let backup = self.backup_path_for(original);
        backup.exists() && Self::sidecar_path(&backup).exists()
    }

    /// Guarantee a pristine backup of `original` exists.
    ///
    /// - No record: copy the current on-disk bytes verbatim and write a
    ///   sidecar with `identity`.
    /// - Record with the same identity: no-op (the common re-save case).
    /// - Record with a different identity: left untouched — the backup is
    ///   still the true original — and returned flagged stale. The caller
    ///   restores, recomposites, then calls [`Self::update_identity`].
    pub fn ensure_backup(
        &self,
        original: &Path,
        identity: &WatermarkIdentity,
    ) -> Result<BackupState> {
        let backup = self.backup_path_for(original);
        if self.has_backup(original) {
            let record = self
                .record_for(original)?
                .ok_or_else(|| Error::NoBackupAvailable(original.to_path_buf()))?;
            let stale = &record.watermark_identity != identity;
            if stale {
                log::info!(
                    "Backup for '{}' was taken under a different watermark; keeping original bytes",
                    original.display()
                );
            }
            return Ok(BackupState {
                record,
                created: false,
                stale,
            });
        }

        if let Some(parent) = backup.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::BackupWriteFailed {
                path: backup.clone(),
                source: e,
            })?;
        }
        std::fs::copy(original, &backup).map_err(|e| Error::BackupWriteFailed {
            path: backup.clone(),
            source: e,
        })?;

        let record = BackupRecord {
            original_path: original.to_path_buf(),
            backup_path: backup.clone(),
            watermark_identity: identity.clone(),
        };
        self.write_record(&record)?;
        log::debug!(
            "Backed up '{}' to '{}'",
            original.display(),
            backup.display()
        );
        Ok(BackupState {
            record,
            created: true,
            stale: false,
        })
    }

    /// Rewrite the sidecar with a new watermark identity.
    pub fn update_identity(&self, original: &Path, identity: &WatermarkIdentity) -> Result<()> {
        let mut record = self
            .record_for(original)?
            .ok_or_else(|| Error::NoBackupAvailable(original.to_path_buf()))?;
        record.watermark_identity = identity.clone();
        self.write_record(&record)
    }

    fn write_record(&self, record: &BackupRecord) -> Result<()> {
        let sidecar = Self::sidecar_path(&record.backup_path);
        let json = serde_json::to_vec_pretty(record).map_err(|e| Error::CorruptState {
            path: sidecar.clone(),
            reason: e.to_string(),
        })?;
        atomic_write(&sidecar, &json).map_err(|e| Error::BackupWriteFailed {
            path: sidecar,
            source: e,
        })
    }

    /// Copy backup bytes back over the original.
    ///
    /// Returns `false` when no backup exists; the caller must treat that
    /// as "cannot safely reapply", never as "proceed anyway".
    pub fn restore(&self, original: &Path) -> Result<bool> {
        if !self.has_backup(original) {
            return Ok(false);
        }
        let backup = self.backup_path_for(original);
        let bytes = std::fs::read(&backup)?;
        atomic_write(original, &bytes)?;
        log::debug!("Restored '{}' from backup", original.display());
        Ok(true)
    }

    /// Delete the backup bytes and sidecar for one original. Used when
    /// the owning attachment is deleted.
    pub fn remove_backup(&self, original: &Path) -> Result<()> {
        let backup = self.backup_path_for(original);
        let sidecar = Self::sidecar_path(&backup);
        for path in [&backup, &sidecar] {
            match std::fs::remove_file(path) {
                Ok(()) => {},
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Garbage-collect everything the store holds for a deleted
    /// attachment: every variant's backup and sidecar, plus its
    /// watermarked flag.
    pub fn remove_backups<'a>(
        &self,
        originals: impl IntoIterator<Item = &'a Path>,
        attachment: &str,
    ) -> Result<()> {
        for original in originals {
            self.remove_backup(original)?;
        }
        self.set_watermarked(attachment, false)
    }

    // --- watermarked flag -------------------------------------------------

    fn flags_path(&self) -> PathBuf {
        self.backup_root.join("watermarked.json")
    }

    fn read_flags(&self) -> Result<BTreeMap<String, bool>> {
        let path = self.flags_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let data = std::fs::read(&path)?;
        serde_json::from_slice(&data).map_err(|e| Error::CorruptState {
            path,
            reason: e.to_string(),
        })
    }

    /// Whether the attachment's current full-size pixels carry the
    /// watermark.
    pub fn watermarked(&self, attachment: &str) -> Result<bool> {
        Ok(self.read_flags()?.get(attachment).copied().unwrap_or(false))
    }

    /// Set or clear the watermarked flag for an attachment.
    pub fn set_watermarked(&self, attachment: &str, value: bool) -> Result<()> {
        let mut flags = self.read_flags()?;
        if value {
            flags.insert(attachment.to_string(), true);
        } else {
            flags.remove(attachment);
        }
        let path = self.flags_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(&flags).map_err(|e| Error::CorruptState {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        atomic_write(&path, &json)?;
        Ok(())
    }
}

/// Write `bytes` to a temporary file in `path`'s directory, then rename
/// it into place. An interruption leaves either the old file or the new
/// one, never a partial write.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
