//! Crash-safe byte cursors: `P.idx` holds the byte offset of the first
//! unacknowledged record in journal file `P`.
//!
//! Updated via write-temp-then-rename (spec.md §4.2, §5 resource policy),
//! grounded on the teacher's `logger::jsonl::rotated_name`/`open_append`
//! style of deriving sibling filenames from a base path.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::core::errors::{Result, TnError};

/// A cursor bound to a specific journal file path.
#[derive(Debug, Clone)]
pub struct Cursor {
    idx_path: PathBuf,
}

impl Cursor {
    /// Derive the companion `.idx` path for a journal file.
    #[must_use]
    pub fn idx_path_for(journal_path: &Path) -> PathBuf {
        let mut name = journal_path.as_os_str().to_os_string();
        name.push(".idx");
        PathBuf::from(name)
    }

    #[must_use]
    pub fn for_journal(journal_path: &Path) -> Self {
        Self {
            idx_path: Self::idx_path_for(journal_path),
        }
    }

    /// Read the stored offset. A missing or empty/unparseable cursor file
    /// is reported as `None` — callers treat that as `cursor ==
    /// header_end_offset` (spec.md §4.2).
    pub fn read(&self) -> Result<Option<u64>> {
        match fs::read_to_string(&self.idx_path) {
            Ok(raw) => Ok(raw.trim().parse::<u64>().ok()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(TnError::io(&self.idx_path, source)),
        }
    }

    /// Atomically write a new offset: write `P.idx.tmp`, remove any
    /// existing `P.idx`, then rename the temp file into place.
    pub fn write(&self, offset: u64) -> Result<()> {
        let tmp_path = {
            let mut name = self.idx_path.as_os_str().to_os_string();
            name.push(".tmp");
            PathBuf::from(name)
        };

        let mut file = fs::File::create(&tmp_path).map_err(|e| TnError::io(&tmp_path, e))?;
        writeln!(file, "{offset}").map_err(|e| TnError::io(&tmp_path, e))?;
        file.sync_all().map_err(|e| TnError::io(&tmp_path, e))?;
        drop(file);

        if self.idx_path.exists() {
            fs::remove_file(&self.idx_path).map_err(|e| TnError::io(&self.idx_path, e))?;
        }
        fs::rename(&tmp_path, &self.idx_path).map_err(|e| TnError::io(&self.idx_path, e))?;
        Ok(())
    }

    /// Remove the cursor file, if present. Called on archival.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.idx_path) {
            Ok(()) => Ok(()),
            Err(_) if !self.idx_path.exists() => Ok(()),
            Err(source) => Err(TnError::io(&self.idx_path, source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_cursor_reads_as_none() {
        let dir = tempdir().unwrap();
        let journal = dir.path().join("backup_20250101.csv");
        let cursor = Cursor::for_journal(&journal);
        assert_eq!(cursor.read().unwrap(), None);
    }

    #[test]
    fn write_then_read_roundtrips() {
        let dir = tempdir().unwrap();
        let journal = dir.path().join("backup_20250101.csv");
        let cursor = Cursor::for_journal(&journal);
        cursor.write(128).unwrap();
        assert_eq!(cursor.read().unwrap(), Some(128));
    }

    #[test]
    fn write_is_idempotent_and_overwrites() {
        let dir = tempdir().unwrap();
        let journal = dir.path().join("backup_20250101.csv");
        let cursor = Cursor::for_journal(&journal);
        cursor.write(10).unwrap();
        cursor.write(20).unwrap();
        assert_eq!(cursor.read().unwrap(), Some(20));
    }

    #[test]
    fn remove_is_safe_when_absent() {
        let dir = tempdir().unwrap();
        let journal = dir.path().join("backup_20250101.csv");
        let cursor = Cursor::for_journal(&journal);
        assert!(cursor.remove().is_ok());
    }

    #[test]
    fn cursor_path_derivation() {
        let journal = Path::new("/data/backup_20250101.csv");
        assert_eq!(
            Cursor::idx_path_for(journal),
            Path::new("/data/backup_20250101.csv.idx")
        );
    }
}
