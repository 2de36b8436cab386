//! `Journal`: append-only per-day files of pending samples, crash-safe
//! cursors, and the bounded drain protocol (spec.md §4.2, §4.3).

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::core::errors::{Result, TnError};
use crate::storage::cursor::Cursor;
use crate::storage::sample::{PendingRecord, RecordStatus, Sample};
use crate::storage::{JOURNAL_CSV_HEADER, PENDING_INDEX_NAME, SENT_DIR, SENT_RAW_DIR, UNSYNC_JOURNAL_NAME};

/// Result of attempting to deliver one sample, as returned by the
/// caller-supplied upload function (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadResult {
    Ok,
    TransportError,
    HttpError(u16),
    RejectedPermanently,
}

impl UploadResult {
    const fn is_success(self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Statistics from one `drain_one` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainStats {
    pub sent: usize,
    pub skipped: usize,
    pub archived: bool,
    pub new_offset: u64,
    pub made_progress: bool,
}

/// Outcome of a drain attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The link was not ready; this is a normal return, not an error.
    LinkNotReady,
    Drained(DrainStats),
}

/// Durable journal rooted at a storage directory. Owns both the data file
/// and cursor file of every `JournalFile` as a pair (spec.md §3 ownership).
pub struct Journal {
    root: PathBuf,
}

impl Journal {
    /// Open (creating if absent) a journal rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| TnError::io(&root, e))?;
        fs::create_dir_all(root.join(SENT_DIR)).map_err(|e| TnError::io(&root, e))?;
        fs::create_dir_all(root.join(SENT_RAW_DIR)).map_err(|e| TnError::io(&root, e))?;
        Ok(Self { root })
    }

    /// Construct a `Journal` handle over `root` without requiring the
    /// directories to exist yet. Used when `open` failed at boot and the
    /// scheduler enters `RecoverStorage` (spec.md §4.7) — every operation
    /// on the returned handle will surface its own I/O error until the
    /// underlying storage becomes available and `open` is retried.
    #[must_use]
    pub fn open_best_effort(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the day-named journal file for `day` (UTC), per spec.md §6.
    #[must_use]
    pub fn journal_path_for(&self, day: NaiveDate) -> PathBuf {
        self.root
            .join(format!("backup_{}.csv", day.format("%Y%m%d")))
    }

    /// Path of the journal used while the RTC is not disciplined.
    #[must_use]
    pub fn unsync_journal_path(&self) -> PathBuf {
        self.root.join(UNSYNC_JOURNAL_NAME)
    }

    /// Append one `PENDING` record. `day` selects the day-named journal; a
    /// caller passing `None` routes the record into `backup_unsync.csv`
    /// regardless of wall time (spec.md §8 boundary behavior).
    pub fn store(&self, sample: Sample, day: Option<NaiveDate>) -> Result<PathBuf> {
        let path = day.map_or_else(|| self.unsync_journal_path(), |d| self.journal_path_for(d));
        let record = PendingRecord::new_pending(sample);
        self.append_record(&path, &record)?;
        self.note_pending(&path);
        Ok(path)
    }

    /// Append `path` to the `pendientes.idx` hint file if it is not already
    /// listed (spec.md §3 `PendingIndex`: "a hint, not a source of truth").
    /// Best-effort: any failure here is swallowed, since `enumerate_pending`
    /// never consults this file and the system's correctness never depends
    /// on it.
    fn note_pending(&self, path: &Path) {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        let idx_path = self.root.join(PENDING_INDEX_NAME);
        let already_listed = fs::read_to_string(&idx_path)
            .map(|raw| raw.lines().any(|line| line == name))
            .unwrap_or(false);
        if already_listed {
            return;
        }
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&idx_path) {
            let _ = writeln!(file, "{name}");
        }
    }

    /// Directory scan for files with outstanding work: day-named journals
    /// (excluding legacy `1970`-dated names) plus the unsync journal, where
    /// the cursor is missing or `cursor < size` (spec.md §4.2).
    pub fn enumerate_pending(&self) -> Result<Vec<PathBuf>> {
        let mut candidates = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|e| TnError::io(&self.root, e))? {
            let entry = entry.map_err(|e| TnError::io(&self.root, e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if is_day_journal_name(&name) || name == UNSYNC_JOURNAL_NAME {
                candidates.push(self.root.join(name));
            }
        }
        candidates.sort();

        let mut pending = Vec::new();
        for path in candidates {
            let size = fs::metadata(&path).map_err(|e| TnError::io(&path, e))?.len();
            let cursor = Cursor::for_journal(&path);
            let offset = cursor.read()?.unwrap_or(0);
            if offset < size {
                pending.push(path);
            }
        }
        Ok(pending)
    }

    /// Bounded drain pass over `path`: deliver up to `max_records` pending
    /// lines through `upload_fn`, advancing the cursor exactly past the
    /// last delivered record (spec.md §4.3).
    pub fn drain_one(
        &self,
        path: &Path,
        max_records: usize,
        link_ready: bool,
        mut upload_fn: impl FnMut(&Sample) -> UploadResult,
        mut ack_ts_fn: impl FnMut() -> u64,
    ) -> Result<DrainOutcome> {
        if !link_ready {
            return Ok(DrainOutcome::LinkNotReady);
        }

        let size0 = fs::metadata(path).map_err(|e| TnError::io(path, e))?.len();
        let cursor = Cursor::for_journal(path);
        let header_end = header_end_offset();
        let off = cursor.read()?.unwrap_or(header_end).min(size0);

        if off >= size0 {
            self.archive(path, &cursor)?;
            return Ok(DrainOutcome::Drained(DrainStats {
                archived: true,
                new_offset: off,
                ..DrainStats::default()
            }));
        }

        let mut file = File::open(path).map_err(|e| TnError::io(path, e))?;
        file.seek(SeekFrom::Start(off))
            .map_err(|e| TnError::io(path, e))?;
        let mut reader = BufReader::new(file);

        let mut sent = 0usize;
        let mut skipped = 0usize;
        let mut new_offset = off;
        let mut pos = off;
        let mut processed = 0usize;

        loop {
            if processed >= max_records {
                break;
            }
            let line_start = pos;
            let mut raw_line = String::new();
            let bytes_read = reader
                .read_line(&mut raw_line)
                .map_err(|e| TnError::io(path, e))?;
            if bytes_read == 0 {
                break;
            }
            let line_end = line_start + bytes_read as u64;
            pos = line_end;
            processed += 1;

            let Some(record) = PendingRecord::parse_csv_line(&raw_line) else {
                skipped += 1;
                new_offset = line_end;
                continue;
            };
            if record.status != RecordStatus::Pending {
                skipped += 1;
                new_offset = line_end;
                continue;
            }

            match upload_fn(&record.sample) {
                result if result.is_success() => {
                    let mut acked = record.clone();
                    acked.status = RecordStatus::Sent;
                    acked.ts_ack_us = ack_ts_fn();
                    self.append_audit(path, &acked)?;
                    sent += 1;
                    new_offset = line_end;
                }
                _ => {
                    new_offset = line_start;
                    break;
                }
            }
        }
        drop(reader);

        let size1 = fs::metadata(path).map_err(|e| TnError::io(path, e))?.len();

        if new_offset > off {
            cursor.write(new_offset)?;
        }

        let mut archived = false;
        if new_offset >= size1 {
            self.archive(path, &cursor)?;
            archived = true;
        }

        Ok(DrainOutcome::Drained(DrainStats {
            sent,
            skipped,
            archived,
            new_offset,
            made_progress: sent > 0 || skipped > 0,
        }))
    }

    fn archive(&self, path: &Path, cursor: &Cursor) -> Result<()> {
        cursor.remove()?;
        let Some(name) = path.file_name() else {
            return Err(TnError::StorageFormatMismatch {
                path: path.to_path_buf(),
                details: "journal path has no file name".to_string(),
            });
        };
        let dest = self.root.join(SENT_RAW_DIR).join(name);
        fs::rename(path, &dest).map_err(|e| TnError::io(&dest, e))?;
        Ok(())
    }

    fn append_audit(&self, journal_path: &Path, record: &PendingRecord) -> Result<()> {
        let Some(name) = journal_path.file_name() else {
            return Err(TnError::StorageFormatMismatch {
                path: journal_path.to_path_buf(),
                details: "journal path has no file name".to_string(),
            });
        };
        let audit_path = self.root.join(SENT_DIR).join(name);
        self.append_record(&audit_path, record)
    }

    fn append_record(&self, path: &Path, record: &PendingRecord) -> Result<()> {
        self.ensure_header(path)?;
        let line = format!("{}\n", record.to_csv_line());
        self.append_line(path, &line)
    }

    /// Ensure `path` exists and carries exactly one header line. Per
    /// spec.md §4.2/§7: a zero-byte file (crash before the header write
    /// completed) is healed by writing the header, not treated as an error.
    fn ensure_header(&self, path: &Path) -> Result<()> {
        let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if size > 0 {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| TnError::io(path, e))?;
        file.write_all(JOURNAL_CSV_HEADER.as_bytes())
            .map_err(|e| TnError::io(path, e))?;
        file.sync_all().map_err(|e| TnError::io(path, e))?;
        Ok(())
    }

    /// Append one line, falling back to open-for-write + seek(size) if the
    /// append mode fails to open (spec.md §4.2 step 2), then verify the
    /// post-close size grew by at least the line length.
    fn append_line(&self, path: &Path, line: &str) -> Result<()> {
        let size_before = fs::metadata(path).map(|m| m.len()).unwrap_or(0);

        let mut file = match OpenOptions::new().append(true).open(path) {
            Ok(f) => f,
            Err(_) => {
                let mut f = OpenOptions::new()
                    .write(true)
                    .open(path)
                    .map_err(|e| TnError::io(path, e))?;
                f.seek(SeekFrom::Start(size_before))
                    .map_err(|e| TnError::io(path, e))?;
                f
            }
        };
        file.write_all(line.as_bytes())
            .map_err(|e| TnError::io(path, e))?;
        file.sync_all().map_err(|e| TnError::io(path, e))?;
        drop(file);

        let size_after = fs::metadata(path).map_err(|e| TnError::io(path, e))?.len();
        if size_after < size_before + line.len() as u64 {
            return Err(TnError::StorageUnavailable {
                path: path.to_path_buf(),
                details: "post-write size did not grow by the formatted line length".to_string(),
            });
        }
        Ok(())
    }
}

/// The header is a fixed, bit-exact constant; its length is the
/// header-end offset every cursor is initialized against.
fn header_end_offset() -> u64 {
    JOURNAL_CSV_HEADER.len() as u64
}

fn is_day_journal_name(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("backup_") else {
        return false;
    };
    let Some(digits) = rest.strip_suffix(".csv") else {
        return false;
    };
    digits.len() == 8 && digits.chars().all(|c| c.is_ascii_digit()) && !digits.contains("1970")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sample::{Measurement, SampleSource};
    use tempfile::tempdir;

    fn sample(ts_us: u64) -> Sample {
        Sample {
            ts_us,
            measurement: Measurement::Caudal,
            sensor: "YF-S201".to_string(),
            value: 1.23,
            source: SampleSource::Wifi,
        }
    }

    #[test]
    fn store_creates_header_exactly_once() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path()).unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 8, 21).unwrap();
        journal.store(sample(1), Some(day)).unwrap();
        journal.store(sample(2), Some(day)).unwrap();

        let contents = fs::read_to_string(journal.journal_path_for(day)).unwrap();
        assert_eq!(contents.matches(JOURNAL_CSV_HEADER.trim_end()).count(), 1);
        assert_eq!(contents.lines().count(), 3);
    }

    #[test]
    fn unsync_store_routes_to_unsync_file() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path()).unwrap();
        journal.store(sample(1), None).unwrap();
        assert!(journal.unsync_journal_path().exists());
    }

    #[test]
    fn enumerate_pending_finds_undrained_files() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path()).unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 8, 21).unwrap();
        journal.store(sample(1), Some(day)).unwrap();

        let pending = journal.enumerate_pending().unwrap();
        assert_eq!(pending, vec![journal.journal_path_for(day)]);
    }

    #[test]
    fn enumerate_pending_excludes_legacy_1970_names() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path()).unwrap();
        fs::write(dir.path().join("backup_19700101.csv"), JOURNAL_CSV_HEADER).unwrap();
        let pending = journal.enumerate_pending().unwrap();
        assert!(pending.is_empty());
    }

    #[test]
    fn drain_one_refuses_when_link_not_ready() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path()).unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 8, 21).unwrap();
        let path = journal.store(sample(1), Some(day)).unwrap();

        let outcome = journal
            .drain_one(&path, 10, false, |_| UploadResult::Ok, || 0)
            .unwrap();
        assert_eq!(outcome, DrainOutcome::LinkNotReady);
    }

    #[test]
    fn drain_one_delivers_and_archives_on_success() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path()).unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 8, 21).unwrap();
        let path = journal.store(sample(1), Some(day)).unwrap();
        journal.store(sample(2), Some(day)).unwrap();

        let outcome = journal
            .drain_one(&path, 10, true, |_| UploadResult::Ok, || 999)
            .unwrap();
        let DrainOutcome::Drained(stats) = outcome else {
            panic!("expected Drained");
        };
        assert_eq!(stats.sent, 2);
        assert!(stats.archived);
        assert!(!path.exists());
        assert!(journal.root().join(SENT_RAW_DIR).join(path.file_name().unwrap()).exists());

        let audit = fs::read_to_string(
            journal
                .root()
                .join(SENT_DIR)
                .join(path.file_name().unwrap()),
        )
        .unwrap();
        assert_eq!(audit.lines().count(), 3); // header + 2 sent lines
    }

    #[test]
    fn drain_one_stops_and_preserves_cursor_on_failure() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path()).unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 8, 21).unwrap();
        let path = journal.store(sample(1), Some(day)).unwrap();
        journal.store(sample(2), Some(day)).unwrap();

        let mut call_count = 0;
        let outcome = journal
            .drain_one(
                &path,
                10,
                true,
                |_| {
                    call_count += 1;
                    if call_count == 1 {
                        UploadResult::Ok
                    } else {
                        UploadResult::TransportError
                    }
                },
                || 42,
            )
            .unwrap();
        let DrainOutcome::Drained(stats) = outcome else {
            panic!("expected Drained");
        };
        assert_eq!(stats.sent, 1);
        assert!(!stats.archived);

        let cursor = Cursor::for_journal(&path);
        let stored_offset = cursor.read().unwrap().unwrap();
        assert_eq!(stored_offset, stats.new_offset);
        assert!(path.exists());
    }

    #[test]
    fn malformed_and_already_sent_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path()).unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 8, 21).unwrap();
        let path = journal.journal_path_for(day);
        fs::write(
            &path,
            format!(
                "{}not,enough,fields\n1700000000000000,caudal,YF-S201,1.00,wifi,SENT,1700000000100000\n",
                JOURNAL_CSV_HEADER
            ),
        )
        .unwrap();

        let outcome = journal
            .drain_one(&path, 10, true, |_| UploadResult::Ok, || 0)
            .unwrap();
        let DrainOutcome::Drained(stats) = outcome else {
            panic!("expected Drained");
        };
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.skipped, 2);
        assert!(stats.archived);
    }

    #[test]
    fn store_records_new_files_in_pending_index_hint() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path()).unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 8, 21).unwrap();
        journal.store(sample(1), Some(day)).unwrap();
        journal.store(sample(2), Some(day)).unwrap();

        let hint = fs::read_to_string(dir.path().join(crate::storage::PENDING_INDEX_NAME)).unwrap();
        assert_eq!(hint.lines().count(), 1, "second store to the same file must not duplicate the hint");
        assert!(hint.contains("backup_20250821.csv"));
    }

    #[test]
    fn truncated_file_smaller_than_cursor_is_treated_as_drained() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path()).unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 8, 21).unwrap();
        let path = journal.store(sample(1), Some(day)).unwrap();
        let cursor = Cursor::for_journal(&path);
        let huge_offset = fs::metadata(&path).unwrap().len() + 1_000;
        cursor.write(huge_offset).unwrap();

        let outcome = journal
            .drain_one(&path, 10, true, |_| UploadResult::Ok, || 0)
            .unwrap();
        let DrainOutcome::Drained(stats) = outcome else {
            panic!("expected Drained");
        };
        assert!(stats.archived);
    }
}
