//! Durable, append-only journaling of samples that could not be delivered
//! immediately, with crash-safe byte cursors and archival.
//!
//! Grounded on the teacher's `logger::jsonl` degradation/rotation machinery
//! (same append-verify-recover shape) and on
//! `examples/original_source/src/sdbackup.cpp` / `reenviarBackupSD.cpp` for
//! the on-disk layout and drain protocol this module re-expresses in Rust.

pub mod cursor;
pub mod journal;
pub mod sample;

pub use cursor::Cursor;
pub use journal::{DrainOutcome, DrainStats, Journal, UploadResult};
pub use sample::{Measurement, PendingRecord, RecordStatus, Sample, SampleSource};

/// Bit-exact journal CSV header, per spec.md §6. Field order: timestamp,
/// measurement, sensor, valor, source, status, ts_envio.
pub const JOURNAL_CSV_HEADER: &str = "timestamp,measurement,sensor,valor,source,status,ts_envio\n";

/// Directory (relative to storage root) holding acknowledged audit trails
/// and archived raw journals.
pub const SENT_DIR: &str = "sent";
/// Subdirectory of `sent/` holding fully-drained, archived journal files.
pub const SENT_RAW_DIR: &str = "sent/raw";
/// Journal file used while the RTC has not yet been disciplined.
pub const UNSYNC_JOURNAL_NAME: &str = "backup_unsync.csv";
/// Hint file listing journal files known to contain outstanding work.
pub const PENDING_INDEX_NAME: &str = "pendientes.idx";
