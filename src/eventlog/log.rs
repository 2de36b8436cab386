//! `EventLog`: structured forensic log with coalescing, rate limiting,
//! RAM-spill, and rotation (spec.md §4.4).
//!
//! Grounded on the teacher's `logger::jsonl::JsonlWriter` degrade/recover
//! shape (Normal ↔ spill-and-retry), re-expressed for CSV output and a
//! simpler two-state model matching spec.md's failure envelope exactly.

use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};

use crate::core::errors::{Result, TnError};
use crate::eventlog::coalesce::{CoalesceDecision, CoalesceTable};
use crate::eventlog::record::{EventRecord, Severity};

/// Bit-exact event log CSV header, per spec.md §6.
pub const EVENTLOG_CSV_HEADER: &str = "ts_iso,ts_us,level,mod,code,fsm,kv\n";

/// Bound on the RAM-spill circular buffer. Oldest entries are evicted
/// first when full (spec.md §4.4).
const RAM_SPILL_CAPACITY: usize = 256;

/// Global emission ceiling, lines per wall second (spec.md §4.4). Not a
/// named configuration option in spec.md §6 — treated as an internal
/// constant; see DESIGN.md.
const RATE_LIMIT_LINES_PER_SEC: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventLogState {
    Writing,
    Spilling,
}

/// Cross-cutting attributes auto-attached to every event (spec.md §4.4).
#[derive(Debug, Clone)]
pub struct EventLogContext {
    pub boot_id: u32,
    pub mac: String,
    pub firmware_version: String,
    pub heap_free_bytes: u64,
    pub rssi_dbm: i32,
    pub scheduler_state: String,
}

impl EventLogContext {
    #[must_use]
    pub fn new(mac: impl Into<String>, firmware_version: impl Into<String>) -> Self {
        Self {
            boot_id: rand::random(),
            mac: mac.into(),
            firmware_version: firmware_version.into(),
            heap_free_bytes: 0,
            rssi_dbm: 0,
            scheduler_state: "Init".to_string(),
        }
    }
}

struct RateLimiter {
    max_per_sec: u32,
    current_sec: u64,
    count_this_sec: u32,
}

impl RateLimiter {
    const fn new(max_per_sec: u32) -> Self {
        Self {
            max_per_sec,
            current_sec: 0,
            count_this_sec: 0,
        }
    }

    fn allow(&mut self, now_ms: u64) -> bool {
        let sec = now_ms / 1000;
        if sec != self.current_sec {
            self.current_sec = sec;
            self.count_this_sec = 0;
        }
        if self.count_this_sec >= self.max_per_sec {
            false
        } else {
            self.count_this_sec += 1;
            true
        }
    }
}

/// Structured forensic log rooted at a storage directory.
pub struct EventLog {
    root: PathBuf,
    max_bytes: u64,
    coalesce: CoalesceTable,
    rate_limiter: RateLimiter,
    ram_buffer: VecDeque<EventRecord>,
    ram_drop_counter: u64,
    rate_limited_drop_counter: u64,
    state: EventLogState,
    current_day: Option<NaiveDate>,
    current_part: u32,
    seq: u64,
    ctx: EventLogContext,
}

impl EventLog {
    /// Open (creating if absent) an event log rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, max_bytes: u64, ctx: EventLogContext) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| TnError::io(&root, e))?;
        Ok(Self {
            root,
            max_bytes,
            coalesce: CoalesceTable::new(),
            rate_limiter: RateLimiter::new(RATE_LIMIT_LINES_PER_SEC),
            ram_buffer: VecDeque::new(),
            ram_drop_counter: 0,
            rate_limited_drop_counter: 0,
            state: EventLogState::Writing,
            current_day: None,
            current_part: 0,
            seq: 0,
            ctx,
        })
    }

    pub fn set_heap_free(&mut self, bytes: u64) {
        self.ctx.heap_free_bytes = bytes;
    }

    pub fn set_rssi(&mut self, dbm: i32) {
        self.ctx.rssi_dbm = dbm;
    }

    pub fn set_scheduler_state(&mut self, state: impl Into<String>) {
        self.ctx.scheduler_state = state.into();
    }

    /// Counters reported by the supervisor heartbeat: `(ram_drops,
    /// rate_limited_drops)`.
    #[must_use]
    pub const fn drop_counters(&self) -> (u64, u64) {
        (self.ram_drop_counter, self.rate_limited_drop_counter)
    }

    #[must_use]
    pub const fn is_spilling(&self) -> bool {
        matches!(self.state, EventLogState::Spilling)
    }

    /// Emit one event. `ts_us` comes from the caller's Clock — `EventLog`
    /// does not own a clock handle (spec.md §3 ownership).
    pub fn record(&mut self, ts_us: u64, module: &str, code: &str, kv: &str) -> Result<()> {
        let now_ms = ts_us / 1000;
        let kv_with_count = match self.coalesce.check(module, code, now_ms) {
            CoalesceDecision::Suppress => return Ok(()),
            CoalesceDecision::EmitFresh => kv.to_string(),
            CoalesceDecision::EmitWithCount(n) => join_kv(kv, &format!("count={n}")),
        };

        if !self.rate_limiter.allow(now_ms) {
            self.rate_limited_drop_counter += 1;
            return Ok(());
        }

        self.seq += 1;
        let full_kv = self.attach_context(&kv_with_count);
        let record = EventRecord {
            ts_iso: iso_from_us(ts_us),
            ts_us,
            level: Severity::infer(code),
            module: module.to_string(),
            code: code.to_string(),
            state: self.ctx.scheduler_state.clone(),
            kv: full_kv,
        };
        self.append(record)
    }

    fn attach_context(&self, kv: &str) -> String {
        let context = format!(
            "boot_id={};seq={};mac={};fw={};heap_free={};rssi={}",
            self.ctx.boot_id,
            self.seq,
            self.ctx.mac,
            self.ctx.firmware_version,
            self.ctx.heap_free_bytes,
            self.ctx.rssi_dbm
        );
        join_kv(kv, &context)
    }

    fn append(&mut self, record: EventRecord) -> Result<()> {
        if self.state == EventLogState::Spilling {
            if self.flush_ram_buffer().is_ok() {
                self.state = EventLogState::Writing;
            } else {
                self.push_ram(record);
                return Ok(());
            }
        }

        match self.write_line(&record) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.state = EventLogState::Spilling;
                self.push_ram(record);
                Ok(())
            }
        }
    }

    fn push_ram(&mut self, record: EventRecord) {
        if self.ram_buffer.len() >= RAM_SPILL_CAPACITY {
            self.ram_buffer.pop_front();
            self.ram_drop_counter += 1;
        }
        self.ram_buffer.push_back(record);
    }

    fn flush_ram_buffer(&mut self) -> Result<()> {
        while let Some(record) = self.ram_buffer.front() {
            let record = record.clone();
            self.write_line(&record)?;
            self.ram_buffer.pop_front();
        }
        Ok(())
    }

    fn write_line(&mut self, record: &EventRecord) -> Result<()> {
        let day = day_from_us(record.ts_us);
        if self.current_day != Some(day) {
            self.current_day = Some(day);
            self.current_part = 0;
        }

        let mut path = self.path_for(day, self.current_part);
        ensure_header(&path)?;
        let line = format!("{}\n", record.to_csv_line());
        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

        if size > EVENTLOG_CSV_HEADER.len() as u64 && size + line.len() as u64 > self.max_bytes {
            self.current_part += 1;
            path = self.path_for(day, self.current_part);
            ensure_header(&path)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| TnError::io(&path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| TnError::io(&path, e))?;
        file.sync_all().map_err(|e| TnError::io(&path, e))?;
        Ok(())
    }

    fn path_for(&self, day: NaiveDate, part: u32) -> PathBuf {
        let stem = day.format("%Y.%m.%d");
        let name = if part == 0 {
            format!("eventlog_{stem}.csv")
        } else {
            format!("eventlog_{stem}_part{part}.csv")
        };
        self.root.join(name)
    }
}

fn ensure_header(path: &Path) -> Result<()> {
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
    file.write_all(EVENTLOG_CSV_HEADER.as_bytes())
        .map_err(|e| TnError::io(path, e))?;
    file.sync_all().map_err(|e| TnError::io(path, e))?;
    Ok(())
}

fn join_kv(base: &str, extra: &str) -> String {
    if base.is_empty() {
        extra.to_string()
    } else {
        format!("{base};{extra}")
    }
}

fn datetime_from_us(ts_us: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(ts_us / 1_000_000).ok()?;
    let nanos = u32::try_from((ts_us % 1_000_000) * 1_000).ok()?;
    DateTime::from_timestamp(secs, nanos)
}

fn iso_from_us(ts_us: u64) -> String {
    datetime_from_us(ts_us).map_or_else(
        || "1970-01-01T00:00:00.000000Z".to_string(),
        |dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
    )
}

fn day_from_us(ts_us: u64) -> NaiveDate {
    datetime_from_us(ts_us).map_or_else(
        || NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid date"),
        |dt| dt.date_naive(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ctx() -> EventLogContext {
        EventLogContext::new("AABBCCDDEEFF", "0.1.0")
    }

    const DAY_US: u64 = 1_755_734_400_000_000; // 2025-08-21T00:00:00Z

    #[test]
    fn writes_header_and_one_line() {
        let dir = tempdir().unwrap();
        let mut log = EventLog::open(dir.path(), 10_000_000, ctx()).unwrap();
        log.record(DAY_US, "API", "BOOT_OK", "k=v").unwrap();

        let path = dir.path().join("eventlog_2025.08.21.csv");
        let contents = fs::read_to_string(path).unwrap();
        assert!(contents.starts_with(EVENTLOG_CSV_HEADER));
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn repeated_events_are_coalesced() {
        let dir = tempdir().unwrap();
        let mut log = EventLog::open(dir.path(), 10_000_000, ctx()).unwrap();
        for _ in 0..500 {
            log.record(DAY_US, "API", "API_ERR", "http=500").unwrap();
        }
        let path = dir.path().join("eventlog_2025.08.21.csv");
        let contents = fs::read_to_string(path).unwrap();
        // header + exactly one emission (all 500 land in the same 2s window)
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn spills_to_ram_when_storage_unavailable() {
        let dir = tempdir().unwrap();
        let mut log = EventLog::open(dir.path(), 10_000_000, ctx()).unwrap();
        // Make the root unwritable by removing it out from under the log.
        fs::remove_dir_all(dir.path()).unwrap();

        log.record(DAY_US, "API", "BOOT_OK", "").unwrap();
        assert!(log.is_spilling());
        assert_eq!(log.drop_counters().0, 0);
    }

    #[test]
    fn ram_buffer_drains_on_recovery() {
        let dir = tempdir().unwrap();
        let mut log = EventLog::open(dir.path(), 10_000_000, ctx()).unwrap();
        fs::remove_dir_all(dir.path()).unwrap();
        log.record(DAY_US, "API", "BOOT_OK", "").unwrap();
        assert!(log.is_spilling());

        fs::create_dir_all(dir.path()).unwrap();
        log.record(DAY_US + 10_000_000, "API", "RECOVERED", "")
            .unwrap();
        assert!(!log.is_spilling());

        let path = dir.path().join("eventlog_2025.08.21.csv");
        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 3); // header + spilled + new
    }

    #[test]
    fn day_rollover_creates_new_file_with_single_header() {
        let dir = tempdir().unwrap();
        let mut log = EventLog::open(dir.path(), 10_000_000, ctx()).unwrap();
        log.record(DAY_US - 2_000_000, "SCHED", "TICK", "").unwrap();
        log.record(DAY_US + 2_000_000, "SCHED", "TICK", "").unwrap();

        let prev = fs::read_to_string(dir.path().join("eventlog_2025.08.20.csv")).unwrap();
        let next = fs::read_to_string(dir.path().join("eventlog_2025.08.21.csv")).unwrap();
        assert_eq!(prev.lines().count(), 2);
        assert_eq!(next.lines().count(), 2);
    }

    #[test]
    fn byte_ceiling_triggers_part_rotation() {
        let dir = tempdir().unwrap();
        // max_bytes small enough that a handful of lines rotate.
        let mut log = EventLog::open(dir.path(), 200, ctx()).unwrap();
        for i in 0..20 {
            log.record(
                DAY_US + u64::from(i) * 3_000_000,
                "SCHED",
                &format!("TICK_{i}"),
                "",
            )
            .unwrap();
        }
        assert!(dir.path().join("eventlog_2025.08.21_part1.csv").exists());
    }

    #[test]
    fn rate_limit_drops_are_counted() {
        let dir = tempdir().unwrap();
        let mut log = EventLog::open(dir.path(), 10_000_000, ctx()).unwrap();
        for i in 0..(RATE_LIMIT_LINES_PER_SEC + 50) {
            log.record(DAY_US, "SCHED", &format!("EVT_{i}"), "").unwrap();
        }
        assert!(log.drop_counters().1 > 0);
    }
}
