//! Structured forensic event log: severity inference, coalescing,
//! rate-limiting, RAM-spill, and daily/size rotation (spec.md §4.4).

pub mod coalesce;
pub mod log;
pub mod record;

pub use coalesce::{CoalesceDecision, CoalesceTable};
pub use log::{EventLog, EventLogContext, EVENTLOG_CSV_HEADER};
pub use record::{EventRecord, Severity};
