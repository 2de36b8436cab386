//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use telemetry_node::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, TnError};

// Time
pub use crate::time::clock::{Clock, ClockState, TimeSource};

// Storage
pub use crate::storage::{DrainOutcome, DrainStats, Journal, Sample, SampleSource, UploadResult};

// Uploader
pub use crate::uploader::{HttpUploadClient, UploadTransport};

// EventLog
pub use crate::eventlog::{EventLog, EventLogContext};

// Link
pub use crate::link::{LinkDriver, LinkEdge, LinkMonitor};

// Scheduler
pub use crate::scheduler::{Scheduler, SchedulerAction, SchedulerState};

// Supervisor
pub use crate::supervisor::{HeartbeatSnapshot, Supervisor};
