//! `Supervisor`: boot sequence, error recovery, periodic time discipline,
//! and the single cooperative main loop (spec.md §4.7).
//!
//! Grounded on the teacher's `daemon::loop_main::MonitoringDaemon` for the
//! overall "boot components in order, then loop polling each subsystem"
//! shape; the subsystems themselves are this crate's own (Clock, Journal,
//! LinkMonitor, Scheduler, EventLog) rather than the teacher's ballast/scan
//! loop.

pub mod signals;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::eventlog::{EventLog, EventLogContext};
use crate::link::{LinkDriver, LinkEdge, LinkMonitor};
use crate::scheduler::{Scheduler, SchedulerAction, SchedulerTiming, TickInput, timestamp_defense_reason};
use crate::sensors::{Mode, PulseFlowSensor, PulseCounter, SensorDriver, SensorKind, SimulatedSensor};
use crate::storage::{Journal, Sample, SampleSource, UploadResult};
use crate::time::clock::{Clock, TimeSource};
use crate::uploader::UploadTransport;

/// Network time discipline runs at boot, on every link-up edge, and every
/// 6 hours thereafter (spec.md §4.1) — matches the default
/// `timing.sync_period_ms`, but this constant is the *minimum* interval a
/// periodic-only trigger re-checks, independent of config.
const HEARTBEAT_PERIOD: Duration = Duration::from_secs(60);

/// The three physical sensor channels this node owns.
struct SensorRig {
    flow: Box<dyn SensorDriver + Send>,
    temp: Box<dyn SensorDriver + Send>,
    volt: Box<dyn SensorDriver + Send>,
}

impl SensorRig {
    fn new(mode: Mode, pulses: &Arc<PulseCounter>) -> Self {
        let flow: Box<dyn SensorDriver + Send> = match mode {
            Mode::Real => Box::new(PulseFlowSensor::new(
                Arc::clone(pulses),
                crate::sensors::DEFAULT_FACTOR_CAUDAL,
            )),
            Mode::Simulation => Box::new(SimulatedSensor::new(SensorKind::Flow)),
        };
        Self {
            flow,
            temp: Box::new(SimulatedSensor::new(SensorKind::Temperature)),
            volt: Box::new(SimulatedSensor::new(SensorKind::Voltage)),
        }
    }

    fn driver_for(&mut self, kind: SensorKind) -> &mut (dyn SensorDriver + Send) {
        match kind {
            SensorKind::Flow => self.flow.as_mut(),
            SensorKind::Temperature => self.temp.as_mut(),
            SensorKind::Voltage => self.volt.as_mut(),
        }
    }
}

/// Counters surfaced on the heartbeat (spec.md §4.7, §4.4's "reported in
/// the next heartbeat" wiring for `RateLimited` drops).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatSnapshot {
    pub rssi_dbm: i32,
    pub heap_free_bytes: u64,
    pub ram_drops: u64,
    pub rate_limited_drops: u64,
    pub scheduler_state: &'static str,
}

/// Ties together every component named in spec.md §2's data-flow diagram
/// behind one cooperative loop.
pub struct Supervisor<L: LinkDriver, TS: TimeSource, U: UploadTransport> {
    config: Config,
    event_log: EventLog,
    clock: Clock,
    link: LinkMonitor<L>,
    time_source: TS,
    journal: Journal,
    storage_ok: bool,
    uploader: U,
    scheduler: Scheduler,
    sensors: SensorRig,
    pulses: Arc<PulseCounter>,
    monotonic_start: Instant,
    last_discipline: Option<Instant>,
    last_heartbeat: Option<Instant>,
    last_heartbeat_snapshot: Option<HeartbeatSnapshot>,
}

impl<L: LinkDriver, TS: TimeSource, U: UploadTransport> Supervisor<L, TS, U> {
    /// Boot sequence per spec.md §4.7: `EventLog -> Clock -> LinkMonitor ->
    /// Journal/Storage -> Scheduler`. If storage cannot be opened, the
    /// scheduler starts in `RecoverStorage` rather than aborting boot.
    pub fn boot(config: Config, link_driver: L, time_source: TS, uploader: U) -> Result<Self> {
        let ctx = EventLogContext::new(config.device.mac.clone(), config.device.firmware_version.clone());
        let event_log_root = config.storage.root.join("eventlog");
        let mut event_log = EventLog::open(event_log_root, config.storage.max_log_bytes, ctx)?;

        let clock = Clock::new(true);
        let link = LinkMonitor::new(link_driver, Duration::from_millis(config.timing.stabilize_ms));

        let timing = SchedulerTiming {
            window_flow_end_sec: config.timing.window_flow_end_sec,
            sample_point_temp_sec: config.timing.sample_point_temp_sec,
            sample_point_volt_sec: config.timing.sample_point_volt_sec,
            flow_send_period_ms: config.timing.flow_send_period_ms,
            scan_period_ms: config.timing.scan_period_ms,
        };
        let mut scheduler = Scheduler::new(timing);

        let (journal, storage_ok) = match Journal::open(&config.storage.root) {
            Ok(j) => (j, true),
            Err(e) => {
                let _ = event_log.record(0, "SUPERVISOR", "STORAGE_INIT_FAIL", &format!("err={e}"));
                scheduler.enter_recover_storage();
                (Journal::open_best_effort(&config.storage.root), false)
            }
        };

        let pulses = Arc::new(PulseCounter::new());
        // No real GPIO/ADC/SPI backend ships with this core (spec.md §1
        // Non-goals); `Mode::Real` exists so a future native integration can
        // wire a `PulseFlowSensor` over an actual interrupt line without
        // touching this boot sequence.
        let sensors = SensorRig::new(Mode::Simulation, &pulses);

        let _ = event_log.record(0, "SUPERVISOR", "BOOT_OK", "");

        Ok(Self {
            config,
            event_log,
            clock,
            link,
            time_source,
            journal,
            storage_ok,
            uploader,
            scheduler,
            sensors,
            pulses,
            monotonic_start: Instant::now(),
            last_discipline: None,
            last_heartbeat: None,
            last_heartbeat_snapshot: None,
        })
    }

    #[must_use]
    pub const fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Counters from the most recent heartbeat, for a CLI status command to
    /// surface. `None` until the first heartbeat period elapses.
    #[must_use]
    pub const fn last_heartbeat(&self) -> Option<HeartbeatSnapshot> {
        self.last_heartbeat_snapshot
    }

    #[must_use]
    pub const fn pulse_counter(&self) -> &Arc<PulseCounter> {
        &self.pulses
    }

    #[must_use]
    pub const fn scheduler_state(&self) -> crate::scheduler::SchedulerState {
        self.scheduler.state()
    }

    /// Run one step of the cooperative loop. Call this repeatedly (with a
    /// short sleep between calls) from a binary's main loop.
    pub fn run_once(&mut self, now: Instant) -> Result<()> {
        let edge = self.link.poll(now);

        if edge == LinkEdge::Up {
            self.discipline_clock();
        } else if self.link.ready() {
            let due = self
                .last_discipline
                .is_none_or(|last| now.duration_since(last) >= Duration::from_millis(self.config.timing.sync_period_ms));
            if due {
                self.discipline_clock();
            }
        }

        let (second_of_minute, epoch_minute) = self.wallclock_position(now);
        let pending_nonempty = if self.storage_ok {
            self.journal.enumerate_pending().map(|v| !v.is_empty()).unwrap_or(false)
        } else {
            false
        };
        let now_ms = duration_to_ms(now.duration_since(self.monotonic_start));

        self.event_log.set_scheduler_state(self.scheduler.state().label());

        let action = self.scheduler.tick(TickInput {
            second_of_minute,
            epoch_minute,
            link_ready: self.link.ready(),
            link_up_edge: edge == LinkEdge::Up,
            pending_nonempty,
            now_ms,
            storage_ok: self.storage_ok,
        });

        self.dispatch(action)?;
        self.maybe_heartbeat(now);
        Ok(())
    }

    fn dispatch(&mut self, action: SchedulerAction) -> Result<()> {
        match action {
            SchedulerAction::None => Ok(()),
            SchedulerAction::SampleFlow => self.sample_and_route(SensorKind::Flow),
            SchedulerAction::SamplePointTemp => self.sample_and_route(SensorKind::Temperature),
            SchedulerAction::SamplePointVolt => self.sample_and_route(SensorKind::Voltage),
            SchedulerAction::Drain => self.run_drain(),
            SchedulerAction::RecoverStorage => self.try_recover_storage(),
        }
    }

    fn sample_and_route(&mut self, kind: SensorKind) -> Result<()> {
        let value = self.sensors.driver_for(kind).sample();
        let live_ts_us = self.clock.now_us();
        let defense = timestamp_defense_reason(live_ts_us, self.clock.is_valid());

        if let Some(reason) = defense {
            self.journal_sample(kind, value, self.journal_ts_us(), reason);
            return Ok(());
        }

        if !self.link.ready() {
            self.journal_sample(kind, value, live_ts_us, "wifi_down");
            return Ok(());
        }

        let sample = Sample {
            ts_us: live_ts_us,
            measurement: kind.measurement(),
            sensor: kind.stable_tag().to_string(),
            value,
            source: SampleSource::Wifi,
        };
        match self.uploader.upload(&sample) {
            UploadResult::Ok => {
                let _ = self.event_log.record(live_ts_us, "UPLOADER", "LIVE_OK", &format!("m={}", kind.measurement()));
                Ok(())
            }
            UploadResult::TransportError => {
                self.journal_sample(kind, value, live_ts_us, "upload_transport_error");
                Ok(())
            }
            UploadResult::HttpError(status) => {
                self.journal_sample(kind, value, live_ts_us, "upload_http_error");
                let _ = self.event_log.record(live_ts_us, "UPLOADER", "API_ERR", &format!("http={status}"));
                Ok(())
            }
            UploadResult::RejectedPermanently => {
                self.journal_sample(kind, value, live_ts_us, "upload_rejected");
                Ok(())
            }
        }
    }

    fn journal_ts_us(&mut self) -> u64 {
        if self.clock.is_valid() {
            self.clock.now_us()
        } else {
            self.clock.monotonic_us()
        }
    }

    fn journal_sample(&mut self, kind: SensorKind, value: f32, ts_us: u64, reason: &'static str) {
        let sample = Sample {
            ts_us,
            measurement: kind.measurement(),
            sensor: kind.stable_tag().to_string(),
            value,
            source: SampleSource::Backup,
        };
        let day = if self.clock.is_valid() { day_from_us(ts_us) } else { None };
        match self.journal.store(sample, day) {
            Ok(_) => {
                let _ = self.event_log.record(ts_us, "SCHEDULER", "RESPALDO_STORE", &format!("reason={reason}"));
            }
            Err(e) => {
                let _ = self.event_log.record(ts_us, "JOURNAL", "STORE_FAIL", &format!("err={e}"));
                self.storage_ok = false;
                self.scheduler.enter_recover_storage();
            }
        }
    }

    fn run_drain(&mut self) -> Result<()> {
        if !self.storage_ok {
            return Ok(());
        }
        let pending = self.journal.enumerate_pending()?;
        let batch = self.config.uploader.batch_max;
        let link_ready = self.link.ready();

        let journal = &self.journal;
        let uploader = &mut self.uploader;
        let clock = &self.clock;
        let mut outcomes = Vec::with_capacity(pending.len());
        for path in pending {
            let outcome = journal.drain_one(
                &path,
                batch,
                link_ready,
                |sample| uploader.upload(sample),
                || clock.monotonic_us(),
            )?;
            outcomes.push(outcome);
        }

        for outcome in outcomes {
            if let crate::storage::DrainOutcome::Drained(stats) = outcome {
                if stats.made_progress {
                    let _ = self.event_log.record(
                        self.clock.now_us(),
                        "UPLOADER",
                        "DRAIN_PROGRESS",
                        &format!("sent={};skipped={};archived={}", stats.sent, stats.skipped, stats.archived),
                    );
                } else if link_ready {
                    let _ = self.event_log.record(self.clock.now_us(), "UPLOADER", "DRAIN_HOLD", "no_progress");
                }
            }
        }
        Ok(())
    }

    fn try_recover_storage(&mut self) -> Result<()> {
        match Journal::open(&self.config.storage.root) {
            Ok(j) => {
                self.journal = j;
                self.storage_ok = true;
                let _ = self.event_log.record(self.journal_ts_us(), "SUPERVISOR", "STORAGE_RECOVERED", "");
            }
            Err(e) => {
                let _ = self.event_log.record(0, "SUPERVISOR", "STORAGE_RECOVER_FAIL", &format!("err={e}"));
            }
        }
        Ok(())
    }

    fn discipline_clock(&mut self) {
        self.last_discipline = Some(Instant::now());
        let Some(ntp_sec) = self.time_source.fetch_unix_seconds() else {
            return;
        };
        if let Some(outcome) = self.clock.discipline_with(ntp_sec) {
            let _ = self.event_log.record(
                self.journal_ts_us(),
                "CLOCK",
                "TS_DISCIPLINE",
                &format!("applied={};delta_sec={}", outcome.applied, outcome.delta_sec),
            );
        }
    }

    fn maybe_heartbeat(&mut self, now: Instant) {
        let due = self
            .last_heartbeat
            .is_none_or(|last| now.duration_since(last) >= HEARTBEAT_PERIOD);
        if !due {
            return;
        }
        self.last_heartbeat = Some(now);
        let (ram_drops, rate_limited_drops) = self.event_log.drop_counters();
        let link_ready = self.link.ready();
        let _ = self.event_log.record(
            self.journal_ts_us(),
            "SUPERVISOR",
            "HEARTBEAT",
            &format!("ram_drops={ram_drops};rate_limited_drops={rate_limited_drops};link_ready={link_ready}"),
        );
        self.last_heartbeat_snapshot = Some(HeartbeatSnapshot {
            rssi_dbm: 0,
            heap_free_bytes: 0,
            ram_drops,
            rate_limited_drops,
            scheduler_state: self.scheduler.state().label(),
        });
    }

    fn wallclock_position(&mut self, now: Instant) -> (u32, u32) {
        let total_sec: u64 = if self.clock.is_valid() {
            self.clock.now_us() / 1_000_000
        } else {
            now.duration_since(self.monotonic_start).as_secs()
        };
        let epoch_minute = u32::try_from(total_sec / 60).unwrap_or(u32::MAX);
        #[allow(clippy::cast_possible_truncation)]
        let second_of_minute = (total_sec % 60) as u32;
        (second_of_minute, epoch_minute)
    }
}

fn day_from_us(ts_us: u64) -> Option<NaiveDate> {
    let secs = i64::try_from(ts_us / 1_000_000).ok()?;
    let nanos = u32::try_from((ts_us % 1_000_000) * 1_000).ok()?;
    DateTime::<Utc>::from_timestamp(secs, nanos).map(|dt| dt.date_naive())
}

fn duration_to_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
