//! Second-of-minute state machine (spec.md §4.5): opens the flow sampling
//! window, triggers the two point samples, and yields to the delivery
//! retry path.
//!
//! One call to [`Scheduler::tick`] advances the machine by exactly one
//! step and returns at most one [`SchedulerAction`] for the supervisor
//! loop to carry out — this mirrors the single-threaded cooperative model
//! of spec.md §5: no suspension happens inside `tick` itself.

use crate::time::clock::LEGACY_SENTINEL_TS_US;

/// States named in spec.md §3 `SchedulerState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Init,
    Idle,
    FlowWindowOpen,
    PointTemp,
    PointVolt,
    Replay,
    RecoverStorage,
}

impl SchedulerState {
    /// Stable label attached to `EventLog` records (spec.md §4.4
    /// "current Scheduler state" cross-cutting attribute).
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::Idle => "Idle",
            Self::FlowWindowOpen => "FlowWindowOpen",
            Self::PointTemp => "PointTemp",
            Self::PointVolt => "PointVolt",
            Self::Replay => "Replay",
            Self::RecoverStorage => "RecoverStorage",
        }
    }
}

/// What the supervisor loop should do in response to one `tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerAction {
    /// Nothing to do this step.
    None,
    /// Sample the flow sensor and attempt delivery-or-journal.
    SampleFlow,
    /// Sample the thermocouple and attempt delivery-or-journal.
    SamplePointTemp,
    /// Sample the AC-voltage sensor and attempt delivery-or-journal.
    SamplePointVolt,
    /// Run one bounded drain pass over the journal.
    Drain,
    /// Sleep briefly and retry storage (re)initialization.
    RecoverStorage,
}

/// Everything the FSM needs to decide its next step. The supervisor
/// gathers this fresh each iteration from Clock/LinkMonitor/Journal.
#[derive(Debug, Clone, Copy)]
pub struct TickInput {
    /// Current second-of-minute, from Clock (or monotonic seconds if the
    /// clock is not valid, per spec.md §4.5).
    pub second_of_minute: u32,
    /// Current epoch-minute, same source as `second_of_minute`.
    pub epoch_minute: u32,
    /// `LinkMonitor::ready()`.
    pub link_ready: bool,
    /// Whether this tick observed a link `up` edge.
    pub link_up_edge: bool,
    /// Whether `Journal::enumerate_pending()` is non-empty.
    pub pending_nonempty: bool,
    /// Monotonic milliseconds, for the flow-send period and scan-period
    /// timers (never wall time — those timers must survive clock jumps).
    pub now_ms: u64,
    /// Whether storage is currently usable.
    pub storage_ok: bool,
}

/// Timing configuration the FSM is parameterized over (spec.md §6
/// `timing.*` keys).
#[derive(Debug, Clone, Copy)]
pub struct SchedulerTiming {
    pub window_flow_end_sec: u32,
    pub sample_point_temp_sec: u32,
    pub sample_point_volt_sec: u32,
    pub flow_send_period_ms: u64,
    pub scan_period_ms: u64,
}

/// The second-of-minute scheduling state machine.
pub struct Scheduler {
    state: SchedulerState,
    timing: SchedulerTiming,
    window_minute: Option<u32>,
    last_minute_temp: Option<u32>,
    last_minute_volt: Option<u32>,
    last_flow_send_ms: Option<u64>,
    last_scan_ms: u64,
}

impl Scheduler {
    #[must_use]
    pub const fn new(timing: SchedulerTiming) -> Self {
        Self {
            state: SchedulerState::Init,
            timing,
            window_minute: None,
            last_minute_temp: None,
            last_minute_volt: None,
            last_flow_send_ms: None,
            last_scan_ms: 0,
        }
    }

    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    /// Force the machine into `RecoverStorage`, per spec.md §4.7 ("if
    /// storage is unavailable at boot, start in `RecoverStorage`") and
    /// §7's `StorageUnavailable` propagation policy.
    pub fn enter_recover_storage(&mut self) {
        self.state = SchedulerState::RecoverStorage;
    }

    /// Advance the machine by one step.
    pub fn tick(&mut self, input: TickInput) -> SchedulerAction {
        match self.state {
            SchedulerState::Init => {
                self.state = SchedulerState::Idle;
                SchedulerAction::None
            }
            SchedulerState::RecoverStorage => {
                if input.storage_ok {
                    self.state = SchedulerState::Idle;
                    SchedulerAction::None
                } else {
                    SchedulerAction::RecoverStorage
                }
            }
            SchedulerState::FlowWindowOpen => self.tick_flow_window(input),
            SchedulerState::PointTemp | SchedulerState::PointVolt | SchedulerState::Replay => {
                // The sample/drain action was already returned on entry;
                // this step only closes the transient state per spec.md
                // §4.5 ("-> Idle").
                self.state = SchedulerState::Idle;
                SchedulerAction::None
            }
            SchedulerState::Idle => self.tick_idle(input),
        }
    }

    fn tick_flow_window(&mut self, input: TickInput) -> SchedulerAction {
        if input.second_of_minute > self.timing.window_flow_end_sec {
            self.state = SchedulerState::Idle;
            return SchedulerAction::None;
        }
        let due = self.last_flow_send_ms.is_none_or(|last| {
            input.now_ms.saturating_sub(last) >= self.timing.flow_send_period_ms
        });
        if due {
            self.last_flow_send_ms = Some(input.now_ms);
            SchedulerAction::SampleFlow
        } else {
            SchedulerAction::None
        }
    }

    #[allow(clippy::too_many_lines)]
    fn tick_idle(&mut self, input: TickInput) -> SchedulerAction {
        if input.second_of_minute <= self.timing.window_flow_end_sec
            && self.window_minute != Some(input.epoch_minute)
        {
            self.window_minute = Some(input.epoch_minute);
            self.state = SchedulerState::FlowWindowOpen;
            self.last_flow_send_ms = Some(input.now_ms);
            return SchedulerAction::SampleFlow;
        }

        if input.second_of_minute == self.timing.sample_point_temp_sec
            && self.last_minute_temp != Some(input.epoch_minute)
        {
            self.last_minute_temp = Some(input.epoch_minute);
            self.state = SchedulerState::PointTemp;
            return SchedulerAction::SamplePointTemp;
        }

        if input.second_of_minute == self.timing.sample_point_volt_sec
            && self.last_minute_volt != Some(input.epoch_minute)
        {
            self.last_minute_volt = Some(input.epoch_minute);
            self.state = SchedulerState::PointVolt;
            return SchedulerAction::SamplePointVolt;
        }

        if input.link_up_edge && input.storage_ok {
            self.last_scan_ms = input.now_ms;
            self.state = SchedulerState::Replay;
            return SchedulerAction::Drain;
        }

        if input.link_ready && input.pending_nonempty {
            self.last_scan_ms = input.now_ms;
            self.state = SchedulerState::Replay;
            return SchedulerAction::Drain;
        }

        if input.link_ready
            && input
                .now_ms
                .saturating_sub(self.last_scan_ms)
                > self.timing.scan_period_ms.into()
        {
            self.last_scan_ms = input.now_ms;
            self.state = SchedulerState::Replay;
            return SchedulerAction::Drain;
        }

        SchedulerAction::None
    }
}

/// Timestamp defense (spec.md §4.5): before using a sample's `ts_us`, a
/// sample must be journaled instead of delivered live if the timestamp is
/// one of the two sentinel patterns, or the clock is not valid. Returns
/// the reason code to log, or `None` if the timestamp is safe to use live.
#[must_use]
pub fn timestamp_defense_reason(ts_us: u64, clock_valid: bool) -> Option<&'static str> {
    if !clock_valid {
        Some("clock_invalid")
    } else if ts_us == 0 {
        Some("ts_zero")
    } else if ts_us == LEGACY_SENTINEL_TS_US {
        Some("ts_legacy_sentinel")
    } else {
        None
    }
}
