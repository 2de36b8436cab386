//! Second-of-minute state machine driving sampling windows, point samples,
//! and replay (spec.md §4.5).

pub mod fsm;

pub use fsm::{
    Scheduler, SchedulerAction, SchedulerState, SchedulerTiming, TickInput,
    timestamp_defense_reason,
};
