//! Time discipline: battery RTC model + network time source + monotonic
//! sub-second extrapolation.

pub mod clock;

pub use clock::{Clock, ClockState, TimeSource};
