//! Sensor acquisition abstraction. Per spec.md §1, the device-specific
//! acquisition itself (pulse-counting ISR, ADC window, thermocouple SPI
//! decode) is an out-of-scope external collaborator; this module models
//! only the interface the core consumes, plus the one interrupt-shared
//! value spec.md's Design Notes ask a re-implementation to own explicitly.

pub mod driver;
pub mod pulse;

pub use driver::{
    DEFAULT_FACTOR_CAUDAL, Mode, PulseFlowSensor, SensorDriver, SensorKind, SimulatedSensor,
};
pub use pulse::PulseCounter;
