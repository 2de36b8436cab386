//! `SensorDriver`: the capability set `{initialize, sample, current_value}`
//! spec.md's Design Notes ask for, as a tagged variant selected at boot.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::core::errors::Result;
use crate::sensors::pulse::PulseCounter;
use crate::storage::sample::Measurement;

/// Selected at boot by configuration; never open-ended inheritance
/// (spec.md §9 Design Notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Real,
    Simulation,
}

impl FromStr for Mode {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "REAL" => Ok(Self::Real),
            "SIMULATION" => Ok(Self::Simulation),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Real => "REAL",
            Self::Simulation => "SIMULATION",
        })
    }
}

/// Which of the three physical measurements a driver instance produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Flow,
    Temperature,
    Voltage,
}

impl SensorKind {
    #[must_use]
    pub const fn measurement(self) -> Measurement {
        match self {
            Self::Flow => Measurement::Caudal,
            Self::Temperature => Measurement::Temperatura,
            Self::Voltage => Measurement::Voltaje,
        }
    }

    #[must_use]
    pub const fn stable_tag(self) -> &'static str {
        match self {
            Self::Flow => "YF-S201",
            Self::Temperature => "MAX6675",
            Self::Voltage => "ACS712",
        }
    }
}

/// The interface the core consumes — acquisition itself is an
/// out-of-scope external collaborator (spec.md §1).
pub trait SensorDriver {
    fn initialize(&mut self) -> Result<()>;
    fn sample(&mut self) -> f32;
    fn current_value(&self) -> f32;
}

/// A deterministic stand-in used when configuration selects
/// [`Mode::Simulation`], and by tests.
pub struct SimulatedSensor {
    kind: SensorKind,
    last_value: f32,
}

impl SimulatedSensor {
    #[must_use]
    pub const fn new(kind: SensorKind) -> Self {
        let baseline = match kind {
            SensorKind::Flow => 0.0,
            SensorKind::Temperature => 22.0,
            SensorKind::Voltage => 230.0,
        };
        Self {
            kind,
            last_value: baseline,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> SensorKind {
        self.kind
    }
}

impl SensorDriver for SimulatedSensor {
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn sample(&mut self) -> f32 {
        let jitter: f32 = (rand::random::<f32>() - 0.5) * sim_jitter_scale(self.kind);
        self.last_value = (self.last_value + jitter).max(0.0);
        self.last_value
    }

    fn current_value(&self) -> f32 {
        self.last_value
    }
}

/// YF-S201 calibration constant, per
/// `examples/original_source/src/sensores_CAUDALIMETRO_YF-S201.cpp`'s
/// `#define FACTOR_CAUDAL 7.5`: `caudalLPM = pulsosLeidos / FACTOR_CAUDAL`,
/// i.e. pulses accumulated since the last read, divided by 7.5, yields
/// liters per minute directly (no separate elapsed-time division — the
/// original bakes the sampling period into the constant itself).
pub const DEFAULT_FACTOR_CAUDAL: f32 = 7.5;

/// Converts a shared [`PulseCounter`] into a flow-rate reading (liters per
/// minute) once per sampling period, via `snapshot_and_clear` — the only
/// interrupt-shared state in the system (spec.md §5, §9 Design Notes).
/// Selected at boot when configuration asks for [`Mode::Real`] on the flow
/// channel; the pulse edges themselves still have to come from an external
/// driver this core does not model (spec.md §1 out-of-scope collaborator).
pub struct PulseFlowSensor {
    counter: Arc<PulseCounter>,
    factor_caudal: f32,
    last_value: f32,
}

impl PulseFlowSensor {
    #[must_use]
    pub fn new(counter: Arc<PulseCounter>, factor_caudal: f32) -> Self {
        Self {
            counter,
            factor_caudal,
            last_value: 0.0,
        }
    }
}

impl SensorDriver for PulseFlowSensor {
    fn initialize(&mut self) -> Result<()> {
        let _ = self.counter.snapshot_and_clear();
        Ok(())
    }

    fn sample(&mut self) -> f32 {
        let pulses = self.counter.snapshot_and_clear();
        #[allow(clippy::cast_precision_loss)]
        let lpm = pulses as f32 / self.factor_caudal.max(f32::EPSILON);
        self.last_value = lpm;
        self.last_value
    }

    fn current_value(&self) -> f32 {
        self.last_value
    }
}

const fn sim_jitter_scale(kind: SensorKind) -> f32 {
    match kind {
        SensorKind::Flow => 0.5,
        SensorKind::Temperature => 0.2,
        SensorKind::Voltage => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("real".parse::<Mode>(), Ok(Mode::Real));
        assert_eq!("SIMULATION".parse::<Mode>(), Ok(Mode::Simulation));
        assert!("bogus".parse::<Mode>().is_err());
    }

    #[test]
    fn sensor_kind_maps_to_stable_measurement_and_tag() {
        assert_eq!(SensorKind::Flow.measurement(), Measurement::Caudal);
        assert_eq!(SensorKind::Flow.stable_tag(), "YF-S201");
        assert_eq!(SensorKind::Voltage.measurement(), Measurement::Voltaje);
    }

    #[test]
    fn simulated_sensor_produces_non_negative_samples() {
        let mut sensor = SimulatedSensor::new(SensorKind::Temperature);
        sensor.initialize().unwrap();
        for _ in 0..50 {
            assert!(sensor.sample() >= 0.0);
        }
        assert_eq!(sensor.current_value(), sensor.last_value);
    }

    #[test]
    fn pulse_flow_sensor_converts_pulses_to_rate_and_clears_counter() {
        let counter = Arc::new(PulseCounter::new());
        counter.increment();
        counter.increment();
        let mut sensor = PulseFlowSensor::new(Arc::clone(&counter), DEFAULT_FACTOR_CAUDAL);
        sensor.initialize().unwrap();

        for _ in 0..15 {
            counter.increment();
        }
        let rate = sensor.sample();
        assert!((rate - 2.0).abs() < 1e-6);
        assert_eq!(sensor.current_value(), rate);
        assert_eq!(counter.snapshot_and_clear(), 0);
    }
}
