//! The one interrupt-shared value in this system: the flow sensor's pulse
//! counter (spec.md §5, §9 Design Notes).

use std::sync::atomic::{AtomicU32, Ordering};

/// An atomic counter incremented from interrupt context and read via an
/// explicit snapshot-and-clear from the cooperative context — the pattern
/// spec.md names as `disable_interrupts; snapshot; zero; enable_interrupts`.
/// No disable/enable step is needed here: the atomic swap is itself the
/// linearization point.
#[derive(Debug, Default)]
pub struct PulseCounter(AtomicU32);

impl PulseCounter {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Called once per physical pulse, from interrupt context.
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Read and zero the counter atomically. Called once per sampling step
    /// from the cooperative context.
    pub fn snapshot_and_clear(&self) -> u32 {
        self.0.swap(0, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_returns_accumulated_count_and_clears() {
        let counter = PulseCounter::new();
        counter.increment();
        counter.increment();
        counter.increment();
        assert_eq!(counter.snapshot_and_clear(), 3);
        assert_eq!(counter.snapshot_and_clear(), 0);
    }
}
