//! Bounded coalescing table suppressing repeated `(module, code)` events
//! within a fixed window (spec.md §4.4).

/// Size of the fixed coalescing table. Replacement is simplest-slot-first
/// (the entry with the fewest suppressed repeats is evicted).
const TABLE_SIZE: usize = 32;
/// Coalescing window, per spec.md §4.4 ("~2 s").
pub const COALESCE_WINDOW_MS: u64 = 2_000;

#[derive(Debug, Clone)]
struct Entry {
    module: String,
    code: String,
    last_ms: u64,
    suppressed: u32,
}

/// What the caller should do with the event that triggered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoalesceDecision {
    /// Suppress entirely; the repeat count was incremented.
    Suppress,
    /// Emit the event; no prior repeats to report.
    EmitFresh,
    /// Emit the event, annotated with how many repeats were suppressed.
    EmitWithCount(u32),
}

/// Fixed-capacity coalescing table.
pub struct CoalesceTable {
    slots: Vec<Option<Entry>>,
}

impl Default for CoalesceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CoalesceTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: vec![None; TABLE_SIZE],
        }
    }

    /// Record one occurrence of `(module, code)` at `now_ms` and decide
    /// whether to suppress or emit it.
    pub fn check(&mut self, module: &str, code: &str, now_ms: u64) -> CoalesceDecision {
        if let Some(idx) = self
            .slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|e| e.module == module && e.code == code))
        {
            let entry = self.slots[idx].as_mut().expect("checked by position");
            if now_ms.saturating_sub(entry.last_ms) < COALESCE_WINDOW_MS {
                entry.suppressed += 1;
                return CoalesceDecision::Suppress;
            }
            let suppressed = entry.suppressed;
            entry.last_ms = now_ms;
            entry.suppressed = 0;
            return if suppressed > 0 {
                CoalesceDecision::EmitWithCount(suppressed)
            } else {
                CoalesceDecision::EmitFresh
            };
        }

        let slot_idx = self
            .slots
            .iter()
            .position(Option::is_none)
            .or_else(|| {
                self.slots
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, e)| e.as_ref().map_or(0, |e| e.suppressed))
                    .map(|(i, _)| i)
            })
            .expect("table is never empty of slots");

        self.slots[slot_idx] = Some(Entry {
            module: module.to_string(),
            code: code.to_string(),
            last_ms: now_ms,
            suppressed: 0,
        });
        CoalesceDecision::EmitFresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_occurrence_emits_fresh() {
        let mut table = CoalesceTable::new();
        assert_eq!(table.check("API", "API_ERR", 0), CoalesceDecision::EmitFresh);
    }

    #[test]
    fn repeats_within_window_are_suppressed() {
        let mut table = CoalesceTable::new();
        table.check("API", "API_ERR", 0);
        assert_eq!(
            table.check("API", "API_ERR", 100),
            CoalesceDecision::Suppress
        );
        assert_eq!(
            table.check("API", "API_ERR", 500),
            CoalesceDecision::Suppress
        );
    }

    #[test]
    fn emission_after_window_reports_suppressed_count() {
        let mut table = CoalesceTable::new();
        table.check("API", "API_ERR", 0);
        table.check("API", "API_ERR", 100);
        table.check("API", "API_ERR", 200);
        let decision = table.check("API", "API_ERR", COALESCE_WINDOW_MS + 1);
        assert_eq!(decision, CoalesceDecision::EmitWithCount(2));
    }

    #[test]
    fn distinct_keys_do_not_interfere() {
        let mut table = CoalesceTable::new();
        table.check("API", "API_ERR", 0);
        assert_eq!(
            table.check("SCHED", "WINDOW_OPEN", 0),
            CoalesceDecision::EmitFresh
        );
    }

    #[test]
    fn table_evicts_simplest_slot_when_full() {
        let mut table = CoalesceTable::new();
        for i in 0..TABLE_SIZE {
            table.check("MOD", &format!("CODE_{i}"), 0);
        }
        // table is full of zero-suppressed entries; a new key must evict one
        let decision = table.check("MOD", "CODE_NEW", 0);
        assert_eq!(decision, CoalesceDecision::EmitFresh);
    }
}
