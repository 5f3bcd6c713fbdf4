//! Endstop debouncing.
//!
//! Interrupt or edge callbacks only touch an [`EndstopLatch`]: they record the
//! raw level and bump an edge counter. The control tick drains the latch once
//! per pass and feeds the result to a [`DebouncedInput`], which promotes a raw
//! level to "confirmed" only after it stayed unchanged for the full debounce
//! window.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Mailbox between an edge interrupt and the tick.
#[derive(Debug)]
pub struct EndstopLatch {
    level: AtomicBool,
    edges: AtomicU32,
}

impl EndstopLatch {
    pub const fn new(level: bool) -> Self {
        Self {
            level: AtomicBool::new(level),
            edges: AtomicU32::new(0),
        }
    }

    /// Safe to call from interrupt context.
    pub fn record(&self, level: bool) {
        self.level.store(level, Ordering::Release);
        self.edges.fetch_add(1, Ordering::AcqRel);
    }

    /// Seeds the level from a direct pin read and drops any stale edges.
    pub fn reset(&self, level: bool) {
        self.level.store(level, Ordering::Release);
        self.edges.store(0, Ordering::Release);
    }

    /// Drains the edges like [`take`](Self::take) but reports `polled`, a
    /// level read by the tick itself. An edge that settled while the
    /// interrupt was disarmed is never recorded, so the pin read wins.
    pub fn poll(&self, polled: bool) -> RawSample {
        let edges = self.edges.swap(0, Ordering::AcqRel);
        self.level.store(polled, Ordering::Release);
        RawSample {
            level: polled,
            edges,
        }
    }

    /// Drains the edges seen since the previous call.
    pub fn take(&self) -> RawSample {
        let edges = self.edges.swap(0, Ordering::AcqRel);
        RawSample {
            level: self.level.load(Ordering::Acquire),
            edges,
        }
    }
}

/// Raw level observed by one tick, plus how many edges fired since the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub level: bool,
    pub edges: u32,
}

impl From<bool> for RawSample {
    fn from(level: bool) -> Self {
        Self { level, edges: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmedChange {
    pub level: bool,
    pub at_ms: u64,
}

#[derive(Debug, Clone)]
pub struct DebouncedInput {
    pending: bool,
    confirmed: bool,
    pending_since_ms: u64,
    debounce_ms: u64,
}

impl DebouncedInput {
    /// Seeds the confirmed level from a hardware read taken at boot or wake.
    pub fn new(initial_level: bool, debounce_ms: u64, now_ms: u64) -> Self {
        Self {
            pending: initial_level,
            confirmed: initial_level,
            pending_since_ms: now_ms,
            debounce_ms,
        }
    }

    pub fn confirmed(&self) -> bool {
        self.confirmed
    }

    pub fn sample(&mut self, raw: bool, now_ms: u64) -> Option<ConfirmedChange> {
        if raw != self.pending {
            self.pending = raw;
            self.pending_since_ms = now_ms;
            return None;
        }

        if self.pending == self.confirmed {
            return None;
        }

        if now_ms.saturating_sub(self.pending_since_ms) < self.debounce_ms {
            return None;
        }

        self.confirmed = self.pending;
        Some(ConfirmedChange {
            level: self.confirmed,
            at_ms: now_ms,
        })
    }

    /// Like [`sample`](Self::sample), but a level that bounced away and back
    /// between two ticks restarts the window.
    pub fn ingest(&mut self, sample: RawSample, now_ms: u64) -> Option<ConfirmedChange> {
        if sample.edges > 0 && sample.level == self.pending {
            self.pending_since_ms = now_ms;
        }
        self.sample(sample.level, now_ms)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn promotes_only_after_full_window() {
        let mut input = DebouncedInput::new(false, 30, 0);

        assert_eq!(input.sample(true, 100), None);
        assert_eq!(input.sample(true, 129), None);
        assert_eq!(
            input.sample(true, 130),
            Some(ConfirmedChange {
                level: true,
                at_ms: 130
            })
        );
        assert_eq!(input.sample(true, 200), None);
        assert!(input.confirmed());
    }

    #[test]
    fn bounce_at_window_boundary_restarts_the_window() {
        let mut input = DebouncedInput::new(false, 30, 0);

        assert_eq!(input.sample(true, 0), None);
        assert_eq!(input.sample(false, 29), None);
        assert_eq!(input.sample(true, 30), None);
        assert_eq!(input.sample(true, 59), None);
        assert!(!input.confirmed());
        assert!(input.sample(true, 60).is_some());
    }

    #[test]
    fn short_glitch_back_to_confirmed_level_emits_nothing() {
        let mut input = DebouncedInput::new(true, 30, 0);

        assert_eq!(input.sample(false, 10), None);
        assert_eq!(input.sample(true, 15), None);
        for now in 15..200 {
            assert_eq!(input.sample(true, now), None);
        }
        assert!(input.confirmed());
    }

    #[test]
    fn edges_between_ticks_restart_the_window() {
        let latch = EndstopLatch::new(false);
        let mut input = DebouncedInput::new(false, 30, 0);

        latch.record(true);
        assert_eq!(input.ingest(latch.take(), 0), None);

        // Bounced low and back high between ticks; level looks unchanged.
        latch.record(false);
        latch.record(true);
        assert_eq!(input.ingest(latch.take(), 25), None);
        assert_eq!(input.ingest(latch.take(), 40), None);
        assert!(input.ingest(latch.take(), 55).is_some());
    }

    #[test]
    fn latch_take_drains_edge_count() {
        let latch = EndstopLatch::new(false);
        latch.record(true);
        latch.record(false);
        latch.record(true);

        assert_eq!(
            latch.take(),
            RawSample {
                level: true,
                edges: 3
            }
        );
        assert_eq!(
            latch.take(),
            RawSample {
                level: true,
                edges: 0
            }
        );
    }

    #[test]
    fn reset_seeds_level_without_edges() {
        let latch = EndstopLatch::new(false);
        latch.record(false);

        latch.reset(true);

        assert_eq!(
            latch.take(),
            RawSample {
                level: true,
                edges: 0
            }
        );
    }

    #[test]
    fn polled_level_replaces_level_missed_by_interrupt() {
        let latch = EndstopLatch::new(false);
        let mut input = DebouncedInput::new(false, 30, 0);

        // Interrupt saw the switch seat, then was disarmed while it bounced
        // back and settled free.
        latch.record(true);
        let sample = latch.poll(false);
        assert_eq!(
            sample,
            RawSample {
                level: false,
                edges: 1
            }
        );

        assert_eq!(input.ingest(sample, 0), None);
        for now in (10..200).step_by(10) {
            assert_eq!(input.ingest(latch.poll(false), now), None);
        }
        assert!(!input.confirmed());
        assert!(!latch.take().level);
    }

    #[test]
    fn confirmed_changes_never_closer_than_window() {
        let debounce_ms = 25;
        let mut input = DebouncedInput::new(false, debounce_ms, 0);
        let mut seed: u32 = 0x2545_f491;
        let mut now = 0_u64;
        let mut last_change: Option<u64> = None;
        let mut raw = false;
        let mut changes = 0;

        for _ in 0..20_000 {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            now += u64::from(seed >> 29);
            if (seed >> 8) % 16 == 0 {
                raw = !raw;
            }

            if let Some(change) = input.sample(raw, now) {
                changes += 1;
                if let Some(previous) = last_change {
                    assert!(change.at_ms - previous >= debounce_ms);
                }
                last_change = Some(change.at_ms);
            }
        }

        assert!(changes > 0);
    }
}
