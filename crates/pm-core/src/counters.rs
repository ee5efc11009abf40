//! Per-category counts and durations.
//!
//! # Accounting rules
//!
//! Script work (function calls and script execution share one counter) and
//! layout are *guarded*: nested calls of the same category are transparent and
//! only the outermost span adds duration. Style recalculation is *unguarded*:
//! every call adds its own span and bumps the count, even when nested.

use crate::clock::Clock;
use crate::probe::{Probe, ProbeKind};

/// Count, accumulated duration and nesting depth for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CategoryCounter {
    /// Completed spans that were counted.
    pub count: u64,
    /// Accumulated seconds.
    pub duration: f64,
    /// Currently open guarded spans.
    pub active_depth: u32,
}

impl CategoryCounter {
    /// Opens a guarded span. Returns `true` for the outermost one.
    fn enter(&mut self) -> bool {
        self.active_depth = self.active_depth.saturating_add(1);
        self.active_depth == 1
    }

    /// Closes a guarded span. Returns `true` when the outermost span closed.
    ///
    /// A close with nothing open leaves the depth at zero and returns `false`.
    fn leave(&mut self) -> bool {
        match self.active_depth {
            0 => false,
            depth => {
                self.active_depth = depth - 1;
                self.active_depth == 0
            }
        }
    }

    fn record(&mut self, seconds: f64) {
        self.duration += seconds;
        self.count += 1;
    }
}

/// The full set of category counters owned by an agent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DurationAccumulator {
    script: CategoryCounter,
    layout: CategoryCounter,
    recalc_style: CategoryCounter,
    task: CategoryCounter,
}

impl DurationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles the "will" half of a probe pair.
    pub fn begin(&mut self, probe: &Probe, clock: &dyn Clock) {
        match probe.kind() {
            ProbeKind::CallFunction | ProbeKind::ExecuteScript => {
                if self.script.enter() {
                    probe.capture_start_time(clock);
                }
            }
            ProbeKind::UpdateLayout => {
                if self.layout.enter() {
                    probe.capture_start_time(clock);
                }
            }
            ProbeKind::RecalculateStyle => probe.capture_start_time(clock),
        }
    }

    /// Handles the "did" half of a probe pair.
    pub fn end(&mut self, probe: &Probe, clock: &dyn Clock) {
        match probe.kind() {
            ProbeKind::CallFunction | ProbeKind::ExecuteScript => {
                if self.script.leave() {
                    self.script.duration += probe.duration(clock).unwrap_or_default();
                }
            }
            ProbeKind::UpdateLayout => {
                if self.layout.leave() {
                    self.layout.record(probe.duration(clock).unwrap_or_default());
                }
            }
            ProbeKind::RecalculateStyle => {
                // A did without an observed will (attached mid-call) is dropped.
                if let Some(elapsed) = probe.duration(clock) {
                    self.recalc_style.record(elapsed);
                }
            }
        }
    }

    /// Adds a completed scheduled task.
    pub fn add_task(&mut self, seconds: f64) {
        self.task.record(seconds);
    }

    /// Forgets any open guarded spans without touching totals.
    pub fn reset_depths(&mut self) {
        self.script.active_depth = 0;
        self.layout.active_depth = 0;
        self.recalc_style.active_depth = 0;
        self.task.active_depth = 0;
    }

    pub const fn script(&self) -> &CategoryCounter {
        &self.script
    }

    pub const fn layout(&self) -> &CategoryCounter {
        &self.layout
    }

    pub const fn recalc_style(&self) -> &CategoryCounter {
        &self.recalc_style
    }

    pub const fn task(&self) -> &CategoryCounter {
        &self.task
    }
}

#[cfg(test)]
#[expect(
    clippy::float_cmp,
    reason = "manual clock arithmetic on small integers is exact"
)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn nested_layout_counts_outer_span_once() {
        let clock = ManualClock::new(0.0);
        let mut acc = DurationAccumulator::new();
        let outer = Probe::new(ProbeKind::UpdateLayout);
        let inner = Probe::new(ProbeKind::UpdateLayout);

        acc.begin(&outer, &clock);
        clock.set(1.0);
        acc.begin(&inner, &clock);
        assert_eq!(acc.layout().active_depth, 2);
        clock.set(3.0);
        acc.end(&inner, &clock);
        assert_eq!(acc.layout().duration, 0.0);
        clock.set(5.0);
        acc.end(&outer, &clock);

        assert_eq!(acc.layout().duration, 5.0);
        assert_eq!(acc.layout().count, 1);
        assert_eq!(acc.layout().active_depth, 0);
        assert_eq!(inner.start_time(), None);
    }

    #[test]
    fn nested_recalc_style_counts_every_span() {
        let clock = ManualClock::new(0.0);
        let mut acc = DurationAccumulator::new();
        let outer = Probe::new(ProbeKind::RecalculateStyle);
        let inner = Probe::new(ProbeKind::RecalculateStyle);

        acc.begin(&outer, &clock);
        clock.set(1.0);
        acc.begin(&inner, &clock);
        clock.set(2.0);
        acc.end(&inner, &clock);
        clock.set(4.0);
        acc.end(&outer, &clock);

        assert_eq!(acc.recalc_style().count, 2);
        assert_eq!(acc.recalc_style().duration, 5.0);
        assert_eq!(acc.recalc_style().active_depth, 0);
    }

    #[test]
    fn function_call_inside_script_shares_depth() {
        let clock = ManualClock::new(0.0);
        let mut acc = DurationAccumulator::new();
        let script = Probe::new(ProbeKind::ExecuteScript);
        let call = Probe::new(ProbeKind::CallFunction);

        acc.begin(&script, &clock);
        clock.set(2.0);
        acc.begin(&call, &clock);
        clock.set(3.0);
        acc.end(&call, &clock);
        clock.set(7.0);
        acc.end(&script, &clock);

        assert_eq!(acc.script().duration, 7.0);
        assert_eq!(acc.script().active_depth, 0);
    }

    #[test]
    fn sequential_script_spans_accumulate() {
        let clock = ManualClock::new(0.0);
        let mut acc = DurationAccumulator::new();

        for (start, end) in [(0.0, 1.0), (5.0, 7.0)] {
            let probe = Probe::new(ProbeKind::CallFunction);
            clock.set(start);
            acc.begin(&probe, &clock);
            clock.set(end);
            acc.end(&probe, &clock);
        }

        assert_eq!(acc.script().duration, 3.0);
    }

    #[test]
    fn unmatched_end_does_not_underflow_depth() {
        let clock = ManualClock::new(0.0);
        let mut acc = DurationAccumulator::new();
        let stray = Probe::new(ProbeKind::UpdateLayout);

        acc.end(&stray, &clock);
        assert_eq!(acc.layout().active_depth, 0);

        let probe = Probe::new(ProbeKind::UpdateLayout);
        acc.begin(&probe, &clock);
        clock.set(2.0);
        acc.end(&probe, &clock);

        assert_eq!(acc.layout().duration, 2.0);
        assert_eq!(acc.layout().count, 1);
    }

    #[test]
    fn unobserved_recalc_style_end_is_dropped() {
        let clock = ManualClock::new(3.0);
        let mut acc = DurationAccumulator::new();
        acc.end(&Probe::new(ProbeKind::RecalculateStyle), &clock);
        assert_eq!(acc.recalc_style().count, 0);
        assert_eq!(acc.recalc_style().duration, 0.0);
    }

    #[test]
    fn reset_depths_keeps_totals() {
        let clock = ManualClock::new(0.0);
        let mut acc = DurationAccumulator::new();
        let done = Probe::new(ProbeKind::UpdateLayout);
        acc.begin(&done, &clock);
        clock.set(1.0);
        acc.end(&done, &clock);

        let dangling = Probe::new(ProbeKind::UpdateLayout);
        acc.begin(&dangling, &clock);
        acc.reset_depths();

        assert_eq!(acc.layout().active_depth, 0);
        assert_eq!(acc.layout().duration, 1.0);
        assert_eq!(acc.layout().count, 1);
    }

    #[test]
    fn tasks_add_duration_and_count() {
        let mut acc = DurationAccumulator::new();
        acc.add_task(5.0);
        acc.add_task(0.5);
        assert_eq!(acc.task().duration, 5.5);
        assert_eq!(acc.task().count, 2);
    }
}
