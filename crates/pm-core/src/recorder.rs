//! The probe sink and task observer the agent registers with its host.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::clock::Clock;
use crate::counters::DurationAccumulator;
use crate::host::{ProbeSink, TaskTimeObserver};
use crate::probe::Probe;

/// Applies host callbacks to the agent's counters.
///
/// Only reachable by the host while registered, so it does not check whether
/// the agent is enabled.
pub struct MetricsRecorder {
    clock: Rc<dyn Clock>,
    counters: RefCell<DurationAccumulator>,
    task_start_time: Cell<Option<f64>>,
}

impl MetricsRecorder {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            counters: RefCell::new(DurationAccumulator::new()),
            task_start_time: Cell::new(None),
        }
    }

    /// A copy of the current counters.
    pub fn counters(&self) -> DurationAccumulator {
        self.counters.borrow().clone()
    }

    /// Start time of the open task window, if any.
    pub fn task_start_time(&self) -> Option<f64> {
        self.task_start_time.get()
    }

    /// Clears transient pairing state; totals are kept.
    pub(crate) fn reset_windows(&self) {
        self.task_start_time.set(None);
        self.counters.borrow_mut().reset_depths();
    }

    pub(crate) fn with_counters<R>(&self, f: impl FnOnce(&DurationAccumulator) -> R) -> R {
        f(&self.counters.borrow())
    }
}

impl fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("counters", &self.counters.borrow())
            .field("task_start_time", &self.task_start_time.get())
            .finish_non_exhaustive()
    }
}

impl ProbeSink for MetricsRecorder {
    fn will(&self, probe: &Probe) {
        self.counters.borrow_mut().begin(probe, self.clock.as_ref());
    }

    fn did(&self, probe: &Probe) {
        self.counters.borrow_mut().end(probe, self.clock.as_ref());
    }
}

impl TaskTimeObserver for MetricsRecorder {
    fn will_process_task(&self, start_time: f64) {
        self.task_start_time.set(Some(start_time));
    }

    #[expect(
        clippy::float_cmp,
        reason = "a task is identified by its exact start timestamp"
    )]
    fn did_process_task(&self, start_time: f64, end_time: f64) {
        match self.task_start_time.get() {
            Some(open) if open == start_time => {
                self.task_start_time.set(None);
                self.counters.borrow_mut().add_task(end_time - start_time);
            }
            open => {
                tracing::trace!(
                    ?open,
                    start_time,
                    end_time,
                    "dropping task end that does not match the open window"
                );
            }
        }
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
    use crate::probe::ProbeKind;

    fn recorder() -> (Rc<ManualClock>, MetricsRecorder) {
        let clock = Rc::new(ManualClock::new(0.0));
        let recorder = MetricsRecorder::new(clock.clone());
        (clock, recorder)
    }

    #[test]
    fn matched_task_adds_duration() {
        let (_clock, recorder) = recorder();
        recorder.will_process_task(10.0);
        recorder.did_process_task(10.0, 15.0);
        assert_eq!(recorder.counters().task().duration, 5.0);
        assert_eq!(recorder.task_start_time(), None);
    }

    #[test]
    fn mismatched_task_is_dropped() {
        let (_clock, recorder) = recorder();
        recorder.will_process_task(10.0);
        recorder.did_process_task(10.0, 15.0);
        recorder.will_process_task(20.0);
        recorder.did_process_task(999.0, 1000.0);

        assert_eq!(recorder.counters().task().duration, 5.0);
        assert_eq!(recorder.task_start_time(), Some(20.0));
    }

    #[test]
    fn newer_task_begin_replaces_open_window() {
        let (_clock, recorder) = recorder();
        recorder.will_process_task(1.0);
        recorder.will_process_task(2.0);
        recorder.did_process_task(1.0, 3.0);
        recorder.did_process_task(2.0, 3.0);
        assert_eq!(recorder.counters().task().duration, 1.0);
        assert_eq!(recorder.counters().task().count, 1);
    }

    #[test]
    fn task_end_without_begin_is_dropped() {
        let (_clock, recorder) = recorder();
        recorder.did_process_task(0.0, 4.0);
        assert_eq!(recorder.counters().task().duration, 0.0);
    }

    #[test]
    fn probes_use_injected_clock() {
        let (clock, recorder) = recorder();
        let probe = Probe::new(ProbeKind::ExecuteScript);
        clock.set(2.0);
        recorder.will(&probe);
        clock.set(4.5);
        recorder.did(&probe);
        assert_eq!(recorder.counters().script().duration, 2.5);
    }

    #[test]
    fn reset_windows_clears_pairing_state_only() {
        let (clock, recorder) = recorder();
        let probe = Probe::new(ProbeKind::UpdateLayout);
        recorder.will(&probe);
        clock.set(1.0);
        recorder.did(&probe);
        recorder.will(&Probe::new(ProbeKind::UpdateLayout));
        recorder.will_process_task(3.0);

        recorder.reset_windows();

        let counters = recorder.counters();
        assert_eq!(counters.layout().active_depth, 0);
        assert_eq!(counters.layout().duration, 1.0);
        assert_eq!(recorder.task_start_time(), None);
    }
}
