//! The performance agent: enablement, snapshots and time-stamp pushes.

use std::fmt;
use std::rc::Rc;

use crate::clock::Clock;
use crate::counters::DurationAccumulator;
use crate::host::{HostBindings, ProbeSink, Subscription, TaskTimeObserver};
use crate::metrics::{self, Metric};
use crate::recorder::MetricsRecorder;
use crate::state::StateStore;

/// State key under which the enabled flag is persisted.
pub const ENABLED_STATE_KEY: &str = "PerformanceAgentEnabled";

struct Registrations {
    probes: Subscription,
    tasks: Subscription,
}

/// Observes host probes while enabled and reports metric snapshots.
///
/// Every command succeeds. Repeated `enable`/`disable` calls are no-ops, and
/// counter totals survive a disable/enable cycle.
pub struct PerformanceAgent<S> {
    host: HostBindings,
    state: S,
    recorder: Rc<MetricsRecorder>,
    registrations: Option<Registrations>,
}

impl<S: StateStore> PerformanceAgent<S> {
    pub fn new(host: HostBindings, clock: Rc<dyn Clock>, state: S) -> Self {
        Self {
            host,
            state,
            recorder: Rc::new(MetricsRecorder::new(clock)),
            registrations: None,
        }
    }

    /// Re-applies the persisted enabled flag after a session restore.
    pub fn restore(&mut self) {
        if self.state.get_bool(ENABLED_STATE_KEY, false) {
            self.enable();
        }
    }

    pub fn enable(&mut self) {
        if self.is_enabled() {
            return;
        }
        self.persist(true);

        let sink: Rc<dyn ProbeSink> = self.recorder.clone();
        let observer: Rc<dyn TaskTimeObserver> = self.recorder.clone();
        self.registrations = Some(Registrations {
            probes: self.host.dispatcher.add_probe_sink(sink),
            tasks: self.host.scheduler.add_task_time_observer(observer),
        });
        self.recorder.reset_windows();
        tracing::debug!("performance agent enabled");
    }

    pub fn disable(&mut self) {
        let Some(registrations) = self.registrations.take() else {
            return;
        };
        self.persist(false);

        self.host.dispatcher.remove_probe_sink(registrations.probes);
        self.host
            .scheduler
            .remove_task_time_observer(registrations.tasks);
        tracing::debug!("performance agent disabled");
    }

    pub const fn is_enabled(&self) -> bool {
        self.registrations.is_some()
    }

    /// Returns the current snapshot, or nothing while disabled.
    ///
    /// Reading a snapshot never changes the counters.
    pub fn get_metrics(&self) -> Vec<Metric> {
        if !self.is_enabled() {
            return Vec::new();
        }
        self.recorder.with_counters(|counters| {
            metrics::collect(
                counters,
                self.host.instance_counters.as_ref(),
                self.host.document.as_ref(),
            )
        })
    }

    /// Pushes the current snapshot to the frontend, labelled with `title`.
    pub fn console_time_stamp(&self, title: &str) {
        if !self.is_enabled() {
            return;
        }
        self.host.frontend.metrics(self.get_metrics(), title);
    }

    /// A copy of the raw counters, regardless of enablement.
    pub fn counters(&self) -> DurationAccumulator {
        self.recorder.counters()
    }

    pub const fn state(&self) -> &S {
        &self.state
    }

    fn persist(&mut self, enabled: bool) {
        if let Err(err) = self.state.set_bool(ENABLED_STATE_KEY, enabled) {
            tracing::warn!(error = %err, enabled, "failed to persist agent state");
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for PerformanceAgent<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerformanceAgent")
            .field("enabled", &self.registrations.is_some())
            .field("state", &self.state)
            .field("recorder", &self.recorder)
            .finish_non_exhaustive()
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
    use crate::dispatch::{CounterTable, DocumentState, ProbeDispatcher, TaskObserverList};
    use crate::frontend::{ChannelFrontend, MetricsEvent};
    use crate::host::{DocumentTiming, InstrumentationDispatcher};
    use crate::probe::{Probe, ProbeKind};
    use crate::state::{MemoryStateStore, StateError};

    struct Harness {
        clock: Rc<ManualClock>,
        dispatcher: Rc<ProbeDispatcher>,
        scheduler: Rc<TaskObserverList>,
        counters: Rc<CounterTable>,
        document: Rc<DocumentState>,
        events: flume::Receiver<MetricsEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let (_frontend, events) = ChannelFrontend::new();
            Self {
                clock: Rc::new(ManualClock::new(0.0)),
                dispatcher: Rc::new(ProbeDispatcher::new()),
                scheduler: Rc::new(TaskObserverList::new()),
                counters: Rc::new(CounterTable::with_names(["Document", "Node"])),
                document: Rc::new(DocumentState::new()),
                events,
            }
        }

        fn agent<S: StateStore>(&mut self, state: S) -> PerformanceAgent<S> {
            let (frontend, events) = ChannelFrontend::new();
            self.events = events;
            let host = HostBindings {
                dispatcher: self.dispatcher.clone(),
                scheduler: self.scheduler.clone(),
                instance_counters: self.counters.clone(),
                document: self.document.clone(),
                frontend: Rc::new(frontend),
            };
            PerformanceAgent::new(host, self.clock.clone(), state)
        }

        fn span(&self, kind: ProbeKind, start: f64, end: f64) {
            let probe = Probe::new(kind);
            self.clock.set(start);
            self.dispatcher.will(&probe);
            self.clock.set(end);
            self.dispatcher.did(&probe);
        }
    }

    fn value(metrics: &[Metric], name: &str) -> Option<f64> {
        metrics.iter().find(|m| m.name == name).map(|m| m.value)
    }

    #[test]
    fn fresh_agent_is_disabled_and_reports_nothing() {
        let mut harness = Harness::new();
        let agent = harness.agent(MemoryStateStore::new());
        assert!(!agent.is_enabled());
        assert!(agent.get_metrics().is_empty());
    }

    #[test]
    fn enable_twice_registers_once() {
        let mut harness = Harness::new();
        let mut agent = harness.agent(MemoryStateStore::new());

        agent.enable();
        agent.enable();

        assert!(agent.is_enabled());
        assert_eq!(harness.dispatcher.sink_count(), 1);
        assert_eq!(harness.scheduler.observer_count(), 1);
        assert_eq!(agent.state().writes(), 1);
        assert!(agent.state().get_bool(ENABLED_STATE_KEY, false));
    }

    #[test]
    fn disable_while_disabled_is_noop() {
        let mut harness = Harness::new();
        let mut agent = harness.agent(MemoryStateStore::new());

        agent.disable();

        assert!(!agent.is_enabled());
        assert_eq!(agent.state().writes(), 0);
    }

    #[test]
    fn disable_detaches_and_keeps_totals() {
        let mut harness = Harness::new();
        let mut agent = harness.agent(MemoryStateStore::new());
        agent.enable();
        harness.span(ProbeKind::UpdateLayout, 0.0, 2.0);

        agent.disable();
        harness.span(ProbeKind::UpdateLayout, 3.0, 10.0);

        assert_eq!(harness.dispatcher.sink_count(), 0);
        assert_eq!(harness.scheduler.observer_count(), 0);
        assert!(!agent.state().get_bool(ENABLED_STATE_KEY, true));
        assert_eq!(agent.counters().layout().duration, 2.0);

        agent.enable();
        let metrics = agent.get_metrics();
        assert_eq!(value(&metrics, "LayoutDuration"), Some(2.0));
        assert_eq!(value(&metrics, "LayoutCount"), Some(1.0));
    }

    #[test]
    fn nested_layout_reports_outer_span() {
        let mut harness = Harness::new();
        let mut agent = harness.agent(MemoryStateStore::new());
        agent.enable();

        let outer = Probe::new(ProbeKind::UpdateLayout);
        let inner = Probe::new(ProbeKind::UpdateLayout);
        harness.dispatcher.will(&outer);
        harness.clock.set(1.0);
        harness.dispatcher.will(&inner);
        harness.clock.set(3.0);
        harness.dispatcher.did(&inner);
        harness.clock.set(5.0);
        harness.dispatcher.did(&outer);

        let metrics = agent.get_metrics();
        assert_eq!(value(&metrics, "LayoutDuration"), Some(5.0));
        assert_eq!(value(&metrics, "LayoutCount"), Some(1.0));
    }

    #[test]
    fn nested_recalc_style_reports_every_span() {
        let mut harness = Harness::new();
        let mut agent = harness.agent(MemoryStateStore::new());
        agent.enable();

        let outer = Probe::new(ProbeKind::RecalculateStyle);
        let inner = Probe::new(ProbeKind::RecalculateStyle);
        harness.dispatcher.will(&outer);
        harness.clock.set(1.0);
        harness.dispatcher.will(&inner);
        harness.clock.set(2.0);
        harness.dispatcher.did(&inner);
        harness.clock.set(4.0);
        harness.dispatcher.did(&outer);

        let metrics = agent.get_metrics();
        assert_eq!(value(&metrics, "RecalcStyleCount"), Some(2.0));
        assert_eq!(value(&metrics, "RecalcStyleDuration"), Some(5.0));
    }

    #[test]
    fn task_pairing_through_scheduler() {
        let mut harness = Harness::new();
        let mut agent = harness.agent(MemoryStateStore::new());
        agent.enable();

        harness.scheduler.will_process_task(10.0);
        harness.scheduler.did_process_task(10.0, 15.0);
        assert_eq!(value(&agent.get_metrics(), "TaskDuration"), Some(5.0));

        harness.scheduler.will_process_task(20.0);
        harness.scheduler.did_process_task(999.0, 1000.0);
        assert_eq!(value(&agent.get_metrics(), "TaskDuration"), Some(5.0));
    }

    #[test]
    fn enable_forgets_stale_task_window() {
        let mut harness = Harness::new();
        let mut agent = harness.agent(MemoryStateStore::new());
        agent.enable();
        harness.scheduler.will_process_task(10.0);
        agent.disable();
        agent.enable();

        harness.scheduler.did_process_task(10.0, 12.0);

        assert_eq!(agent.counters().task().duration, 0.0);
    }

    #[test]
    fn snapshot_is_a_pure_read() {
        let mut harness = Harness::new();
        let mut agent = harness.agent(MemoryStateStore::new());
        agent.enable();
        harness.span(ProbeKind::ExecuteScript, 0.0, 1.5);
        harness.span(ProbeKind::RecalculateStyle, 2.0, 2.5);

        let before = agent.counters();
        let first = agent.get_metrics();
        let second = agent.get_metrics();

        assert_eq!(first, second);
        assert_eq!(agent.counters(), before);
    }

    #[test]
    fn snapshot_order_and_document_metrics() {
        let mut harness = Harness::new();
        let mut agent = harness.agent(MemoryStateStore::new());
        agent.enable();
        harness.counters.set("Node", 7);

        let names: Vec<String> = agent.get_metrics().into_iter().map(|m| m.name).collect();
        assert_eq!(
            names,
            [
                "DocumentCount",
                "NodeCount",
                "LayoutCount",
                "RecalcStyleCount",
                "LayoutDuration",
                "RecalcStyleDuration",
                "ScriptDuration",
                "TaskDuration",
            ]
        );

        harness.document.load(DocumentTiming {
            first_meaningful_paint: 0.25,
            dom_content_loaded: 0.5,
        });
        let metrics = agent.get_metrics();
        assert_eq!(metrics.len(), 10);
        assert_eq!(value(&metrics, "NodeCount"), Some(7.0));
        assert_eq!(value(&metrics, "FirstMeaningfulPaint"), Some(0.25));
        assert_eq!(value(&metrics, "DomContentLoaded"), Some(0.5));
    }

    #[test]
    fn depths_return_to_zero_after_well_formed_pairs() {
        let mut harness = Harness::new();
        let mut agent = harness.agent(MemoryStateStore::new());
        agent.enable();

        {
            let _script = harness.dispatcher.scope(ProbeKind::ExecuteScript);
            let _call = harness.dispatcher.scope(ProbeKind::CallFunction);
            let _layout = harness.dispatcher.scope(ProbeKind::UpdateLayout);
            let _nested = harness.dispatcher.scope(ProbeKind::UpdateLayout);
            let _style = harness.dispatcher.scope(ProbeKind::RecalculateStyle);
        }

        let counters = agent.counters();
        for counter in [
            counters.script(),
            counters.layout(),
            counters.recalc_style(),
            counters.task(),
        ] {
            assert_eq!(counter.active_depth, 0);
        }
    }

    #[test]
    fn time_stamp_pushes_only_while_enabled() {
        let mut harness = Harness::new();
        let mut agent = harness.agent(MemoryStateStore::new());

        agent.console_time_stamp("ignored");
        assert!(harness.events.try_recv().is_err());

        agent.enable();
        harness.span(ProbeKind::CallFunction, 0.0, 0.5);
        agent.console_time_stamp("checkpoint");

        let event = harness.events.try_recv().unwrap();
        assert_eq!(event.title, "checkpoint");
        assert_eq!(event.metrics, agent.get_metrics());
        assert_eq!(value(&event.metrics, "ScriptDuration"), Some(0.5));
    }

    #[test]
    fn restore_enables_from_persisted_flag() {
        let mut harness = Harness::new();
        let mut store = MemoryStateStore::new();
        store.set_bool(ENABLED_STATE_KEY, true).unwrap();

        let mut agent = harness.agent(store);
        agent.restore();
        assert!(agent.is_enabled());

        agent.enable();
        assert_eq!(harness.dispatcher.sink_count(), 1);

        agent.disable();
        assert!(!agent.state().get_bool(ENABLED_STATE_KEY, true));
    }

    #[test]
    fn restore_leaves_agent_disabled_by_default() {
        let mut harness = Harness::new();
        let mut agent = harness.agent(MemoryStateStore::new());
        agent.restore();
        assert!(!agent.is_enabled());
        assert_eq!(harness.dispatcher.sink_count(), 0);
    }

    #[test]
    fn end_after_detach_does_not_corrupt_next_span() {
        let mut harness = Harness::new();
        let mut agent = harness.agent(MemoryStateStore::new());
        agent.enable();

        let interrupted = Probe::new(ProbeKind::UpdateLayout);
        harness.dispatcher.will(&interrupted);
        agent.disable();
        harness.dispatcher.did(&interrupted);

        agent.enable();
        harness.span(ProbeKind::UpdateLayout, 1.0, 4.0);

        assert_eq!(agent.counters().layout().duration, 3.0);
        assert_eq!(agent.counters().layout().active_depth, 0);
    }

    struct Detacher {
        dispatcher: Rc<ProbeDispatcher>,
        subscription: std::cell::RefCell<Option<Subscription>>,
    }

    impl ProbeSink for Detacher {
        fn will(&self, _probe: &Probe) {
            if let Some(subscription) = self.subscription.borrow_mut().take() {
                self.dispatcher.remove_probe_sink(subscription);
            }
        }

        fn did(&self, _probe: &Probe) {}
    }

    #[test]
    fn sink_removed_during_dispatch_is_tolerated() {
        let mut harness = Harness::new();
        let detacher = Rc::new(Detacher {
            dispatcher: harness.dispatcher.clone(),
            subscription: std::cell::RefCell::new(None),
        });
        let subscription = harness.dispatcher.add_probe_sink(detacher.clone());
        *detacher.subscription.borrow_mut() = Some(subscription);

        let mut agent = harness.agent(MemoryStateStore::new());
        agent.enable();
        harness.span(ProbeKind::UpdateLayout, 0.0, 1.0);

        assert_eq!(harness.dispatcher.sink_count(), 1);
        assert_eq!(agent.counters().layout().duration, 1.0);
        assert_eq!(agent.counters().layout().active_depth, 0);
    }

    struct FailingStore;

    impl StateStore for FailingStore {
        fn get_bool(&self, _key: &str, default: bool) -> bool {
            default
        }

        fn set_bool(&mut self, key: &str, _value: bool) -> Result<(), StateError> {
            Err(StateError::new(key, "read-only"))
        }
    }

    #[test]
    fn persistence_failure_does_not_block_enable() {
        let mut harness = Harness::new();
        let mut agent = harness.agent(FailingStore);
        agent.enable();
        assert!(agent.is_enabled());
        agent.disable();
        assert!(!agent.is_enabled());
    }
}
