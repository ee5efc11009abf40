//! In-process implementations of the host interfaces.
//!
//! Embedders with their own event plumbing implement the traits in
//! [`crate::host`] directly; these cover single-threaded hosts and trace replay.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::host::{
    DocumentTiming, DocumentTimingSource, InstanceCounter, InstanceCounters,
    InstrumentationDispatcher, ProbeSink, Subscription, TaskScheduler, TaskTimeObserver,
};
use crate::observers::ObserverList;
use crate::probe::{Probe, ProbeKind};

/// Fans probe callbacks out to every registered sink.
pub struct ProbeDispatcher {
    sinks: ObserverList<dyn ProbeSink>,
}

impl ProbeDispatcher {
    pub const fn new() -> Self {
        Self {
            sinks: ObserverList::new(),
        }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn will(&self, probe: &Probe) {
        self.sinks.for_each(|sink| sink.will(probe));
    }

    pub fn did(&self, probe: &Probe) {
        self.sinks.for_each(|sink| sink.did(probe));
    }

    /// Fires `will` now and `did` when the returned guard drops.
    pub fn scope(&self, kind: ProbeKind) -> ProbeScope<'_> {
        let probe = Probe::new(kind);
        self.will(&probe);
        ProbeScope {
            dispatcher: self,
            probe,
        }
    }
}

impl Default for ProbeDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProbeDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeDispatcher")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl InstrumentationDispatcher for ProbeDispatcher {
    fn add_probe_sink(&self, sink: Rc<dyn ProbeSink>) -> Subscription {
        self.sinks.add(sink)
    }

    fn remove_probe_sink(&self, subscription: Subscription) {
        if !self.sinks.remove(&subscription) {
            tracing::trace!(id = subscription.id(), "probe sink already removed");
        }
    }
}

/// An instrumented span that closes when dropped.
#[must_use = "the span closes as soon as the scope is dropped"]
pub struct ProbeScope<'a> {
    dispatcher: &'a ProbeDispatcher,
    probe: Probe,
}

impl ProbeScope<'_> {
    pub const fn probe(&self) -> &Probe {
        &self.probe
    }
}

impl Drop for ProbeScope<'_> {
    fn drop(&mut self) {
        self.dispatcher.did(&self.probe);
    }
}

/// Fans task boundaries out to every registered observer.
pub struct TaskObserverList {
    observers: ObserverList<dyn TaskTimeObserver>,
}

impl TaskObserverList {
    pub const fn new() -> Self {
        Self {
            observers: ObserverList::new(),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn will_process_task(&self, start_time: f64) {
        self.observers
            .for_each(|observer| observer.will_process_task(start_time));
    }

    pub fn did_process_task(&self, start_time: f64, end_time: f64) {
        self.observers
            .for_each(|observer| observer.did_process_task(start_time, end_time));
    }
}

impl Default for TaskObserverList {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskObserverList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskObserverList")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl TaskScheduler for TaskObserverList {
    fn add_task_time_observer(&self, observer: Rc<dyn TaskTimeObserver>) -> Subscription {
        self.observers.add(observer)
    }

    fn remove_task_time_observer(&self, subscription: Subscription) {
        if !self.observers.remove(&subscription) {
            tracing::trace!(id = subscription.id(), "task observer already removed");
        }
    }
}

/// Live-object counters for a renderer-style host.
pub const DEFAULT_COUNTER_NAMES: [&str; 13] = [
    "AudioHandler",
    "Document",
    "Frame",
    "JSEventListener",
    "LayoutObject",
    "MediaKeySession",
    "MediaKeys",
    "Node",
    "Resource",
    "ScriptPromise",
    "SuspendableObject",
    "V8PerContextData",
    "WorkerGlobalScope",
];

/// An ordered table of named instance counters.
///
/// Counters keep the order they were declared in; setting an undeclared name
/// appends it.
#[derive(Debug, Default)]
pub struct CounterTable {
    entries: RefCell<Vec<InstanceCounter>>,
}

impl CounterTable {
    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = names
            .into_iter()
            .map(|name| InstanceCounter {
                name: name.into(),
                value: 0,
            })
            .collect();
        Self {
            entries: RefCell::new(entries),
        }
    }

    pub fn set(&self, name: &str, value: u64) {
        let mut entries = self.entries.borrow_mut();
        match entries.iter_mut().find(|counter| counter.name == name) {
            Some(counter) => counter.value = value,
            None => entries.push(InstanceCounter {
                name: name.to_string(),
                value,
            }),
        }
    }

    pub fn increment(&self, name: &str) {
        let current = self.get(name).unwrap_or(0);
        self.set(name, current.saturating_add(1));
    }

    pub fn decrement(&self, name: &str) {
        let current = self.get(name).unwrap_or(0);
        self.set(name, current.saturating_sub(1));
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.entries
            .borrow()
            .iter()
            .find(|counter| counter.name == name)
            .map(|counter| counter.value)
    }
}

impl InstanceCounters for CounterTable {
    fn counters(&self) -> Vec<InstanceCounter> {
        self.entries.borrow().clone()
    }
}

/// The root document slot of a host frame tree.
#[derive(Debug, Default)]
pub struct DocumentState {
    timing: Cell<Option<DocumentTiming>>,
}

impl DocumentState {
    pub const fn new() -> Self {
        Self {
            timing: Cell::new(None),
        }
    }

    pub fn load(&self, timing: DocumentTiming) {
        self.timing.set(Some(timing));
    }

    pub fn unload(&self) {
        self.timing.set(None);
    }
}

impl DocumentTimingSource for DocumentState {
    fn document_timing(&self) -> Option<DocumentTiming> {
        self.timing.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Tape {
        calls: RefCell<Vec<String>>,
    }

    impl ProbeSink for Tape {
        fn will(&self, probe: &Probe) {
            self.calls.borrow_mut().push(format!("will {}", probe.kind()));
        }

        fn did(&self, probe: &Probe) {
            self.calls.borrow_mut().push(format!("did {}", probe.kind()));
        }
    }

    impl TaskTimeObserver for Tape {
        fn will_process_task(&self, start_time: f64) {
            self.calls.borrow_mut().push(format!("task {start_time}"));
        }

        fn did_process_task(&self, start_time: f64, end_time: f64) {
            self.calls
                .borrow_mut()
                .push(format!("task {start_time}..{end_time}"));
        }
    }

    #[test]
    fn scope_fires_will_then_did_on_drop() {
        let dispatcher = ProbeDispatcher::new();
        let tape = Rc::new(Tape::default());
        let _sub = dispatcher.add_probe_sink(tape.clone());

        {
            let _layout = dispatcher.scope(ProbeKind::UpdateLayout);
            let _style = dispatcher.scope(ProbeKind::RecalculateStyle);
        }

        assert_eq!(
            *tape.calls.borrow(),
            [
                "will update_layout",
                "will recalculate_style",
                "did recalculate_style",
                "did update_layout",
            ]
        );
    }

    #[test]
    fn removed_sink_stops_receiving() {
        let dispatcher = ProbeDispatcher::new();
        let tape = Rc::new(Tape::default());
        let sub = dispatcher.add_probe_sink(tape.clone());
        assert_eq!(dispatcher.sink_count(), 1);

        dispatcher.remove_probe_sink(sub);
        dispatcher.will(&Probe::new(ProbeKind::CallFunction));

        assert_eq!(dispatcher.sink_count(), 0);
        assert!(tape.calls.borrow().is_empty());
    }

    #[test]
    fn task_observers_receive_boundaries() {
        let scheduler = TaskObserverList::new();
        let tape = Rc::new(Tape::default());
        let _sub = scheduler.add_task_time_observer(tape.clone());

        scheduler.will_process_task(1.0);
        scheduler.did_process_task(1.0, 2.5);

        assert_eq!(scheduler.observer_count(), 1);
        assert_eq!(*tape.calls.borrow(), ["task 1", "task 1..2.5"]);
    }

    #[test]
    fn counter_table_keeps_declaration_order() {
        let table = CounterTable::with_names(["Node", "Document"]);
        table.increment("Document");
        table.increment("Document");
        table.set("Frame", 3);
        table.decrement("Node");

        let names: Vec<_> = table
            .counters()
            .into_iter()
            .map(|c| (c.name, c.value))
            .collect();
        assert_eq!(
            names,
            [
                ("Node".to_string(), 0),
                ("Document".to_string(), 2),
                ("Frame".to_string(), 3),
            ]
        );
    }

    #[test]
    fn document_state_loads_and_unloads() {
        let document = DocumentState::new();
        assert!(document.document_timing().is_none());

        let timing = DocumentTiming {
            first_meaningful_paint: 1.25,
            dom_content_loaded: 0.75,
        };
        document.load(timing);
        assert_eq!(document.document_timing(), Some(timing));

        document.unload();
        assert!(document.document_timing().is_none());
    }
}
