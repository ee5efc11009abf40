//! An in-process host for driving the agent from the CLI.

use std::rc::Rc;

use pm_core::{
    ChannelFrontend, CounterTable, DocumentState, HostBindings, ManualClock, MetricsEvent,
    PerformanceAgent, ProbeDispatcher, StateStore, TaskObserverList,
};

/// Host-side event sources and providers, all driven by hand.
#[derive(Debug)]
pub struct LocalHost {
    pub clock: Rc<ManualClock>,
    pub dispatcher: Rc<ProbeDispatcher>,
    pub scheduler: Rc<TaskObserverList>,
    pub counters: Rc<CounterTable>,
    pub document: Rc<DocumentState>,
    frontend: ChannelFrontend,
    events: flume::Receiver<MetricsEvent>,
}

impl LocalHost {
    pub fn new<I, S>(counter_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (frontend, events) = ChannelFrontend::new();
        Self {
            clock: Rc::new(ManualClock::new(0.0)),
            dispatcher: Rc::new(ProbeDispatcher::new()),
            scheduler: Rc::new(TaskObserverList::new()),
            counters: Rc::new(CounterTable::with_names(counter_names)),
            document: Rc::new(DocumentState::new()),
            frontend,
            events,
        }
    }

    /// Creates an agent bound to this host.
    pub fn agent<S: StateStore>(&self, state: S) -> PerformanceAgent<S> {
        let bindings = HostBindings {
            dispatcher: self.dispatcher.clone(),
            scheduler: self.scheduler.clone(),
            instance_counters: self.counters.clone(),
            document: self.document.clone(),
            frontend: Rc::new(self.frontend.clone()),
        };
        PerformanceAgent::new(bindings, self.clock.clone(), state)
    }

    /// Drains the snapshots pushed so far.
    pub fn take_events(&self) -> Vec<MetricsEvent> {
        self.events.try_iter().collect()
    }
}
