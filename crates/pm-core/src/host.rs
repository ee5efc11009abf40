//! Interfaces the agent consumes from its host.
//!
//! The agent never reaches into host internals. Everything it observes or
//! queries comes through one of these traits, bundled in [`HostBindings`].

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::frontend::Frontend;
use crate::probe::Probe;

/// Receives the paired will/did callbacks for instrumented host work.
pub trait ProbeSink {
    fn will(&self, probe: &Probe);
    fn did(&self, probe: &Probe);
}

/// Receives scheduled-task boundaries from the host's task runner.
pub trait TaskTimeObserver {
    fn will_process_task(&self, start_time: f64);
    fn did_process_task(&self, start_time: f64, end_time: f64);
}

/// Handle returned on registration, consumed on removal.
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "dropping a subscription leaves the observer registered"]
pub struct Subscription(u64);

impl Subscription {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> u64 {
        self.0
    }
}

/// Routes probe callbacks to registered sinks.
pub trait InstrumentationDispatcher {
    fn add_probe_sink(&self, sink: Rc<dyn ProbeSink>) -> Subscription;
    fn remove_probe_sink(&self, subscription: Subscription);
}

/// Routes task boundaries to registered observers.
pub trait TaskScheduler {
    fn add_task_time_observer(&self, observer: Rc<dyn TaskTimeObserver>) -> Subscription;
    fn remove_task_time_observer(&self, subscription: Subscription);
}

/// A named live-object counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceCounter {
    pub name: String,
    pub value: u64,
}

/// Enumerates process-wide instance counters in a stable order.
pub trait InstanceCounters {
    fn counters(&self) -> Vec<InstanceCounter>;
}

/// Paint and document timings of the current root document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocumentTiming {
    pub first_meaningful_paint: f64,
    pub dom_content_loaded: f64,
}

/// Looks up timings for the root document, if one is loaded.
pub trait DocumentTimingSource {
    fn document_timing(&self) -> Option<DocumentTiming>;
}

/// Everything the agent needs from its host.
#[derive(Clone)]
pub struct HostBindings {
    pub dispatcher: Rc<dyn InstrumentationDispatcher>,
    pub scheduler: Rc<dyn TaskScheduler>,
    pub instance_counters: Rc<dyn InstanceCounters>,
    pub document: Rc<dyn DocumentTimingSource>,
    pub frontend: Rc<dyn Frontend>,
}
