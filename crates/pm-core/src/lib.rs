//! Core probe accounting for the performance metrics agent.
//!
//! This crate contains the fundamental types and logic for:
//! - Accumulation: reentrancy-aware per-category counts and durations
//! - Task windows: pairing scheduled-task begin/end events by start time
//! - Snapshots: the ordered metric list merged with host-provided values
//! - Enablement: attaching and detaching the agent from host event sources

mod agent;
pub mod clock;
mod counters;
pub mod dispatch;
pub mod frontend;
pub mod host;
pub mod metrics;
mod observers;
pub mod probe;
mod recorder;
pub mod state;

pub use agent::{ENABLED_STATE_KEY, PerformanceAgent};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use counters::{CategoryCounter, DurationAccumulator};
pub use dispatch::{CounterTable, DocumentState, ProbeDispatcher, ProbeScope, TaskObserverList};
pub use frontend::{ChannelFrontend, Frontend, MetricsEvent};
pub use host::{
    DocumentTiming, DocumentTimingSource, HostBindings, InstanceCounter, InstanceCounters,
    InstrumentationDispatcher, ProbeSink, Subscription, TaskScheduler, TaskTimeObserver,
};
pub use metrics::Metric;
pub use probe::{Probe, ProbeKind, UnknownProbeKind};
pub use recorder::MetricsRecorder;
pub use state::{MemoryStateStore, StateError, StateStore};
