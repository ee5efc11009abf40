//! Recorded host traces.
//!
//! A trace is JSON lines, one host event per line, tagged by `type`:
//!
//! ```text
//! {"type":"will","id":1,"probe":"update_layout","ts":0.0}
//! {"type":"did","id":1,"ts":0.25}
//! {"type":"task_begin","start":1.0}
//! {"type":"task_end","start":1.0,"end":1.5}
//! {"type":"counter","name":"Node","value":12}
//! {"type":"document","first_meaningful_paint":0.8,"dom_content_loaded":0.6}
//! {"type":"time_stamp","label":"loaded","ts":2.0}
//! {"type":"enable"}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use std::collections::HashMap;
use std::io::BufRead;

use anyhow::{Context, Result};
use pm_core::{
    DocumentTiming, MetricsEvent, Metric, PerformanceAgent, Probe, ProbeKind, StateStore,
};
use serde::{Deserialize, Serialize};

use crate::host::LocalHost;

/// One recorded host event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    /// A probe opened at `ts`; `id` pairs it with its `did`.
    Will { id: u64, probe: ProbeKind, ts: f64 },
    /// The probe with `id` closed at `ts`.
    Did { id: u64, ts: f64 },
    TaskBegin { start: f64 },
    TaskEnd { start: f64, end: f64 },
    /// Sets an instance counter.
    Counter { name: String, value: u64 },
    /// Loads a root document with the given timings.
    Document(DocumentTiming),
    /// Unloads the root document.
    DocumentUnload,
    /// A console time stamp at `ts`.
    TimeStamp { label: String, ts: f64 },
    Enable,
    Disable,
}

/// Parses a trace, failing on the first malformed line.
pub fn parse<R: BufRead>(reader: R) -> Result<Vec<TraceEvent>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("failed to read trace line {line_no}"))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid trace event on line {line_no}"))?;
        events.push(event);
    }
    Ok(events)
}

/// What a replay produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayOutcome {
    pub enabled: bool,
    pub notifications: Vec<MetricsEvent>,
    pub metrics: Vec<Metric>,
}

/// Feeds trace events through the host into `agent`.
pub fn replay<S: StateStore>(
    host: &LocalHost,
    agent: &mut PerformanceAgent<S>,
    events: &[TraceEvent],
) -> ReplayOutcome {
    let mut open: HashMap<u64, Probe> = HashMap::new();

    for event in events {
        match event {
            TraceEvent::Will { id, probe, ts } => {
                host.clock.set(*ts);
                let probe = Probe::new(*probe);
                host.dispatcher.will(&probe);
                if open.insert(*id, probe).is_some() {
                    tracing::warn!(id, "probe id reopened before it closed");
                }
            }
            TraceEvent::Did { id, ts } => {
                host.clock.set(*ts);
                match open.remove(id) {
                    Some(probe) => host.dispatcher.did(&probe),
                    None => tracing::warn!(id, "skipping did for unknown probe"),
                }
            }
            TraceEvent::TaskBegin { start } => host.scheduler.will_process_task(*start),
            TraceEvent::TaskEnd { start, end } => host.scheduler.did_process_task(*start, *end),
            TraceEvent::Counter { name, value } => host.counters.set(name, *value),
            TraceEvent::Document(timing) => host.document.load(*timing),
            TraceEvent::DocumentUnload => host.document.unload(),
            TraceEvent::TimeStamp { label, ts } => {
                host.clock.set(*ts);
                agent.console_time_stamp(label);
            }
            TraceEvent::Enable => agent.enable(),
            TraceEvent::Disable => agent.disable(),
        }
    }

    if !open.is_empty() {
        tracing::debug!(open = open.len(), "trace ended with open probes");
    }

    ReplayOutcome {
        enabled: agent.is_enabled(),
        notifications: host.take_events(),
        metrics: agent.get_metrics(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pm_core::MemoryStateStore;

    fn events(lines: &str) -> Vec<TraceEvent> {
        parse(lines.as_bytes()).unwrap()
    }

    fn value(metrics: &[Metric], name: &str) -> Option<f64> {
        metrics.iter().find(|m| m.name == name).map(|m| m.value)
    }

    #[test]
    fn parse_skips_blank_and_comment_lines() {
        let parsed = events(
            r#"
# warm-up
{"type":"enable"}

{"type":"task_begin","start":1.0}
"#,
        );
        assert_eq!(
            parsed,
            [TraceEvent::Enable, TraceEvent::TaskBegin { start: 1.0 }]
        );
    }

    #[test]
    fn parse_reports_line_number() {
        let err = parse(
            "{\"type\":\"enable\"}\n{\"type\":\"will\",\"id\":1,\"probe\":\"paint\",\"ts\":0}\n"
                .as_bytes(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "invalid trace event on line 2");
    }

    #[test]
    fn parse_document_event() {
        let parsed = events(
            r#"{"type":"document","first_meaningful_paint":0.8,"dom_content_loaded":0.6}"#,
        );
        assert_eq!(
            parsed,
            [TraceEvent::Document(DocumentTiming {
                first_meaningful_paint: 0.8,
                dom_content_loaded: 0.6,
            })]
        );
    }

    #[test]
    fn replay_pairs_probes_by_id() {
        let host = LocalHost::new(["Node"]);
        let mut agent = host.agent(MemoryStateStore::new());
        let trace = events(
            r#"
{"type":"enable"}
{"type":"will","id":1,"probe":"update_layout","ts":0}
{"type":"will","id":2,"probe":"update_layout","ts":1}
{"type":"did","id":2,"ts":3}
{"type":"did","id":1,"ts":5}
{"type":"will","id":3,"probe":"recalculate_style","ts":5}
{"type":"will","id":4,"probe":"recalculate_style","ts":6}
{"type":"did","id":4,"ts":7}
{"type":"did","id":3,"ts":9}
{"type":"did","id":99,"ts":9}
"#,
        );

        let outcome = replay(&host, &mut agent, &trace);

        assert!(outcome.enabled);
        assert_eq!(value(&outcome.metrics, "LayoutDuration"), Some(5.0));
        assert_eq!(value(&outcome.metrics, "LayoutCount"), Some(1.0));
        assert_eq!(value(&outcome.metrics, "RecalcStyleCount"), Some(2.0));
        assert_eq!(value(&outcome.metrics, "RecalcStyleDuration"), Some(5.0));
    }

    #[test]
    fn replay_collects_time_stamps() {
        let host = LocalHost::new(["Node"]);
        let mut agent = host.agent(MemoryStateStore::new());
        let trace = events(
            r#"
{"type":"time_stamp","label":"before","ts":0}
{"type":"enable"}
{"type":"task_begin","start":10}
{"type":"task_end","start":10,"end":15}
{"type":"time_stamp","label":"after","ts":15}
{"type":"disable"}
"#,
        );

        let outcome = replay(&host, &mut agent, &trace);

        assert!(!outcome.enabled);
        assert!(outcome.metrics.is_empty());
        assert_eq!(outcome.notifications.len(), 1);
        assert_eq!(outcome.notifications[0].title, "after");
        assert_eq!(
            value(&outcome.notifications[0].metrics, "TaskDuration"),
            Some(5.0)
        );
    }
}
