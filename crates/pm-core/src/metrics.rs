//! Metric snapshots.
//!
//! The names and their order form a compatibility contract with snapshot
//! consumers:
//!
//! 1. one `<Counter>Count` entry per instance counter, in provider order
//! 2. `LayoutCount`, `RecalcStyleCount`, `LayoutDuration`,
//!    `RecalcStyleDuration`, `ScriptDuration`, `TaskDuration`
//! 3. `FirstMeaningfulPaint`, `DomContentLoaded`, only while a document is loaded

use serde::{Deserialize, Serialize};

use crate::counters::DurationAccumulator;
use crate::host::{DocumentTimingSource, InstanceCounters};

pub const LAYOUT_COUNT: &str = "LayoutCount";
pub const RECALC_STYLE_COUNT: &str = "RecalcStyleCount";
pub const LAYOUT_DURATION: &str = "LayoutDuration";
pub const RECALC_STYLE_DURATION: &str = "RecalcStyleDuration";
pub const SCRIPT_DURATION: &str = "ScriptDuration";
pub const TASK_DURATION: &str = "TaskDuration";
pub const FIRST_MEANINGFUL_PAINT: &str = "FirstMeaningfulPaint";
pub const DOM_CONTENT_LOADED: &str = "DomContentLoaded";

/// A single named value in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: f64,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Assembles the ordered snapshot from the counters and host providers.
#[expect(
    clippy::cast_precision_loss,
    reason = "metric values are reported as f64 by contract"
)]
pub(crate) fn collect(
    accumulator: &DurationAccumulator,
    instance_counters: &dyn InstanceCounters,
    document: &dyn DocumentTimingSource,
) -> Vec<Metric> {
    let mut metrics: Vec<Metric> = instance_counters
        .counters()
        .into_iter()
        .map(|counter| Metric::new(format!("{}Count", counter.name), counter.value as f64))
        .collect();

    metrics.extend([
        Metric::new(LAYOUT_COUNT, accumulator.layout().count as f64),
        Metric::new(RECALC_STYLE_COUNT, accumulator.recalc_style().count as f64),
        Metric::new(LAYOUT_DURATION, accumulator.layout().duration),
        Metric::new(RECALC_STYLE_DURATION, accumulator.recalc_style().duration),
        Metric::new(SCRIPT_DURATION, accumulator.script().duration),
        Metric::new(TASK_DURATION, accumulator.task().duration),
    ]);

    if let Some(timing) = document.document_timing() {
        metrics.push(Metric::new(
            FIRST_MEANINGFUL_PAINT,
            timing.first_meaningful_paint,
        ));
        metrics.push(Metric::new(DOM_CONTENT_LOADED, timing.dom_content_loaded));
    }

    metrics
}

/// Renders a snapshot as aligned `name value` lines.
pub fn render(metrics: &[Metric]) -> String {
    let width = metrics
        .iter()
        .map(|metric| metric.name.len())
        .max()
        .unwrap_or(0);
    metrics
        .iter()
        .map(|metric| format!("{:<width$}  {}", metric.name, metric.value))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::dispatch::{CounterTable, DocumentState};
    use crate::host::DocumentTiming;
    use crate::probe::{Probe, ProbeKind};

    use insta::assert_snapshot;

    fn names(metrics: &[Metric]) -> Vec<&str> {
        metrics.iter().map(|m| m.name.as_str()).collect()
    }

    #[test]
    fn snapshot_without_document_omits_timings() {
        let counters = CounterTable::with_names(["Node", "Document"]);
        let metrics = collect(
            &DurationAccumulator::new(),
            &counters,
            &DocumentState::new(),
        );

        assert_eq!(
            names(&metrics),
            [
                "NodeCount",
                "DocumentCount",
                "LayoutCount",
                "RecalcStyleCount",
                "LayoutDuration",
                "RecalcStyleDuration",
                "ScriptDuration",
                "TaskDuration",
            ]
        );
    }

    #[test]
    fn snapshot_with_document_appends_timings() {
        let clock = ManualClock::new(0.0);
        let mut acc = DurationAccumulator::new();
        let layout = Probe::new(ProbeKind::UpdateLayout);
        acc.begin(&layout, &clock);
        clock.set(0.5);
        acc.end(&layout, &clock);
        acc.add_task(2.0);

        let counters = CounterTable::with_names(["Node"]);
        counters.set("Node", 42);
        let document = DocumentState::new();
        document.load(DocumentTiming {
            first_meaningful_paint: 1.25,
            dom_content_loaded: 0.75,
        });

        let metrics = collect(&acc, &counters, &document);
        assert_snapshot!(render(&metrics), @r"
        NodeCount             42
        LayoutCount           1
        RecalcStyleCount      0
        LayoutDuration        0.5
        RecalcStyleDuration   0
        ScriptDuration        0
        TaskDuration          2
        FirstMeaningfulPaint  1.25
        DomContentLoaded      0.75
        ");
    }

    #[test]
    fn render_empty_snapshot() {
        assert_eq!(render(&[]), "");
    }
}
