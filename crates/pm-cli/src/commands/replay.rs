//! Replay command: drive the agent from a recorded host trace.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};

use pm_core::metrics;
use pm_db::Database;

use crate::Config;
use crate::host::LocalHost;
use crate::trace::{self, ReplayOutcome};

/// Replays `trace_path` through an agent restored from `db`.
pub fn run<W: Write>(
    writer: &mut W,
    db: Database,
    config: &Config,
    trace_path: &Path,
    json: bool,
) -> Result<()> {
    let file = File::open(trace_path)
        .with_context(|| format!("failed to open trace {}", trace_path.display()))?;
    let events = trace::parse(BufReader::new(file))
        .with_context(|| format!("failed to parse trace {}", trace_path.display()))?;
    tracing::debug!(event_count = events.len(), "loaded trace");

    let host = LocalHost::new(config.instance_counters.iter().cloned());
    let mut agent = host.agent(db);
    agent.restore();

    let outcome = trace::replay(&host, &mut agent, &events);
    if json {
        write_json(writer, &outcome)
    } else {
        write_text(writer, &outcome)
    }
}

fn write_json<W: Write>(writer: &mut W, outcome: &ReplayOutcome) -> Result<()> {
    let json = serde_json::to_string_pretty(outcome).context("failed to serialize metrics")?;
    writeln!(writer, "{json}")?;
    Ok(())
}

fn write_text<W: Write>(writer: &mut W, outcome: &ReplayOutcome) -> Result<()> {
    for event in &outcome.notifications {
        writeln!(writer, "Time stamp: {}", event.title)?;
        writeln!(writer, "{}", metrics::render(&event.metrics))?;
        writeln!(writer)?;
    }

    if !outcome.enabled {
        writeln!(writer, "Performance agent disabled; no metrics.")?;
        return Ok(());
    }

    writeln!(writer, "Metrics")?;
    writeln!(writer, "{}", metrics::render(&outcome.metrics))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use pm_core::ENABLED_STATE_KEY;

    const TRACE: &str = r#"{"type":"counter","name":"Node","value":12}
{"type":"will","id":1,"probe":"execute_script","ts":0}
{"type":"will","id":2,"probe":"call_function","ts":0.25}
{"type":"did","id":2,"ts":0.5}
{"type":"did","id":1,"ts":1}
{"type":"task_begin","start":0}
{"type":"task_end","start":0,"end":1.5}
{"type":"time_stamp","label":"scripted","ts":1.5}
{"type":"document","first_meaningful_paint":0.75,"dom_content_loaded":0.5}
"#;

    fn config() -> Config {
        Config {
            database_path: "unused.db".into(),
            instance_counters: vec!["Document".to_string(), "Node".to_string()],
        }
    }

    fn replay_to_string(db: Database, json: bool) -> String {
        let temp = tempfile::tempdir().unwrap();
        let trace_path = temp.path().join("trace.jsonl");
        std::fs::write(&trace_path, TRACE).unwrap();

        let mut output = Vec::new();
        run(&mut output, db, &config(), &trace_path, json).unwrap();
        String::from_utf8(output).unwrap()
    }

    fn enabled_db() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        db.set_flag(ENABLED_STATE_KEY, true).unwrap();
        db
    }

    #[test]
    fn replay_with_restored_agent_prints_metrics() {
        let output = replay_to_string(enabled_db(), false);
        assert_snapshot!(output, @r"
        Time stamp: scripted
        DocumentCount        0
        NodeCount            12
        LayoutCount          0
        RecalcStyleCount     0
        LayoutDuration       0
        RecalcStyleDuration  0
        ScriptDuration       1
        TaskDuration         1.5

        Metrics
        DocumentCount         0
        NodeCount             12
        LayoutCount           0
        RecalcStyleCount      0
        LayoutDuration        0
        RecalcStyleDuration   0
        ScriptDuration        1
        TaskDuration          1.5
        FirstMeaningfulPaint  0.75
        DomContentLoaded      0.5
        ");
    }

    #[test]
    fn replay_with_disabled_agent_reports_nothing() {
        let output = replay_to_string(Database::open_in_memory().unwrap(), false);
        assert_eq!(output, "Performance agent disabled; no metrics.\n");
    }

    #[test]
    fn replay_json_output() {
        let output = replay_to_string(enabled_db(), true);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["enabled"], true);
        assert_eq!(value["notifications"][0]["title"], "scripted");
        let metrics = value["metrics"].as_array().unwrap();
        assert_eq!(metrics.len(), 10);
        assert_eq!(metrics[6]["name"], "ScriptDuration");
        assert_eq!(metrics[6]["value"], 1.0);
        assert_eq!(metrics[9]["name"], "DomContentLoaded");
    }

    #[test]
    fn missing_trace_file_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let mut output = Vec::new();
        let err = run(
            &mut output,
            Database::open_in_memory().unwrap(),
            &config(),
            &temp.path().join("missing.jsonl"),
            false,
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("failed to open trace"));
    }
}
