//! Enable and disable commands.

use std::io::Write;

use anyhow::Result;

use pm_core::ENABLED_STATE_KEY;
use pm_db::Database;

use crate::Config;
use crate::host::LocalHost;

/// Restores an agent from `db`, applies the requested state and persists it.
pub fn run<W: Write>(writer: &mut W, db: Database, config: &Config, enable: bool) -> Result<()> {
    let host = LocalHost::new(config.instance_counters.iter().cloned());
    let mut agent = host.agent(db);
    agent.restore();

    let was_enabled = agent.is_enabled();
    if enable {
        agent.enable();
    } else {
        agent.disable();
    }

    let persisted = agent.state().flag(ENABLED_STATE_KEY)?.unwrap_or(false);
    let state = if agent.is_enabled() { "enabled" } else { "disabled" };

    if was_enabled == agent.is_enabled() {
        writeln!(writer, "Performance agent already {state}")?;
    } else {
        writeln!(writer, "Performance agent {state}")?;
    }
    if persisted != agent.is_enabled() {
        tracing::warn!(persisted, "persisted flag does not match agent state");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            database_path: "unused.db".into(),
            instance_counters: vec!["Node".to_string()],
        }
    }

    fn run_to_string(db: Database, enable: bool) -> String {
        let mut output = Vec::new();
        run(&mut output, db, &config(), enable).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn enable_persists_flag() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("state.db");

        let output = run_to_string(Database::open(&path).unwrap(), true);
        assert_eq!(output, "Performance agent enabled\n");

        let db = Database::open(&path).unwrap();
        assert_eq!(db.flag(ENABLED_STATE_KEY).unwrap(), Some(true));
    }

    #[test]
    fn enable_twice_reports_already_enabled() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("state.db");

        run_to_string(Database::open(&path).unwrap(), true);
        let output = run_to_string(Database::open(&path).unwrap(), true);
        assert_eq!(output, "Performance agent already enabled\n");
    }

    #[test]
    fn disable_after_enable_clears_flag() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("state.db");

        run_to_string(Database::open(&path).unwrap(), true);
        let output = run_to_string(Database::open(&path).unwrap(), false);
        assert_eq!(output, "Performance agent disabled\n");

        let db = Database::open(&path).unwrap();
        assert_eq!(db.flag(ENABLED_STATE_KEY).unwrap(), Some(false));
    }

    #[test]
    fn disable_when_never_enabled_writes_nothing() {
        let output = run_to_string(Database::open_in_memory().unwrap(), false);
        assert_eq!(output, "Performance agent already disabled\n");
    }
}
