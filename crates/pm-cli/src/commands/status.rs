//! Status command for showing the persisted agent state.

use std::io::Write;
use std::path::Path;

use anyhow::Result;

use pm_core::ENABLED_STATE_KEY;
use pm_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &Database, database_path: &Path) -> Result<()> {
    let enabled = db.flag(ENABLED_STATE_KEY)?;

    writeln!(writer, "Performance agent status")?;
    writeln!(writer, "Database: {}", database_path.display())?;

    match enabled {
        Some(true) => writeln!(writer, "Agent: enabled")?,
        Some(false) => writeln!(writer, "Agent: disabled")?,
        None => writeln!(writer, "Agent: disabled (never enabled)")?,
    }

    let records = db.list_state()?;
    if let Some(record) = records.iter().find(|r| r.key == ENABLED_STATE_KEY) {
        writeln!(writer, "Last changed: {}", record.updated_at.to_rfc3339())?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    #[test]
    fn status_for_fresh_database() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("state.db");
        let db = Database::open(&db_path).unwrap();

        let mut output = Vec::new();
        run(&mut output, &db, &db_path).unwrap();

        let output = String::from_utf8(output).unwrap();
        let output = output.replace(&db_path.display().to_string(), "[TEMP]/state.db");
        assert_snapshot!(output, @r"
        Performance agent status
        Database: [TEMP]/state.db
        Agent: disabled (never enabled)
        ");
    }

    #[test]
    fn status_reports_enabled_flag() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("state.db");
        let mut db = Database::open(&db_path).unwrap();
        db.set_flag(ENABLED_STATE_KEY, true).unwrap();

        let mut output = Vec::new();
        run(&mut output, &db, &db_path).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("Agent: enabled\n"));
        assert!(output.contains("Last changed: "));
    }
}
