use anyhow::Result;

use crate::psql::Psql;
use crate::runner::CommandRunner;
use crate::ui;

/// Terminate every session connected to `database` except our own
pub fn close_connections(psql: &Psql, runner: &dyn CommandRunner, database: &str) -> Result<()> {
    ui::info(&format!("Closing connections to {database}"));
    runner.run_checked("close connections", &psql.terminate_sessions(database))?;
    ui::success("Connections closed");
    Ok(())
}
