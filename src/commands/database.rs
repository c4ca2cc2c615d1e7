//! Database reset
//!
//! Drops the development database and the fixed application principals,
//! refreshes the server environment, restarts the service and sets the
//! administrator password. Users and groups are dropped whether or not the
//! database existed, so a half-finished earlier run is cleaned up too.

use anyhow::{Context, Result};
use pgkit::Selection;

use super::connections::close_connections;
use crate::config::{RunContext, Secrets};
use crate::prompt::Prompter;
use crate::psql;
use crate::runner::{CommandRunner, CommandSpec};
use crate::sudo::SudoSession;
use crate::ui;

/// What `prepare_database` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// Steps ran; `dropped_database` tells whether a database was removed
    Reset { dropped_database: bool },
    /// The operator kept the existing database; nothing was changed
    Declined,
}

/// Whether the configured database exists (exact name match)
pub fn database_exists(ctx: &RunContext, runner: &dyn CommandRunner) -> Result<bool> {
    let output = runner.run_checked("list databases", &ctx.psql.list_databases())?;
    let exists = psql::parse_database_list(&output.stdout)
        .iter()
        .any(|name| name == ctx.database());
    log::debug!("Database {} exists: {exists}", ctx.database());
    Ok(exists)
}

/// Reset the database server state for a fresh development database
pub fn prepare_database(
    ctx: &RunContext,
    runner: &dyn CommandRunner,
    prompter: &mut dyn Prompter,
    secrets: &Secrets,
    selection: &Selection,
    user: &str,
) -> Result<ResetOutcome> {
    let database = ctx.database();
    let exists = database_exists(ctx, runner)?;

    if exists && !ctx.options.skip_confirmation {
        let question = format!("Database {database} already exists. Drop and recreate it?");
        if !prompter.confirm(&question, false)? {
            ui::warn(&format!("Keeping the existing {database} database"));
            return Ok(ResetOutcome::Declined);
        }
    }

    if exists {
        close_connections(&ctx.psql, runner, database)?;
        ui::info(&format!("Dropping database {database}"));
        runner.run_checked("drop database", &ctx.psql.drop_database(database))?;
    }

    drop_principals(ctx, runner)?;
    refresh_server(ctx, runner, selection, user)?;

    ui::info("Setting the administrator password");
    runner.run_checked(
        "set administrator password",
        &ctx.psql
            .set_password(&ctx.config.postgres.admin_user, &secrets.postgres_password),
    )?;

    ui::success("Database server reset");
    Ok(ResetOutcome::Reset {
        dropped_database: exists,
    })
}

/// Drop every configured user, then every configured group
fn drop_principals(ctx: &RunContext, runner: &dyn CommandRunner) -> Result<()> {
    for user in &ctx.config.database.drop_users {
        ui::dim(&format!("drop user {user}"));
        runner.run_checked(&format!("drop user {user}"), &ctx.psql.drop_user(user))?;
    }
    for group in &ctx.config.database.drop_groups {
        ui::dim(&format!("drop group {group}"));
        runner.run_checked(&format!("drop group {group}"), &ctx.psql.drop_group(group))?;
    }
    Ok(())
}

/// Regenerate the server environment file, install it and restart the service
fn refresh_server(
    ctx: &RunContext,
    runner: &dyn CommandRunner,
    selection: &Selection,
    user: &str,
) -> Result<()> {
    let pg = &ctx.config.postgres;

    ui::info("Generating the PostgreSQL environment file");
    let script = ctx
        .render_command(&ctx.config.commands.generate_environment)
        .context("commands.generate_environment")?;
    runner.run_checked(
        "generate environment file",
        &CommandSpec::shell(&script).surfaced(),
    )?;

    let _sudo = SudoSession::acquire(runner, "install the environment file and restart PostgreSQL")?;

    let target = format!("{}/", selection.cluster_dir.display());
    let source = pg.environment_file.to_string_lossy();
    runner.run_checked(
        "install environment file",
        &CommandSpec::new("cp", ["-f", source.as_ref(), target.as_str()]).privileged(),
    )?;

    // The server reads the virtualenv through the operator's primary group.
    runner.run_checked(
        "grant server access to the repository",
        &CommandSpec::new("usermod", ["-a", "-G", user, pg.service_user.as_str()]).privileged(),
    )?;

    ui::info("Restarting PostgreSQL");
    runner.run_checked(
        "restart PostgreSQL",
        &CommandSpec::new("service", [pg.service_name.as_str(), "restart"])
            .privileged()
            .surfaced(),
    )?;

    Ok(())
}
