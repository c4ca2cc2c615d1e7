//! The provisioning sequence
//!
//! version/cluster → group membership → pg_hba gate → secrets and settings
//! file → provisioning hooks → database reset → migrations → seed data
//!
//! Nothing is asked for or written before the gate passes.

use anyhow::{Context, Result};
use pgkit::{Inventory, Selection};

use super::database::{self, ResetOutcome};
use super::postgres::{self, Membership};
use super::seed::{self, SeedReport};
use crate::config::{RunContext, Secrets};
use crate::prompt::Prompter;
use crate::runner::{CommandRunner, CommandSpec};
use crate::schema::DeclinePolicy;
use crate::settings;
use crate::ui;

const TOTAL_STEPS: usize = 7;

/// What a run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub selection: Selection,
    pub membership: Membership,
    pub reset: ResetOutcome,
    /// `None` when seed data was skipped
    pub seed: Option<SeedReport>,
}

/// Run the whole sequence for the invoking `user`
pub fn execute(
    ctx: &RunContext,
    runner: &dyn CommandRunner,
    prompter: &mut dyn Prompter,
    inventory: &dyn Inventory,
    user: &str,
) -> Result<RunSummary> {
    ui::header(&format!("Preparing {}", ctx.database()));

    ui::step(1, TOTAL_STEPS, "PostgreSQL installation");
    let minimum = ctx.config.postgres.minimum()?;
    let selection = postgres::select_target(inventory, &mut *prompter, minimum)?;
    let membership = postgres::ensure_group_membership(inventory, runner, &selection.hba_path, user)?;

    ui::step(2, TOTAL_STEPS, "Access policy");
    postgres::enforce_policy(&selection.hba_path, ctx.policy_target())?;

    ui::step(3, TOTAL_STEPS, "Application settings");
    let secrets = Secrets::resolve(&ctx.config.secrets, &mut *prompter)?;
    write_settings(ctx, &secrets)?;

    ui::step(4, TOTAL_STEPS, "Provisioning");
    if ctx.options.reset_only {
        ui::dim("skipped (--resetdb)");
    } else {
        run_hooks(ctx, runner, "provision", &ctx.config.commands.provision)?;
    }

    ui::step(5, TOTAL_STEPS, "Database reset");
    let reset = database::prepare_database(ctx, runner, prompter, &secrets, &selection, user)?;

    if reset == ResetOutcome::Declined
        && ctx.config.database.on_reset_declined == DeclinePolicy::Stop
    {
        ui::info("Existing database kept, nothing else to do");
        return Ok(RunSummary {
            selection,
            membership,
            reset,
            seed: None,
        });
    }

    ui::step(6, TOTAL_STEPS, "Migrations");
    // A kept database already has its initial schema.
    if reset != ResetOutcome::Declined && !database::database_exists(ctx, runner)? {
        run_hooks(
            ctx,
            runner,
            "initial migration",
            &ctx.config.commands.initial_migrations,
        )?;
    }
    run_hooks(ctx, runner, "migration", &ctx.config.commands.migrations)?;

    ui::step(7, TOTAL_STEPS, "Development data");
    let seed = seed::populate_db(ctx, runner, prompter)?;

    println!();
    ui::success(&format!("{} is ready", ctx.database()));
    if let Membership::Added(group) = &membership {
        ui::warn(&format!(
            "Remember to log out and back in to use your new {group} membership"
        ));
    }

    Ok(RunSummary {
        selection,
        membership,
        reset,
        seed,
    })
}

fn write_settings(ctx: &RunContext, secrets: &Secrets) -> Result<()> {
    let path = &ctx.config.settings.path;
    if ctx.options.dry_run {
        ui::dim(&format!("[dry-run] write {}", path.display()));
        return Ok(());
    }
    let doc = settings::build(&ctx.config, secrets);
    settings::write(&doc, path)?;
    ui::success(&format!("Wrote {}", path.display()));
    Ok(())
}

/// Run configured shell commands in order, stopping at the first failure
fn run_hooks(
    ctx: &RunContext,
    runner: &dyn CommandRunner,
    kind: &str,
    commands: &[String],
) -> Result<()> {
    if commands.is_empty() {
        ui::dim(&format!("no {kind} commands configured"));
        return Ok(());
    }

    for (i, template) in commands.iter().enumerate() {
        let script = ctx
            .render_command(template)
            .with_context(|| format!("{kind} command #{}", i + 1))?;
        ui::dim(&script);
        runner.run_checked(
            &format!("{kind} command #{}", i + 1),
            &CommandSpec::shell(&script).surfaced(),
        )?;
    }
    Ok(())
}
