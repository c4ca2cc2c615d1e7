mod cli;
mod commands;
mod config;
mod paths;
mod prompt;
mod psql;
mod runner;
mod schema;
mod settings;
mod state;
mod sudo;
mod system;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::process::ExitCode;

use commands::postgres::PolicyViolation;
use config::{RunContext, RunOptions};
use pgkit::{FsInventory, Inventory};
use prompt::TerminalPrompter;
use runner::{CommandRunner, DryRunRunner, SystemRunner};
use schema::PrepdevConfig;
use state::RunControl;

/// Access policy gate failed
const EXIT_POLICY: u8 = 2;
/// The authentication file could not be read
const EXIT_PERMISSION: u8 = 3;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    let config_file = match &cli.config {
        Some(path) => path.clone(),
        None => paths::config_file()?,
    };

    match &cli.command {
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            generate(*shell, &mut cmd, "prepdev", &mut io::stdout());
            Ok(())
        }
        Some(Command::Doctor { json }) => commands::doctor::run(&config_file, *json),
        None => {
            let config = PrepdevConfig::load(&config_file)?;
            log::debug!("Configuration: {}", config_file.display());
            if cli.close_connections {
                let psql = psql::Psql::from_config(&config.postgres);
                let runner = runner_for(cli.dry_run);
                return commands::connections::close_connections(
                    &psql,
                    runner.as_ref(),
                    &config.database.name,
                );
            }
            provision(config, &cli)
        }
    }
}

fn provision(config: PrepdevConfig, cli: &Cli) -> Result<()> {
    let options = RunOptions {
        reset_only: cli.reset_db,
        skip_confirmation: cli.exclude_db,
        dry_run: cli.dry_run,
    };
    let mut prompter = TerminalPrompter;

    let mut rc = RunControl::load(&paths::rc_file()?)?;
    let repository = config::resolve_repository(
        cli.repository_path.as_deref(),
        &config.repository.default_path,
        &mut rc,
        &mut prompter,
        !options.dry_run,
    )?;

    let inventory = FsInventory::new(config.postgres.config_root.clone());
    let user = system::current_user(inventory.identity())?;
    log::info!("Running as {user}");

    let ctx = RunContext::new(config, options, &repository);
    let runner = runner_for(options.dry_run);
    let inventory: &dyn Inventory = &inventory;
    commands::run::execute(&ctx, runner.as_ref(), &mut prompter, inventory, &user)?;
    Ok(())
}

fn runner_for(dry_run: bool) -> Box<dyn CommandRunner> {
    if dry_run {
        Box::new(DryRunRunner)
    } else {
        Box::new(SystemRunner)
    }
}

/// Print `err` and pick the exit code
fn report(err: &anyhow::Error) -> ExitCode {
    if let Some(violation) = err.downcast_ref::<PolicyViolation>() {
        // remediation was printed by the gate
        ui::error(&violation.to_string());
        return ExitCode::from(EXIT_POLICY);
    }

    ui::error(&format!("{err:#}"));

    match err.chain().find_map(|e| e.downcast_ref::<pgkit::Error>()) {
        Some(pgkit::Error::PermissionDenied(path)) => {
            ui::dim(pgkit::ErrorCategory::Permission.advice());
            ui::dim(&format!("Then run prepdev again to read {}", path.display()));
            ExitCode::from(EXIT_PERMISSION)
        }
        Some(pg) => {
            ui::dim(pg.category().advice());
            ExitCode::FAILURE
        }
        None => ExitCode::FAILURE,
    }
}
