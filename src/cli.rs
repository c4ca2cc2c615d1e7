use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "prepdev")]
#[command(author = "Sigma Developers")]
#[command(version)]
#[command(about = "Prepare a local PostgreSQL development database", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Keep the installed environment; only reset and reload the database
    #[arg(short = 'r', long = "resetdb")]
    pub reset_db: bool,

    /// Drop an existing database without asking
    #[arg(short = 'e', long = "excludedb")]
    pub exclude_db: bool,

    /// Terminate every connection to the database and exit
    #[arg(short = 'c', long)]
    pub close_connections: bool,

    /// Where the code lives (asked for when omitted)
    #[arg(
        short = 'p',
        long = "repository_path",
        visible_alias = "repository-path",
        value_name = "PATH"
    )]
    pub repository_path: Option<PathBuf>,

    /// Use this configuration file instead of the default one
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Print commands instead of running them
    #[arg(long)]
    pub dry_run: bool,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check the PostgreSQL setup without changing anything
    Doctor {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::try_parse_from(["prepdev", "-r", "-e", "-p", "~/code"]).unwrap();
        assert!(cli.reset_db);
        assert!(cli.exclude_db);
        assert!(!cli.close_connections);
        assert_eq!(cli.repository_path, Some(PathBuf::from("~/code")));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_long_flags() {
        let cli = Cli::try_parse_from([
            "prepdev",
            "--resetdb",
            "--excludedb",
            "--close-connections",
            "--repository_path",
            "/srv/code",
        ])
        .unwrap();
        assert!(cli.reset_db && cli.exclude_db && cli.close_connections);
        assert_eq!(cli.repository_path, Some(PathBuf::from("/srv/code")));
    }

    #[test]
    fn test_repository_path_alias() {
        let cli = Cli::try_parse_from(["prepdev", "--repository-path", "/srv/code"]).unwrap();
        assert_eq!(cli.repository_path, Some(PathBuf::from("/srv/code")));
    }

    #[test]
    fn test_doctor_subcommand() {
        let cli =
            Cli::try_parse_from(["prepdev", "doctor", "--json", "--config", "/tmp/c.toml", "-vv"])
                .unwrap();
        assert!(matches!(cli.command, Some(Command::Doctor { json: true })));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(Cli::try_parse_from(["prepdev", "--drop-everything"]).is_err());
    }
}
