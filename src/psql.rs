//! PostgreSQL client command lines
//!
//! Builds [`CommandSpec`]s for `psql`, `dropdb` and `dropuser` against the
//! configured server. Role and database names are validated identifiers
//! (see `schema.rs`); string literals are quoted here.

use crate::runner::CommandSpec;
use crate::schema::PostgresConfig;
use std::path::Path;

/// Connection parameters shared by every client command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Psql {
    host: String,
    port: u16,
    user: String,
}

impl Psql {
    pub fn new(host: &str, port: u16, user: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            user: user.to_string(),
        }
    }

    pub fn from_config(config: &PostgresConfig) -> Self {
        Self::new(&config.host, config.port, &config.admin_user)
    }

    fn connection_args(&self) -> Vec<String> {
        vec![
            "-h".to_string(),
            self.host.clone(),
            "-p".to_string(),
            self.port.to_string(),
            "-U".to_string(),
            self.user.clone(),
        ]
    }

    fn client(&self, program: &str, extra: &[&str]) -> CommandSpec {
        let mut args = self.connection_args();
        args.extend(extra.iter().map(ToString::to_string));
        CommandSpec::new(program, args)
    }

    /// `psql -lqt`: one row per database
    pub fn list_databases(&self) -> CommandSpec {
        self.client("psql", &["-lqt"])
    }

    /// Run one SQL statement against the maintenance database
    pub fn execute(&self, sql: &str) -> CommandSpec {
        self.client("psql", &["-v", "ON_ERROR_STOP=1", "-c", sql])
    }

    /// Run a SQL file against `database`
    pub fn execute_file(&self, database: &str, file: &Path) -> CommandSpec {
        let file = file.to_string_lossy();
        self.client(
            "psql",
            &["-v", "ON_ERROR_STOP=1", "-d", database, "-f", file.as_ref()],
        )
    }

    pub fn drop_database(&self, database: &str) -> CommandSpec {
        self.client("dropdb", &[database])
    }

    pub fn drop_user(&self, user: &str) -> CommandSpec {
        self.client("dropuser", &["--if-exists", user])
    }

    pub fn drop_group(&self, group: &str) -> CommandSpec {
        self.execute(&format!("DROP GROUP IF EXISTS {group}"))
    }

    /// Set the password of `role`; the statement never reaches the logs
    pub fn set_password(&self, role: &str, password: &str) -> CommandSpec {
        self.execute(&format!(
            "ALTER USER {role} WITH ENCRYPTED PASSWORD {}",
            quote_literal(password)
        ))
        .sensitive()
    }

    /// Terminate every other session connected to `database`
    pub fn terminate_sessions(&self, database: &str) -> CommandSpec {
        self.execute(&format!(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
             WHERE datname = {} AND pid <> pg_backend_pid()",
            quote_literal(database)
        ))
    }
}

/// `psql --version`
pub fn client_version() -> CommandSpec {
    CommandSpec::new("psql", ["--version"])
}

/// SQL string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Database names from `psql -lqt` output.
///
/// Rows look like ` name | owner | encoding | ...`; continuation rows of the
/// access-privileges column have an empty first field and are skipped.
pub fn parse_database_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split('|').next())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .collect()
}
