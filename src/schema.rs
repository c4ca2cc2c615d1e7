use anyhow::{Context, Result, bail};
use pgkit::{PgVersion, TemplateVariables};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ============================================================================
// Main Config Schema
// ============================================================================

/// The prepdev configuration file (`config.toml`)
///
/// Every section is optional; a missing file yields the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct PrepdevConfig {
    /// Server discovery and connection
    pub postgres: PostgresConfig,

    /// The development database and the principals reset with it
    pub database: DatabaseConfig,

    /// Application roles
    pub roles: RolesConfig,

    /// Application schemas
    pub schemas: SchemasConfig,

    /// Where the code lives
    pub repository: RepositoryConfig,

    /// Seed data loading
    pub seed: SeedConfig,

    /// Generated application settings file
    pub settings: SettingsConfig,

    /// External commands (templated)
    pub commands: CommandsConfig,

    /// Fallback passwords (environment variables take precedence)
    pub secrets: SecretsConfig,
}

impl PrepdevConfig {
    /// Load config from `path`, or defaults when `path` does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config: {}", path.display()))
    }

    /// Parse and validate TOML content
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Invalid TOML format")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.postgres.validate()?;

        validate_identifier("database.name", &self.database.name)?;
        for user in &self.database.drop_users {
            validate_identifier("database.drop_users", user)?;
        }
        for group in &self.database.drop_groups {
            validate_identifier("database.drop_groups", group)?;
        }

        validate_identifier("roles.dba_user", &self.roles.dba_user)?;
        validate_identifier("roles.import_user", &self.roles.import_user)?;
        validate_identifier("roles.import_group", &self.roles.import_group)?;

        if self.repository.default_path.trim().is_empty() {
            bail!("repository.default_path cannot be empty");
        }
        if self.settings.path.as_os_str().is_empty() {
            bail!("settings.path cannot be empty");
        }

        Ok(())
    }

    /// Placeholder values available to seed files
    ///
    /// Configured extras are added on top of the built-in names and may
    /// override them.
    pub fn template_variables(&self) -> TemplateVariables {
        let mut vars = TemplateVariables::new();
        vars.insert("schema_cadastro".into(), self.schemas.cadastro.clone());
        vars.insert("schema_planejamento".into(), self.schemas.planejamento.clone());
        vars.insert("user_importacao".into(), self.roles.import_user.clone());
        vars.insert("group_importacao".into(), self.roles.import_group.clone());
        vars.extend(self.seed.variables.clone());
        vars
    }
}

/// Role, database and group names end up inside SQL and shell commands.
fn validate_identifier(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        bail!("{field} cannot be empty");
    }
    let valid = value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !value.starts_with(|c: char| c.is_ascii_digit());
    if !valid {
        bail!("{field}: '{value}' is not a plain identifier (letters, digits, underscore)");
    }
    Ok(())
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PostgresConfig {
    /// Directory holding one subdirectory per installed version
    pub config_root: PathBuf,
    /// Oldest version accepted when several are installed
    pub minimum_version: String,
    pub host: String,
    pub port: u16,
    /// Administrative role used by every client command
    pub admin_user: String,
    /// OS account the server runs as
    pub service_user: String,
    /// Name passed to `service <name> restart`
    pub service_name: String,
    /// File produced by `commands.generate_environment`
    pub environment_file: PathBuf,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            config_root: PathBuf::from(pgkit::inventory::DEFAULT_CONFIG_ROOT),
            minimum_version: "9.4".to_string(),
            host: "127.0.0.1".to_string(),
            port: 5432,
            admin_user: "postgres".to_string(),
            service_user: "postgres".to_string(),
            service_name: "postgresql".to_string(),
            environment_file: PathBuf::from("/tmp/environment"),
        }
    }
}

impl PostgresConfig {
    pub fn validate(&self) -> Result<()> {
        self.minimum()?;
        if self.host.trim().is_empty() {
            bail!("postgres.host cannot be empty");
        }
        if self.port == 0 {
            bail!("postgres.port must be greater than zero");
        }
        validate_identifier("postgres.admin_user", &self.admin_user)?;
        if self.service_name.trim().is_empty() {
            bail!("postgres.service_name cannot be empty");
        }
        Ok(())
    }

    /// Parsed minimum version
    pub fn minimum(&self) -> Result<PgVersion> {
        self.minimum_version
            .parse()
            .with_context(|| format!("postgres.minimum_version = '{}'", self.minimum_version))
    }
}

/// What happens after the operator refuses to drop an existing database
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DeclinePolicy {
    /// Run migrations and offer seed data against the kept database
    #[default]
    Continue,
    /// End the run
    Stop,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub name: String,
    /// Roles that must not exist after a reset
    pub drop_users: Vec<String>,
    /// Groups that must not exist after a reset
    pub drop_groups: Vec<String>,
    pub on_reset_declined: DeclinePolicy,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: "sigma_db_dev".to_string(),
            drop_users: [
                "sigma_dba",
                "sigma_importacao",
                "u03491509408",
                "u03455624456",
                "u03895607401",
            ]
            .map(String::from)
            .to_vec(),
            drop_groups: [
                "gadministradores_do_sigma",
                "gusuarios_do_sigma",
                "gimportacao_sigma",
            ]
            .map(String::from)
            .to_vec(),
            on_reset_declined: DeclinePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RolesConfig {
    pub dba_user: String,
    pub import_user: String,
    pub import_group: String,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            dba_user: "sigma_dba".to_string(),
            import_user: "sigma_importacao".to_string(),
            import_group: "gimportacao_sigma".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchemasConfig {
    pub cadastro: String,
    pub planejamento: String,
}

impl Default for SchemasConfig {
    fn default() -> Self {
        Self {
            cadastro: "cadastro".to_string(),
            planejamento: "planejamento".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Offered when the run-control file has no previous answer
    pub default_path: String,
    /// Application checkout, relative to the repository path
    pub project: String,
    /// Library checkout, relative to the repository path
    pub library: String,
    /// Virtualenv directory, relative to the repository path
    pub venv: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_path: "~/repository".to_string(),
            project: "sigma".to_string(),
            library: "sigmalib".to_string(),
            venv: ".sigmavenv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SeedConfig {
    /// Seed tree, relative to the project checkout
    pub dir: PathBuf,
    /// Delete rendered copies after they ran
    pub cleanup_rendered: bool,
    /// Extra placeholder values
    pub variables: BTreeMap<String, String>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("sigma/sql/dev"),
            cleanup_rendered: false,
            variables: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SettingsConfig {
    pub path: PathBuf,
    pub debug: bool,
    pub server_host: String,
    pub server_port: u16,
    pub log_level: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/tmp/sigma.ini"),
            debug: false,
            server_host: "0.0.0.0".to_string(),
            server_port: 6543,
            log_level: "INFO".to_string(),
        }
    }
}

/// Shell snippets, rendered with `{venv}`, `{repository}`, `{project_dir}`,
/// `{library_dir}`, `{settings}` and `{database}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CommandsConfig {
    /// Writes `postgres.environment_file`
    pub generate_environment: String,
    /// Run once when the reset left no database behind, before `migrations`
    pub initial_migrations: Vec<String>,
    /// Run after the database reset, before seed data
    pub migrations: Vec<String>,
    /// Run before the database sequence unless `--resetdb`
    pub provision: Vec<String>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            generate_environment: "source {venv}/bin/activate && sigma_update_postgres_env"
                .to_string(),
            initial_migrations: vec![
                "cd {project_dir} && {venv}/bin/python sigma/migrations/sprint_1.py {settings}"
                    .to_string(),
            ],
            migrations: vec![
                "source {venv}/bin/activate && sigma_run_migrations -b {settings}".to_string(),
            ],
            provision: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SecretsConfig {
    pub postgres_password: Option<String>,
    pub dba_password: Option<String>,
    pub import_password: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = PrepdevConfig::default();
        config.validate().unwrap();
        assert_eq!(config.database.name, "sigma_db_dev");
        assert_eq!(config.postgres.minimum().unwrap(), PgVersion::new(9, 4));
        assert_eq!(config.database.drop_users.len(), 5);
        assert_eq!(config.database.drop_groups.len(), 3);
        assert_eq!(config.commands.initial_migrations.len(), 1);
        assert!(config.commands.initial_migrations[0].contains("sprint_1.py {settings}"));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = PrepdevConfig::load(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(config, PrepdevConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = PrepdevConfig::parse(
            r#"
[postgres]
minimum_version = "12"
port = 5433

[database]
name = "sigma_db_test"
on_reset_declined = "stop"

[seed]
cleanup_rendered = true

[seed.variables]
schema_financeiro = "financeiro"
"#,
        )
        .unwrap();

        assert_eq!(config.postgres.port, 5433);
        assert_eq!(config.postgres.host, "127.0.0.1");
        assert_eq!(config.database.name, "sigma_db_test");
        assert_eq!(config.database.on_reset_declined, DeclinePolicy::Stop);
        assert_eq!(config.database.drop_groups.len(), 3);
        assert!(config.seed.cleanup_rendered);
        assert_eq!(config.settings.path, PathBuf::from("/tmp/sigma.ini"));

        let vars = config.template_variables();
        assert_eq!(vars["schema_financeiro"], "financeiro");
        assert_eq!(vars["schema_cadastro"], "cadastro");
    }

    #[test]
    fn test_template_variables_builtin() {
        let vars = PrepdevConfig::default().template_variables();
        assert_eq!(vars["schema_cadastro"], "cadastro");
        assert_eq!(vars["schema_planejamento"], "planejamento");
        assert_eq!(vars["user_importacao"], "sigma_importacao");
        assert_eq!(vars["group_importacao"], "gimportacao_sigma");
    }

    #[test]
    fn test_rejects_bad_minimum_version() {
        let err = PrepdevConfig::parse("[postgres]\nminimum_version = \"nine\"\n").unwrap_err();
        assert!(format!("{err:#}").contains("minimum_version"));
    }

    #[test]
    fn test_rejects_unsafe_identifiers() {
        for toml in [
            "[database]\nname = \"dev; drop table x\"\n",
            "[database]\nname = \"\"\n",
            "[database]\ndrop_users = [\"ok\", \"it's\"]\n",
            "[roles]\nimport_group = \"1group\"\n",
        ] {
            assert!(PrepdevConfig::parse(toml).is_err(), "accepted: {toml}");
        }
    }

    #[test]
    fn test_rejects_unknown_decline_policy() {
        assert!(PrepdevConfig::parse("[database]\non_reset_declined = \"maybe\"\n").is_err());
    }

    #[test]
    fn test_load_reports_path_on_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[postgres\n").unwrap();
        let err = PrepdevConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }
}
