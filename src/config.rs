//! Per-run configuration
//!
//! File config, repository layout and CLI options are resolved once up front
//! into an immutable [`RunContext`] that is passed down to every step.
//! [`Secrets`] are resolved separately, once the access policy has passed.

use anyhow::{Context, Result};
use pgkit::TemplateVariables;
use pgkit::hba::PolicyTarget;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::paths;
use crate::prompt::Prompter;
use crate::psql::Psql;
use crate::schema::{PrepdevConfig, RepositoryConfig, SecretsConfig, SeedConfig};
use crate::state::RunControl;

pub const ENV_POSTGRES_PASSWORD: &str = "PREPDEV_POSTGRES_PASSWORD";
pub const ENV_DBA_PASSWORD: &str = "PREPDEV_DBA_PASSWORD";
pub const ENV_IMPORT_PASSWORD: &str = "PREPDEV_IMPORT_PASSWORD";

// ============================================================================
// Secrets
// ============================================================================

/// Passwords for the administrative and application roles
#[derive(Clone, PartialEq, Eq)]
pub struct Secrets {
    pub postgres_password: String,
    pub dba_password: String,
    pub import_password: String,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

impl Secrets {
    /// Environment first, then `[secrets]`, then ask
    pub fn resolve(config: &SecretsConfig, prompter: &mut dyn Prompter) -> Result<Self> {
        Self::resolve_with(config, |key| std::env::var(key).ok(), prompter)
    }

    fn resolve_with(
        config: &SecretsConfig,
        env: impl Fn(&str) -> Option<String>,
        prompter: &mut dyn Prompter,
    ) -> Result<Self> {
        let mut pick = |var: &str, configured: &Option<String>, question: &str| -> Result<String> {
            if let Some(value) = env(var).filter(|v| !v.is_empty()) {
                log::debug!("Using {var} from the environment");
                return Ok(value);
            }
            if let Some(value) = configured.as_ref().filter(|v| !v.is_empty()) {
                return Ok(value.clone());
            }
            prompter.password(question)
        };

        Ok(Self {
            postgres_password: pick(
                ENV_POSTGRES_PASSWORD,
                &config.postgres_password,
                "Password for the PostgreSQL administrator",
            )?,
            dba_password: pick(
                ENV_DBA_PASSWORD,
                &config.dba_password,
                "Password for the application DBA role",
            )?,
            import_password: pick(
                ENV_IMPORT_PASSWORD,
                &config.import_password,
                "Password for the import role",
            )?,
        })
    }
}

// ============================================================================
// Repository layout
// ============================================================================

/// Where the checkouts, virtualenv and seed tree live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub repository: PathBuf,
    pub project_dir: PathBuf,
    pub library_dir: PathBuf,
    pub venv_dir: PathBuf,
    pub seed_dir: PathBuf,
}

impl Workspace {
    pub fn new(repository: &Path, layout: &RepositoryConfig, seed: &SeedConfig) -> Self {
        Self {
            repository: repository.to_path_buf(),
            project_dir: repository.join(&layout.project),
            library_dir: repository.join(&layout.library),
            venv_dir: repository.join(&layout.venv),
            seed_dir: repository.join(&seed.dir),
        }
    }
}

/// Resolve the repository path
///
/// `explicit` (from `-p`) wins. Otherwise the operator is asked, offering the
/// remembered answer or `default`. The result is `~`-expanded and remembered
/// when `persist` is set.
pub fn resolve_repository(
    explicit: Option<&Path>,
    default: &str,
    rc: &mut RunControl,
    prompter: &mut dyn Prompter,
    persist: bool,
) -> Result<PathBuf> {
    let answer = match explicit {
        Some(path) => path.to_string_lossy().to_string(),
        None => {
            let offered = rc.repository_path().unwrap_or(default).to_string();
            prompter.input("Where should the code live?", &offered)?
        }
    };
    let path = paths::expand(answer.trim());

    if persist {
        rc.set_repository_path(&path);
        rc.save()?;
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Could not create {}", path.display()))?;
    }

    Ok(path)
}

// ============================================================================
// Run context
// ============================================================================

/// Behaviour switches from the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// `--resetdb`: skip provisioning hooks
    pub reset_only: bool,
    /// `--excludedb`: drop an existing database without asking
    pub skip_confirmation: bool,
    pub dry_run: bool,
}

/// Immutable inputs of one provisioning run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: PrepdevConfig,
    pub options: RunOptions,
    pub workspace: Workspace,
    pub psql: Psql,
}

impl RunContext {
    pub fn new(config: PrepdevConfig, options: RunOptions, repository: &Path) -> Self {
        let workspace = Workspace::new(repository, &config.repository, &config.seed);
        let psql = Psql::from_config(&config.postgres);
        Self {
            config,
            options,
            workspace,
            psql,
        }
    }

    pub fn database(&self) -> &str {
        &self.config.database.name
    }

    /// What `pg_hba.conf` must grant for this run
    pub fn policy_target(&self) -> PolicyTarget<'_> {
        PolicyTarget::new(self.database()).with_admin_role(&self.config.postgres.admin_user)
    }

    /// Values available to configured shell commands, quoted for the shell
    pub fn command_variables(&self) -> TemplateVariables {
        let ws = &self.workspace;
        [
            ("repository", &ws.repository),
            ("project_dir", &ws.project_dir),
            ("library_dir", &ws.library_dir),
            ("venv", &ws.venv_dir),
            ("settings", &self.config.settings.path),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), shell_quote(&v.to_string_lossy())))
        .chain([("database".to_string(), shell_quote(self.database()))])
        .collect()
    }

    /// Fill the placeholders of a configured command
    pub fn render_command(&self, template: &str) -> Result<String> {
        pgkit::template::render(template, &self.command_variables())
            .with_context(|| format!("Invalid command template: {template}"))
    }
}

/// Quote `value` as one POSIX shell word
///
/// Plain paths are left as they are so rendered commands stay readable.
fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_./:=@%+,-".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::context;
    use super::*;
    use crate::prompt::testing::ScriptedPrompter;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_secrets_precedence() {
        let config = SecretsConfig {
            postgres_password: Some("from-config".to_string()),
            dba_password: Some("dba-config".to_string()),
            import_password: None,
        };
        let env: HashMap<&str, &str> = [(ENV_DBA_PASSWORD, "dba-env")].into_iter().collect();
        let mut prompter = ScriptedPrompter::new(&["typed"]);

        let secrets = Secrets::resolve_with(
            &config,
            |k| env.get(k).map(ToString::to_string),
            &mut prompter,
        )
        .unwrap();

        assert_eq!(secrets.postgres_password, "from-config");
        assert_eq!(secrets.dba_password, "dba-env");
        assert_eq!(secrets.import_password, "typed");
        assert_eq!(prompter.asked, vec!["Password for the import role"]);
    }

    #[test]
    fn test_secrets_debug_is_redacted() {
        let shown = format!("{:?}", testing::secrets());
        assert!(!shown.contains("secret"));
    }

    #[test]
    fn test_explicit_repository_skips_prompt() {
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path().join("code");
        let mut rc = RunControl::load(&tmp.path().join("prepdevrc")).unwrap();
        let mut prompter = ScriptedPrompter::new(&[]);

        let path = resolve_repository(Some(&repo), "~/repository", &mut rc, &mut prompter, true)
            .unwrap();

        assert_eq!(path, repo);
        assert!(repo.is_dir());
        assert!(prompter.asked.is_empty());
        let reloaded = RunControl::load(rc.path()).unwrap();
        assert_eq!(reloaded.repository_path(), repo.to_str());
    }

    #[test]
    fn test_prompt_offers_remembered_path() {
        let tmp = TempDir::new().unwrap();
        let remembered = tmp.path().join("remembered");
        let mut rc = RunControl::load(&tmp.path().join("prepdevrc")).unwrap();
        rc.set_repository_path(&remembered);
        let mut prompter = ScriptedPrompter::new(&[""]);

        let path =
            resolve_repository(None, "~/repository", &mut rc, &mut prompter, false).unwrap();

        assert_eq!(path, remembered);
        assert!(!remembered.exists());
    }

    #[test]
    fn test_prompt_answer_is_expanded() {
        let tmp = TempDir::new().unwrap();
        let mut rc = RunControl::load(&tmp.path().join("prepdevrc")).unwrap();
        let mut prompter = ScriptedPrompter::new(&["~/elsewhere"]);

        let path =
            resolve_repository(None, "~/repository", &mut rc, &mut prompter, false).unwrap();

        assert_eq!(path, dirs::home_dir().unwrap().join("elsewhere"));
    }

    #[test]
    fn test_workspace_layout() {
        let ctx = context(Path::new("/srv/repository"), RunOptions::default());
        let ws = &ctx.workspace;
        assert_eq!(ws.project_dir, PathBuf::from("/srv/repository/sigma"));
        assert_eq!(ws.library_dir, PathBuf::from("/srv/repository/sigmalib"));
        assert_eq!(ws.venv_dir, PathBuf::from("/srv/repository/.sigmavenv"));
        assert_eq!(ws.seed_dir, PathBuf::from("/srv/repository/sigma/sql/dev"));
    }

    #[test]
    fn test_render_command() {
        let ctx = context(Path::new("/srv/repository"), RunOptions::default());
        let cmd = ctx
            .render_command("source {venv}/bin/activate && sigma_run_migrations -b {settings}")
            .unwrap();
        assert_eq!(
            cmd,
            "source /srv/repository/.sigmavenv/bin/activate && sigma_run_migrations -b /tmp/sigma.ini"
        );
        assert!(ctx.render_command("{unknown}").is_err());
    }

    #[test]
    fn test_render_command_quotes_paths() {
        let ctx = context(Path::new("/srv/my repo"), RunOptions::default());
        let cmd = ctx.render_command("source {venv}/bin/activate").unwrap();
        assert_eq!(cmd, "source '/srv/my repo/.sigmavenv'/bin/activate");

        let ctx = context(Path::new("/srv/o'brien; rm -rf ~"), RunOptions::default());
        let cmd = ctx.render_command("cd {repository}").unwrap();
        assert_eq!(cmd, r"cd '/srv/o'\''brien; rm -rf ~'");
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/srv/repository/sigma"), "/srv/repository/sigma");
        assert_eq!(shell_quote("sigma_db_dev"), "sigma_db_dev");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("$HOME"), "'$HOME'");
        assert_eq!(shell_quote("a'b"), r"'a'\''b'");
    }
}
