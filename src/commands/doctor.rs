//! Read-only health check of the PostgreSQL development setup

use anyhow::Result;
use colored::Colorize;
use pgkit::hba::{self, PolicyTarget};
use pgkit::{Inventory, PgVersion};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::psql;
use crate::runner::{CommandRunner, SystemRunner};
use crate::schema::PrepdevConfig;
use crate::state::RunControl;
use crate::{paths, system, ui};

#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub category: &'static str,
    pub summary: String,
    pub detail: Option<String>,
    pub fix: Option<String>,
    pub fix_cmd: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientReport {
    pub installed: bool,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterReport {
    pub version: String,
    pub cluster: String,
    pub hba_path: PathBuf,
    /// At least the configured minimum
    pub supported: bool,
    /// `None` when the file could not be read
    pub policy: Option<hba::HbaPolicyResult>,
    pub owner_group: Option<String>,
    pub member: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    pub config_file: PathBuf,
    pub config_error: Option<String>,
    pub user: Option<String>,
    pub client: ClientReport,
    pub clusters: Vec<ClusterReport>,
    pub repository_path: Option<PathBuf>,
    pub seed_files: usize,
    pub issues: Vec<Issue>,
}

/// Inputs of a check, so tests can swap the machine out
pub struct Subject<'a> {
    pub config: &'a PrepdevConfig,
    pub config_file: &'a Path,
    pub config_error: Option<String>,
    pub inventory: &'a dyn Inventory,
    pub runner: &'a dyn CommandRunner,
    pub rc: &'a RunControl,
    pub user: Option<String>,
}

pub fn run(config_file: &Path, json: bool) -> Result<()> {
    let (config, config_error) = match PrepdevConfig::load(config_file) {
        Ok(config) => (config, None),
        Err(e) => (PrepdevConfig::default(), Some(format!("{e:#}"))),
    };

    let inventory = pgkit::FsInventory::new(config.postgres.config_root.clone());
    let user = match system::current_user(inventory.identity()) {
        Ok(user) => Some(user),
        Err(e) => {
            log::debug!("Could not determine the current user: {e:#}");
            None
        }
    };
    let rc = RunControl::load(&paths::rc_file()?)?;
    let runner = SystemRunner;

    let report = collect(&Subject {
        config: &config,
        config_file,
        config_error,
        inventory: &inventory,
        runner: &runner,
        rc: &rc,
        user,
    });

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Run every check and gather the findings
pub fn collect(subject: &Subject<'_>) -> DoctorReport {
    let mut issues = Vec::new();

    if let Some(error) = &subject.config_error {
        issues.push(Issue {
            category: "Configuration",
            summary: format!("{} is invalid", subject.config_file.display()),
            detail: Some(error.clone()),
            fix: Some("Fix the file; defaults were used for this check".into()),
            fix_cmd: Some(format!("$EDITOR {}", subject.config_file.display())),
        });
    }

    let minimum = subject
        .config
        .postgres
        .minimum()
        .unwrap_or_else(|_| PgVersion::new(9, 4));

    let client = check_client(subject.runner, minimum, &mut issues);
    let clusters = check_clusters(subject, minimum, &mut issues);
    let (repository_path, seed_files) = check_repository(subject, &mut issues);

    DoctorReport {
        config_file: subject.config_file.to_path_buf(),
        config_error: subject.config_error.clone(),
        user: subject.user.clone(),
        client,
        clusters,
        repository_path,
        seed_files,
        issues,
    }
}

fn check_client(
    runner: &dyn CommandRunner,
    minimum: PgVersion,
    issues: &mut Vec<Issue>,
) -> ClientReport {
    let output = match runner.run(&psql::client_version()) {
        Ok(output) if output.success() => output,
        _ => {
            issues.push(Issue {
                category: "Client",
                summary: "psql is not installed".into(),
                detail: Some("Every database step runs through the psql client".into()),
                fix: Some("Install the PostgreSQL client".into()),
                fix_cmd: Some("sudo apt install postgresql-client".into()),
            });
            return ClientReport::default();
        }
    };

    match PgVersion::from_client_output(&output.stdout) {
        Ok(version) => {
            if version < minimum {
                issues.push(Issue {
                    category: "Client",
                    summary: format!("psql {version} is older than {minimum}"),
                    detail: None,
                    fix: Some(format!("Install PostgreSQL {minimum} or newer")),
                    fix_cmd: None,
                });
            }
            ClientReport {
                installed: true,
                version: Some(version.to_string()),
            }
        }
        Err(e) => {
            log::debug!("Unrecognised psql --version output: {e}");
            ClientReport {
                installed: true,
                version: None,
            }
        }
    }
}

fn check_clusters(
    subject: &Subject<'_>,
    minimum: PgVersion,
    issues: &mut Vec<Issue>,
) -> Vec<ClusterReport> {
    let versions = match subject.inventory.list_postgres_versions() {
        Ok(versions) => versions,
        Err(e) => {
            issues.push(Issue {
                category: "Server",
                summary: "No PostgreSQL server configuration found".into(),
                detail: Some(e.to_string()),
                fix: Some("Install the PostgreSQL server".into()),
                fix_cmd: Some("sudo apt install postgresql".into()),
            });
            return Vec::new();
        }
    };

    let target = PolicyTarget::new(&subject.config.database.name)
        .with_admin_role(&subject.config.postgres.admin_user);
    let mut reports = Vec::new();

    for version in &versions {
        let supported = version
            .parse::<PgVersion>()
            .is_ok_and(|v| v >= minimum);
        let clusters = subject.inventory.list_clusters(version).unwrap_or_default();
        if clusters.is_empty() {
            issues.push(Issue {
                category: "Server",
                summary: format!("PostgreSQL {version} has no cluster"),
                detail: None,
                fix: Some("Create a cluster".into()),
                fix_cmd: Some(format!("sudo pg_createcluster {version} main --start")),
            });
        }

        for cluster in clusters {
            let hba_path = subject.inventory.hba_path(version, &cluster);
            reports.push(check_cluster(
                subject, version, &cluster, &hba_path, supported, target, issues,
            ));
        }
    }

    if !versions.is_empty() && !reports.iter().any(|r| r.supported) {
        issues.push(Issue {
            category: "Server",
            summary: format!("No installed version is {minimum} or newer"),
            detail: Some(format!("Found: {}", versions.join(", "))),
            fix: None,
            fix_cmd: None,
        });
    }

    reports
}

fn check_cluster(
    subject: &Subject<'_>,
    version: &str,
    cluster: &str,
    hba_path: &Path,
    supported: bool,
    target: PolicyTarget<'_>,
    issues: &mut Vec<Issue>,
) -> ClusterReport {
    let owner_group = subject.inventory.group_owning(hba_path).ok();
    let member = match (&owner_group, &subject.user) {
        (Some(group), Some(user)) => subject
            .inventory
            .groups_of_user(user)
            .ok()
            .map(|groups| groups.contains(group)),
        _ => None,
    };

    if let (Some(false), Some(group), Some(user)) = (member, &owner_group, &subject.user) {
        issues.push(Issue {
            category: "Permissions",
            summary: format!("{user} is not in the {group} group"),
            detail: Some(format!("{} cannot be checked without it", hba_path.display())),
            fix: Some("Add yourself to the group, then log out and back in".into()),
            fix_cmd: Some(format!("sudo usermod -a -G {group} {user}")),
        });
    }

    let policy = match hba::validate_file(hba_path, target) {
        Ok(policy) => Some(policy),
        Err(e) => {
            if member != Some(false) {
                issues.push(Issue {
                    category: "Permissions",
                    summary: format!("Cannot read {}", hba_path.display()),
                    detail: Some(e.to_string()),
                    fix: Some(e.category().advice().into()),
                    fix_cmd: None,
                });
            }
            None
        }
    };

    if let Some(policy) = policy.filter(|p| !p.is_compliant()) {
        issues.push(Issue {
            category: "Access Policy",
            summary: format!("{version}/{cluster} pg_hba.conf is missing required records"),
            detail: Some(policy.missing_lines(target.admin_role).join("\n")),
            fix: Some(format!(
                "Add the lines above to {} and restart PostgreSQL",
                hba_path.display()
            )),
            fix_cmd: None,
        });
    }

    ClusterReport {
        version: version.to_string(),
        cluster: cluster.to_string(),
        hba_path: hba_path.to_path_buf(),
        supported,
        policy,
        owner_group,
        member,
    }
}

fn check_repository(subject: &Subject<'_>, issues: &mut Vec<Issue>) -> (Option<PathBuf>, usize) {
    let Some(path) = subject.rc.repository_path().map(paths::expand) else {
        return (None, 0);
    };

    if !path.is_dir() {
        issues.push(Issue {
            category: "Repository",
            summary: format!("Remembered repository {} does not exist", path.display()),
            detail: None,
            fix: Some("Run prepdev again and choose the repository path".into()),
            fix_cmd: None,
        });
        return (Some(path), 0);
    }

    let seed_dir = path.join(&subject.config.seed.dir);
    let seed_files = pgkit::seed::discover(&seed_dir).map_or(0, |files| files.len());
    (Some(path), seed_files)
}

// ============================================================================
// Output
// ============================================================================

fn print_report(report: &DoctorReport) {
    ui::header("prepdev doctor");

    ui::section("Configuration");
    ui::kv("Config file", &report.config_file.display().to_string());
    if let Some(user) = &report.user {
        ui::kv("User", user);
    }

    ui::section("Client");
    match (report.client.installed, &report.client.version) {
        (true, Some(version)) => println!("  {} psql {}", "✓".green(), version),
        (true, None) => println!("  {} psql {}", "⚠".yellow(), "(unknown version)".yellow()),
        (false, _) => println!("  {} psql {}", "✗".red(), "(missing)".red()),
    }

    ui::section("Clusters");
    if report.clusters.is_empty() {
        ui::dim("none found");
    }
    for cluster in &report.clusters {
        let ok = cluster.supported && cluster.policy.is_some_and(|p| p.is_compliant());
        let symbol = if ok { "✓".green() } else { "⚠".yellow() };
        println!("  {} {}/{}", symbol, cluster.version, cluster.cluster);
        match &cluster.policy {
            Some(policy) => {
                ui::kv("    trust for postgres", ui::yes_no(policy.trust_access_present));
                ui::kv("    md5 for all", ui::yes_no(policy.local_access_present));
            }
            None => ui::dim("  pg_hba.conf not readable"),
        }
    }

    ui::section("Repository");
    match &report.repository_path {
        Some(path) => {
            ui::kv("Path", &path.display().to_string());
            ui::kv("Seed files", &report.seed_files.to_string());
        }
        None => ui::dim("not chosen yet"),
    }

    println!();
    if report.issues.is_empty() {
        ui::success("All checks passed!");
    } else {
        print_issue_summary(&report.issues);
    }
}

fn print_issue_summary(issues: &[Issue]) {
    let count = issues.len();
    let label = if count == 1 { "Issue" } else { "Issues" };
    ui::header(&format!("{count} {label} Found"));

    for (i, issue) in issues.iter().enumerate() {
        let num = i + 1;
        println!(
            "  {}  {} {}",
            format!("{num}.").bold(),
            issue.summary,
            format!("[{}]", issue.category).dimmed()
        );
        if let Some(detail) = &issue.detail {
            for line in detail.lines() {
                println!("      {}", line.dimmed());
            }
        }
        if let Some(fix) = &issue.fix {
            println!("      {} {}", "Fix:".cyan(), fix);
        }
        if let Some(cmd) = &issue.fix_cmd {
            println!("      {} {}", "$".dimmed(), cmd.bold());
        }
        println!();
    }

    let fix_cmds: Vec<&str> = issues.iter().filter_map(|i| i.fix_cmd.as_deref()).collect();
    if !fix_cmds.is_empty() {
        ui::section("Quick Fixes");
        for cmd in &fix_cmds {
            println!("    {}", cmd.bold());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandOutput;
    use crate::runner::testing::RecordingRunner;
    use pgkit::hba::{LOCAL_LINE, TRUST_LINE};
    use pgkit::{FsInventory, IdentityDb};
    use std::fs;
    use std::os::unix::fs::MetadataExt;
    use tempfile::TempDir;

    struct Setup {
        tmp: TempDir,
        config: PrepdevConfig,
        rc: RunControl,
    }

    impl Setup {
        fn new(clusters: &[(&str, &str)]) -> Self {
            let tmp = TempDir::new().unwrap();
            for (version, hba) in clusters {
                let dir = tmp.path().join("etc").join(version).join("main");
                fs::create_dir_all(&dir).unwrap();
                fs::write(dir.join("pg_hba.conf"), hba).unwrap();
            }
            let rc = RunControl::load(&tmp.path().join("prepdevrc")).unwrap();
            Self {
                tmp,
                config: PrepdevConfig::default(),
                rc,
            }
        }

        /// `dev` owns the tree; `member` decides whether it is in the owning group
        fn inventory(&self, member: bool) -> FsInventory {
            let meta = fs::metadata(self.tmp.path()).unwrap();
            let primary = if member { meta.gid() } else { meta.gid() + 1 };
            let passwd = format!("dev:x:{}:{primary}::/home/dev:/bin/bash\n", meta.uid());
            let group = format!("owner:x:{}:\nother:x:{}:\n", meta.gid(), meta.gid() + 1);
            FsInventory::with_identity(self.tmp.path().join("etc"), IdentityDb::parse(&passwd, &group))
        }

        fn collect(&self, inventory: &FsInventory, runner: &RecordingRunner) -> DoctorReport {
            collect(&Subject {
                config: &self.config,
                config_file: &self.tmp.path().join("config.toml"),
                config_error: None,
                inventory,
                runner,
                rc: &self.rc,
                user: Some("dev".to_string()),
            })
        }
    }

    fn psql_14() -> RecordingRunner {
        RecordingRunner::new().reply(
            "--version",
            CommandOutput::ok("psql (PostgreSQL) 14.9 (Ubuntu 14.9-0ubuntu0.22.04.1)\n"),
        )
    }

    #[test]
    fn test_healthy_machine_has_no_issues() {
        let setup = Setup::new(&[("14", &format!("{TRUST_LINE}\n{LOCAL_LINE}\n"))]);
        let report = setup.collect(&setup.inventory(true), &psql_14());

        assert!(report.issues.is_empty(), "{:?}", report.issues);
        assert_eq!(report.client.version.as_deref(), Some("14.9"));
        assert_eq!(report.clusters.len(), 1);
        assert_eq!(report.clusters[0].member, Some(true));
        assert!(report.clusters[0].policy.unwrap().is_compliant());
    }

    #[test]
    fn test_missing_client() {
        let setup = Setup::new(&[("14", &format!("{TRUST_LINE}\n{LOCAL_LINE}\n"))]);
        let runner = RecordingRunner::new().reply("--version", CommandOutput::failed(127, ""));
        let report = setup.collect(&setup.inventory(true), &runner);

        assert!(!report.client.installed);
        assert!(report.issues.iter().any(|i| i.summary == "psql is not installed"));
    }

    #[test]
    fn test_old_client_is_flagged() {
        let setup = Setup::new(&[("9.4", &format!("{TRUST_LINE}\n{LOCAL_LINE}\n"))]);
        let runner =
            RecordingRunner::new().reply("--version", CommandOutput::ok("psql (PostgreSQL) 9.3.24\n"));
        let report = setup.collect(&setup.inventory(true), &runner);

        assert!(report.issues.iter().any(|i| i.summary.contains("older than 9.4")));
    }

    #[test]
    fn test_non_compliant_policy_lists_missing_lines() {
        let setup = Setup::new(&[("14", TRUST_LINE)]);
        let report = setup.collect(&setup.inventory(true), &psql_14());

        let issue = report
            .issues
            .iter()
            .find(|i| i.category == "Access Policy")
            .unwrap();
        assert_eq!(issue.detail.as_deref(), Some(LOCAL_LINE));
    }

    #[test]
    fn test_non_member_gets_usermod_fix() {
        let setup = Setup::new(&[("14", &format!("{TRUST_LINE}\n{LOCAL_LINE}\n"))]);
        let report = setup.collect(&setup.inventory(false), &psql_14());

        let issue = report
            .issues
            .iter()
            .find(|i| i.category == "Permissions")
            .unwrap();
        assert_eq!(issue.fix_cmd.as_deref(), Some("sudo usermod -a -G owner dev"));
    }

    #[test]
    fn test_unsupported_versions_only() {
        let setup = Setup::new(&[("9.1", ""), ("9.3", "")]);
        let report = setup.collect(&setup.inventory(true), &psql_14());
        assert!(report.clusters.iter().all(|c| !c.supported));
        assert!(report.issues.iter().any(|i| i.summary.contains("9.4 or newer")));
    }

    #[test]
    fn test_missing_server_root() {
        let setup = Setup::new(&[]);
        let inventory = FsInventory::with_identity(
            setup.tmp.path().join("nowhere"),
            IdentityDb::parse("", ""),
        );
        let report = setup.collect(&inventory, &psql_14());
        assert!(report.clusters.is_empty());
        assert!(report.issues.iter().any(|i| i.category == "Server"));
    }

    #[test]
    fn test_repository_seed_count() {
        let mut setup = Setup::new(&[("14", &format!("{TRUST_LINE}\n{LOCAL_LINE}\n"))]);
        let repo = setup.tmp.path().join("repo");
        let seed = repo.join("sigma/sql/dev/cadastro");
        fs::create_dir_all(&seed).unwrap();
        fs::write(seed.join("01.sql"), "").unwrap();
        fs::write(repo.join("sigma/sql/dev/02.sql"), "").unwrap();
        setup.rc.set_repository_path(&repo);

        let report = setup.collect(&setup.inventory(true), &psql_14());
        assert_eq!(report.repository_path, Some(repo));
        assert_eq!(report.seed_files, 2);
    }

    #[test]
    fn test_report_serializes() {
        let setup = Setup::new(&[("14", TRUST_LINE)]);
        let report = setup.collect(&setup.inventory(true), &psql_14());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["clusters"][0]["policy"]["trust_access_present"], true);
        assert_eq!(json["clusters"][0]["policy"]["local_access_present"], false);
    }
}
