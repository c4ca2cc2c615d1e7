//! Server discovery and the access-policy gate
//!
//! Runs before anything touches the database: pick the version/cluster, make
//! sure the operator can read its `pg_hba.conf`, and refuse to continue unless
//! the file grants the access the reset needs.

use anyhow::Result;
use pgkit::hba::{self, LOCAL_LINE, PolicyTarget};
use pgkit::{HbaPolicyResult, Inventory, MenuInput, PgVersion, Selection, Selector};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::runner::{CommandRunner, CommandSpec};
use crate::sudo::SudoSession;
use crate::ui;

/// `pg_hba.conf` lacks a required record
#[derive(Debug, Error)]
#[error("{} does not grant the access prepdev needs", .path.display())]
pub struct PolicyViolation {
    pub path: PathBuf,
    pub result: HbaPolicyResult,
}

/// Outcome of the group-membership check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    AlreadyMember(String),
    /// Takes effect at the next login
    Added(String),
    /// No authentication file to check
    Skipped,
}

/// Resolve the version and cluster to work on
pub fn select_target(
    inventory: &dyn Inventory,
    menu: &mut dyn MenuInput,
    minimum: PgVersion,
) -> Result<Selection> {
    let selection = Selector::new(minimum).select(inventory, menu)?;

    if let Ok(version) = selection.version.parse::<PgVersion>() {
        if version < minimum {
            ui::warn(&format!(
                "PostgreSQL {version} is older than the supported minimum {minimum}"
            ));
        }
    }

    ui::kv("Version", &selection.version);
    ui::kv("Cluster", &selection.cluster);
    ui::kv("Authentication file", &selection.hba_path.display().to_string());
    Ok(selection)
}

/// Make `user` a member of the group owning `hba_path`
///
/// Membership changes only apply to new login sessions; nothing is read back.
pub fn ensure_group_membership(
    inventory: &dyn Inventory,
    runner: &dyn CommandRunner,
    hba_path: &Path,
    user: &str,
) -> Result<Membership> {
    if !hba_path.exists() {
        log::debug!("{} does not exist, skipping group check", hba_path.display());
        return Ok(Membership::Skipped);
    }

    let group = inventory.group_owning(hba_path)?;
    if inventory.groups_of_user(user)?.contains(&group) {
        log::debug!("{user} already belongs to {group}");
        return Ok(Membership::AlreadyMember(group));
    }

    {
        let _sudo = SudoSession::acquire(runner, &format!("add {user} to the {group} group"))?;
        runner.run_checked(
            "add user to group",
            &CommandSpec::new("usermod", ["-a", "-G", group.as_str(), user]).privileged(),
        )?;
    }

    ui::warn(&format!(
        "{user} was added to the {group} group. Log out and back in for it to take effect."
    ));
    Ok(Membership::Added(group))
}

/// Check `pg_hba.conf` and stop the run when a record is missing
pub fn enforce_policy(hba_path: &Path, target: PolicyTarget<'_>) -> Result<HbaPolicyResult> {
    let result = hba::validate_file(hba_path, target)?;

    if !result.is_compliant() {
        print_remediation(hba_path, target.admin_role, &result);
        return Err(PolicyViolation {
            path: hba_path.to_path_buf(),
            result,
        }
        .into());
    }

    ui::success("pg_hba.conf grants the required access");
    Ok(result)
}

fn print_remediation(hba_path: &Path, admin_role: &str, result: &HbaPolicyResult) {
    ui::header("pg_hba.conf needs changes");
    if !result.trust_access_present {
        ui::warn(&format!("Missing: trust access for {admin_role} over 127.0.0.1"));
    }
    if !result.local_access_present {
        ui::warn("Missing: md5 access for all users over 127.0.0.1");
    }
    ui::info(&format!(
        "Add these lines to {} (in this order) and restart PostgreSQL:",
        hba_path.display()
    ));
    ui::block(&[hba::trust_line(admin_role).as_str(), LOCAL_LINE]);
}
