//! Scoped sudo session
//!
//! Sudo is never requested for the whole run. Credentials are validated once
//! right before a privileged batch and invalidated when the session drops.

use anyhow::Result;

use crate::runner::{CommandRunner, CommandSpec};

/// Validated sudo credentials, invalidated on drop
pub struct SudoSession<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> SudoSession<'a> {
    /// Acquire sudo privileges with a reason shown to the user
    pub fn acquire(runner: &'a dyn CommandRunner, reason: &str) -> Result<Self> {
        eprintln!();
        eprintln!("  Sudo required: {reason}");
        eprintln!();

        runner.run_checked(
            "sudo validation",
            &CommandSpec::new("sudo", ["-v"]).surfaced(),
        )?;

        Ok(Self { runner })
    }
}

impl Drop for SudoSession<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.runner.run(&CommandSpec::new("sudo", ["-k"])) {
            log::debug!("sudo -k failed: {e:#}");
        }
    }
}
