//! Access policy required by the provisioning sequence.
//!
//! Two records must be present:
//! - a `trust` record letting the administrator role in over loopback, so the
//!   tool can administer the server without a password;
//! - an `md5` record letting every user in over loopback, so the application
//!   roles can log in with their passwords.

use super::parser::{self, AuthMethod, HbaRule};
use crate::error::{Error, Result};
use serde::Serialize;
use std::path::Path;

/// Addresses accepted as loopback.
pub const LOOPBACK_ADDRESSES: &[&str] = &["127.0.0.1", "0.0.0.0", "127.0.0.1/32"];

/// Administrator role of a stock installation.
pub const DEFAULT_ADMIN_ROLE: &str = "postgres";

/// Canonical trust record for [`DEFAULT_ADMIN_ROLE`].
pub const TRUST_LINE: &str = "host    all             postgres        127.0.0.1/32            trust";

/// Canonical md5 record shown in remediation output.
pub const LOCAL_LINE: &str = "host    all             all             127.0.0.1/32            md5";

/// Canonical trust record for `admin_role`.
pub fn trust_line(admin_role: &str) -> String {
    format!("host    all             {admin_role:<15} 127.0.0.1/32            trust")
}

/// What a policy check is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyTarget<'a> {
    /// Database the application roles connect to
    pub database: &'a str,
    /// Role the tool itself connects as
    pub admin_role: &'a str,
}

impl<'a> PolicyTarget<'a> {
    /// Target `database` administered by [`DEFAULT_ADMIN_ROLE`].
    pub fn new(database: &'a str) -> Self {
        Self {
            database,
            admin_role: DEFAULT_ADMIN_ROLE,
        }
    }

    /// Use `admin_role` for the trust record.
    pub fn with_admin_role(mut self, admin_role: &'a str) -> Self {
        self.admin_role = admin_role;
        self
    }
}

/// Outcome of checking an authentication file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HbaPolicyResult {
    /// `trust` for the administrator role over loopback
    pub trust_access_present: bool,
    /// `md5` for `all` over loopback
    pub local_access_present: bool,
}

impl HbaPolicyResult {
    /// Both required records are present.
    pub fn is_compliant(&self) -> bool {
        self.trust_access_present && self.local_access_present
    }

    /// Canonical lines for every missing record, in file order.
    pub fn missing_lines(&self, admin_role: &str) -> Vec<String> {
        let mut lines = Vec::new();
        if !self.trust_access_present {
            lines.push(trust_line(admin_role));
        }
        if !self.local_access_present {
            lines.push(LOCAL_LINE.to_string());
        }
        lines
    }
}

/// Evaluate parsed records against the policy for `target`.
///
/// Each flag is OR-ed across all records; no single record has to satisfy
/// both.
pub fn evaluate(rules: &[HbaRule], target: PolicyTarget<'_>) -> HbaPolicyResult {
    let mut result = HbaPolicyResult::default();

    for rule in rules {
        let database_ok = rule.database == "all" || rule.database == target.database;
        let address_ok = LOOPBACK_ADDRESSES.contains(&rule.address.as_str());
        if !database_ok || !address_ok {
            continue;
        }

        match rule.method {
            AuthMethod::Trust if rule.user == target.admin_role => {
                result.trust_access_present = true;
            }
            AuthMethod::Md5 if rule.user == "all" => result.local_access_present = true,
            _ => {}
        }
    }

    result
}

/// Evaluate file content.
pub fn validate_str(content: &str, target: PolicyTarget<'_>) -> HbaPolicyResult {
    evaluate(&parser::parse_string(content), target)
}

/// Evaluate the file at `path`.
///
/// A missing file is a policy violation, not an error: both flags come back
/// `false`. Denied access is reported as [`Error::PermissionDenied`].
pub fn validate_file(path: &Path, target: PolicyTarget<'_>) -> Result<HbaPolicyResult> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(validate_str(&content, target)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HbaPolicyResult::default()),
        Err(e) => Err(Error::from_io(e, path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DB: PolicyTarget<'static> = PolicyTarget {
        database: "sigma_db_dev",
        admin_role: DEFAULT_ADMIN_ROLE,
    };

    #[test]
    fn test_no_matching_records() {
        let content = "\
# Database administrative login by Unix domain socket
local   all             postgres                                peer
local   all             all                                     peer
host    all             all             ::1/128                 md5
host    all             all             127.0.0.1/32            scram-sha-256
";
        let result = validate_str(content, DB);
        assert_eq!(result, HbaPolicyResult::default());
        assert!(!result.is_compliant());
    }

    #[test]
    fn test_empty_file() {
        assert_eq!(validate_str("", DB), HbaPolicyResult::default());
    }

    #[test]
    fn test_canonical_lines_in_either_order() {
        let forward = format!("{TRUST_LINE}\n{LOCAL_LINE}\n");
        let reverse = format!("{LOCAL_LINE}\n{TRUST_LINE}\n");
        for content in [forward, reverse] {
            let result = validate_str(&content, DB);
            assert!(result.trust_access_present);
            assert!(result.local_access_present);
            assert!(result.is_compliant());
        }
    }

    #[test]
    fn test_target_database_counts_as_all() {
        let content = "\
host sigma_db_dev postgres 127.0.0.1 trust
host sigma_db_dev all 0.0.0.0 md5
";
        assert!(validate_str(content, DB).is_compliant());
        assert!(!validate_str(content, PolicyTarget::new("other_db")).trust_access_present);
    }

    #[test]
    fn test_wrong_user_or_address_does_not_count() {
        let content = "\
host all dev 127.0.0.1/32 trust
host all postgres 10.0.0.0/8 trust
host all postgres 127.0.0.1/32 md5
host all sigma_dba 127.0.0.1/32 md5
";
        let result = validate_str(content, DB);
        assert!(!result.trust_access_present);
        assert!(!result.local_access_present);
    }

    #[test]
    fn test_commented_records_ignored() {
        let content = format!("# {TRUST_LINE}\n#{LOCAL_LINE}\n");
        assert_eq!(validate_str(&content, DB), HbaPolicyResult::default());
    }

    #[test]
    fn test_flags_are_independent() {
        let result = validate_str(TRUST_LINE, DB);
        assert!(result.trust_access_present);
        assert!(!result.local_access_present);
        assert_eq!(result.missing_lines("postgres"), vec![LOCAL_LINE]);
    }

    #[test]
    fn test_missing_lines_when_none_present() {
        let result = HbaPolicyResult::default();
        assert_eq!(result.missing_lines("postgres"), vec![TRUST_LINE, LOCAL_LINE]);
    }

    #[test]
    fn test_validate_missing_file_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let result = validate_file(&tmp.path().join("pg_hba.conf"), DB).unwrap();
        assert_eq!(result, HbaPolicyResult::default());
    }

    #[test]
    fn test_validate_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pg_hba.conf");
        std::fs::write(&path, format!("{LOCAL_LINE}\n{TRUST_LINE}\n")).unwrap();
        assert!(validate_file(&path, DB).unwrap().is_compliant());
    }

    #[test]
    fn test_trust_record_follows_admin_role() {
        let content = "\
host all dba_admin 127.0.0.1/32 trust
host all all 127.0.0.1/32 md5
";
        let custom = PolicyTarget::new("sigma_db_dev").with_admin_role("dba_admin");
        assert!(validate_str(content, custom).is_compliant());
        assert!(!validate_str(content, DB).trust_access_present);
        assert!(!validate_str(TRUST_LINE, custom).trust_access_present);
    }

    #[test]
    fn test_trust_line_for_role() {
        assert_eq!(trust_line(DEFAULT_ADMIN_ROLE), TRUST_LINE);
        let line = trust_line("dba_admin");
        let result = validate_str(&line, PolicyTarget::new("x").with_admin_role("dba_admin"));
        assert!(result.trust_access_present);
        assert_eq!(
            HbaPolicyResult::default().missing_lines("dba_admin"),
            vec![line, LOCAL_LINE.to_string()]
        );
    }

    #[test]
    fn test_separate_netmask_column() {
        let content = "\
host all postgres 127.0.0.1 255.255.255.255 trust
host all all 127.0.0.1 255.255.255.255 md5
";
        assert!(validate_str(content, DB).is_compliant());
    }
}
