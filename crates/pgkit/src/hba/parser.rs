//! Parser for `pg_hba.conf` host records.
//!
//! Only TCP `host` records are of interest:
//! ```text
//! # TYPE  DATABASE        USER            ADDRESS                 METHOD
//! host    all             postgres        127.0.0.1/32            trust
//! host    all             all             127.0.0.1  255.255.255.255  md5
//! ```
//! Fields are separated by runs of whitespace. The address may be followed by
//! a separate IP mask column, in which case the method moves one field right.

use std::net::Ipv4Addr;

/// Authentication method of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Connections are allowed unconditionally
    Trust,
    /// MD5 password authentication
    Md5,
    /// Any other method (peer, scram-sha-256, reject, ...)
    Other(String),
}

impl AuthMethod {
    fn from_field(field: &str) -> Self {
        match field {
            "trust" => Self::Trust,
            "md5" => Self::Md5,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One `host` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HbaRule {
    /// Database field (`all`, a name, or a comma list)
    pub database: String,
    /// User field (`all`, a name, or a comma list)
    pub user: String,
    /// Address field as written
    pub address: String,
    /// Separate IP mask column, when present
    pub netmask: Option<String>,
    /// Authentication method
    pub method: AuthMethod,
    /// Line number in the file (1-indexed)
    pub line: usize,
}

/// Parse every `host` record from file content.
pub fn parse_string(content: &str) -> Vec<HbaRule> {
    content
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| parse_line(line, idx + 1))
        .collect()
}

/// Parse one line. Comments, blank lines, other record types and records
/// with too few fields yield `None`.
pub fn parse_line(line: &str, line_num: usize) -> Option<HbaRule> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    let (&kind, rest) = fields.split_first()?;
    if kind != "host" {
        return None;
    }

    let [database, user, address, after_address @ ..] = rest else {
        return None;
    };

    let (netmask, method) = match after_address {
        [mask, method, ..] if is_ip_mask(mask) => (Some((*mask).to_string()), *method),
        [method, ..] => (None, *method),
        [] => return None,
    };

    Some(HbaRule {
        database: (*database).to_string(),
        user: (*user).to_string(),
        address: (*address).to_string(),
        netmask,
        method: AuthMethod::from_field(method),
        line: line_num,
    })
}

fn is_ip_mask(field: &str) -> bool {
    field.parse::<Ipv4Addr>().is_ok()
}
