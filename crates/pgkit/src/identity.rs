//! User and group lookups.
//!
//! [`Identity`] is the seam between group reconciliation and the account
//! databases. [`SystemIdentity`](crate::nss::SystemIdentity) asks the C
//! library, so accounts from LDAP, SSSD or winbind resolve like local ones.
//! [`IdentityDb`] is an in-memory snapshot parsed from `passwd`/`group`
//! text, used where the real machine must stay out of the picture.

use crate::error::{Error, Result};
use std::collections::BTreeSet;

/// Source of user and group information.
pub trait Identity {
    /// Login name of `uid`, if it has one.
    fn login_name(&self, uid: u32) -> Option<String>;

    /// Name of group `gid`.
    fn group_name(&self, gid: u32) -> Result<String>;

    /// Primary group plus every supplementary group of `user`.
    fn groups_of_user(&self, user: &str) -> Result<BTreeSet<String>>;
}

/// An entry of the account database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    /// Login name
    pub name: String,
    /// Numeric user id
    pub uid: u32,
    /// Primary group id
    pub gid: u32,
}

/// An entry of the group database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    /// Group name
    pub name: String,
    /// Numeric group id
    pub gid: u32,
    /// Supplementary members
    pub members: Vec<String>,
}

/// In-memory snapshot of users and groups.
#[derive(Debug, Clone, Default)]
pub struct IdentityDb {
    users: Vec<UserEntry>,
    groups: Vec<GroupEntry>,
}

impl IdentityDb {
    /// Build from `passwd` and `group` file contents. Malformed lines are
    /// skipped.
    pub fn parse(passwd: &str, group: &str) -> Self {
        let users = passwd.lines().filter_map(parse_passwd_line).collect();
        let groups = group.lines().filter_map(parse_group_line).collect();
        Self { users, groups }
    }

    /// Look up a user by name.
    pub fn user(&self, name: &str) -> Option<&UserEntry> {
        self.users.iter().find(|u| u.name == name)
    }

    /// Look up a user by uid.
    pub fn user_by_uid(&self, uid: u32) -> Option<&UserEntry> {
        self.users.iter().find(|u| u.uid == uid)
    }
}

impl Identity for IdentityDb {
    fn login_name(&self, uid: u32) -> Option<String> {
        self.user_by_uid(uid).map(|u| u.name.clone())
    }

    fn group_name(&self, gid: u32) -> Result<String> {
        self.groups
            .iter()
            .find(|g| g.gid == gid)
            .map(|g| g.name.clone())
            .ok_or(Error::UnknownGroup(gid))
    }

    fn groups_of_user(&self, user: &str) -> Result<BTreeSet<String>> {
        let entry = self
            .user(user)
            .ok_or_else(|| Error::UnknownUser(user.to_string()))?;

        let mut groups: BTreeSet<String> = self
            .groups
            .iter()
            .filter(|g| g.members.iter().any(|m| m == user))
            .map(|g| g.name.clone())
            .collect();

        // A primary gid without a group entry is legal; it just has no name.
        if let Ok(primary) = self.group_name(entry.gid) {
            groups.insert(primary);
        }

        Ok(groups)
    }
}

fn is_skippable(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with('#')
}

fn parse_passwd_line(line: &str) -> Option<UserEntry> {
    if is_skippable(line) {
        return None;
    }
    // name:password:uid:gid:gecos:home:shell
    let mut fields = line.split(':');
    let name = fields.next()?.to_string();
    let _password = fields.next()?;
    let uid = fields.next()?.parse().ok()?;
    let gid = fields.next()?.parse().ok()?;
    Some(UserEntry { name, uid, gid })
}

fn parse_group_line(line: &str) -> Option<GroupEntry> {
    if is_skippable(line) {
        return None;
    }
    // name:password:gid:member1,member2
    let mut fields = line.split(':');
    let name = fields.next()?.to_string();
    let _password = fields.next()?;
    let gid = fields.next()?.parse().ok()?;
    let members = fields
        .next()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(ToString::to_string)
        .collect();
    Some(GroupEntry { name, gid, members })
}
