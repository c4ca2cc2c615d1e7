//! Discovery of installed PostgreSQL versions and clusters.
//!
//! The [`Inventory`] trait is the seam between selection logic and the
//! machine: [`FsInventory`] reads the real configuration tree, tests provide
//! their own implementation.

use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::nss::SystemIdentity;
use crate::version::PgVersion;
use std::collections::BTreeSet;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

/// Debian/Ubuntu configuration root.
pub const DEFAULT_CONFIG_ROOT: &str = "/etc/postgresql";

/// Name of the host-based authentication file inside a cluster directory.
pub const HBA_FILE_NAME: &str = "pg_hba.conf";

/// Read-only view of the PostgreSQL installation and local identities.
pub trait Inventory {
    /// Installed versions, ordered.
    fn list_postgres_versions(&self) -> Result<Vec<String>>;

    /// Clusters of `version`, ordered.
    fn list_clusters(&self, version: &str) -> Result<Vec<String>>;

    /// Directory holding one cluster's configuration.
    fn cluster_dir(&self, version: &str, cluster: &str) -> PathBuf;

    /// Name of the group owning `path`.
    fn group_owning(&self, path: &Path) -> Result<String>;

    /// Primary and supplementary groups of `user`.
    fn groups_of_user(&self, user: &str) -> Result<BTreeSet<String>>;

    /// Path of the authentication file of a cluster.
    fn hba_path(&self, version: &str, cluster: &str) -> PathBuf {
        self.cluster_dir(version, cluster).join(HBA_FILE_NAME)
    }
}

/// Inventory backed by the local filesystem.
pub struct FsInventory {
    root: PathBuf,
    identity: Box<dyn Identity>,
}

impl FsInventory {
    /// Create an inventory over `root` resolving users and groups through
    /// the system.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_identity(root, SystemIdentity)
    }

    /// Create an inventory with an explicit identity source.
    pub fn with_identity(root: impl Into<PathBuf>, identity: impl Identity + 'static) -> Self {
        Self {
            root: root.into(),
            identity: Box::new(identity),
        }
    }

    /// The configuration root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Identity source used for group lookups.
    pub fn identity(&self) -> &dyn Identity {
        self.identity.as_ref()
    }
}

impl Inventory for FsInventory {
    fn list_postgres_versions(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Err(Error::ConfigurationRootMissing(self.root.clone()));
        }
        let mut versions = list_subdirs(&self.root)?;
        sort_versions(&mut versions);
        Ok(versions)
    }

    fn list_clusters(&self, version: &str) -> Result<Vec<String>> {
        let dir = self.root.join(version);
        if !dir.is_dir() {
            return Err(Error::PathNotFound(dir));
        }
        let mut clusters = list_subdirs(&dir)?;
        clusters.sort();
        Ok(clusters)
    }

    fn cluster_dir(&self, version: &str, cluster: &str) -> PathBuf {
        self.root.join(version).join(cluster)
    }

    fn group_owning(&self, path: &Path) -> Result<String> {
        let meta = std::fs::metadata(path).map_err(|e| Error::from_io(e, path))?;
        self.identity.group_name(meta.gid())
    }

    fn groups_of_user(&self, user: &str) -> Result<BTreeSet<String>> {
        self.identity.groups_of_user(user)
    }
}

/// Names of the immediate subdirectories of `dir`.
fn list_subdirs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| Error::from_io(e, dir))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// Numeric version order; names that are not versions go last, by name.
fn sort_versions(versions: &mut [String]) {
    versions.sort_by(|a, b| match (a.parse::<PgVersion>(), b.parse::<PgVersion>()) {
        (Ok(va), Ok(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    });
}
