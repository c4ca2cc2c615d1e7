//! # pgkit
//!
//! Local PostgreSQL environment discovery and validation for developer
//! machines.
//!
//! This crate provides functionality for:
//! - Listing installed PostgreSQL versions and clusters (Debian layout)
//! - Choosing a version/cluster, asking only when there is a real choice
//! - Checking `pg_hba.conf` for the access rules a provisioning run needs
//! - Looking up group ownership and user group memberships through NSS
//! - Discovering seed SQL files and rendering their `{placeholders}`
//!
//! ## Example
//!
//! ```no_run
//! use pgkit::{FsInventory, Inventory, PgVersion, hba};
//!
//! let inventory = FsInventory::new("/etc/postgresql");
//! for version in inventory.list_postgres_versions().expect("versions") {
//!     for cluster in inventory.list_clusters(&version).expect("clusters") {
//!         let path = inventory.hba_path(&version, &cluster);
//!         let policy = hba::validate_file(&path, hba::PolicyTarget::new("sigma_db_dev")).expect("readable");
//!         println!("{version}/{cluster}: compliant = {}", policy.is_compliant());
//!     }
//! }
//! # let _ = PgVersion::new(9, 4);
//! ```
//!
//! Interactive choices go through the [`MenuInput`] trait and machine state
//! through the [`Inventory`] trait, so callers can substitute both in tests.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod hba;
pub mod identity;
pub mod inventory;
pub mod nss;
pub mod seed;
pub mod selector;
pub mod template;
pub mod version;

pub use error::{Error, ErrorCategory, Result};
pub use hba::{HbaPolicyResult, HbaRule};
pub use identity::{Identity, IdentityDb};
pub use inventory::{FsInventory, Inventory};
pub use nss::SystemIdentity;
pub use selector::{Choice, MenuInput, Selection, Selector};
pub use template::TemplateVariables;
pub use version::PgVersion;
