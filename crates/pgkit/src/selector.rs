//! Resolution of the PostgreSQL version and cluster to work on.
//!
//! The operator is only asked when there is a real choice to make:
//! a single candidate is taken as is, several candidates produce a numbered
//! menu that keeps asking until a valid entry is picked.

use crate::error::{Error, Result};
use crate::inventory::Inventory;
use crate::version::{PgVersion, filter_compatible};
use serde::Serialize;
use std::path::PathBuf;

/// Source of menu answers.
///
/// Implemented by the terminal front-end; tests script it.
pub trait MenuInput {
    /// Show the numbered options (1-based).
    fn show(&mut self, title: &str, options: &[String]);

    /// Read one raw answer.
    fn read_choice(&mut self) -> std::io::Result<String>;

    /// Tell the operator why an answer was rejected.
    fn reject(&mut self, error: &Error);
}

/// Fully resolved target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    /// Version directory name
    pub version: String,
    /// Cluster directory name
    pub cluster: String,
    /// Cluster configuration directory
    pub cluster_dir: PathBuf,
    /// `pg_hba.conf` of the cluster
    pub hba_path: PathBuf,
}

/// How a single value was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    /// Only one candidate existed
    Automatic,
    /// Picked from a menu
    Prompted,
}

/// Version/cluster selector.
pub struct Selector {
    minimum: PgVersion,
}

impl Selector {
    /// Create a selector enforcing `minimum` when several versions exist.
    pub fn new(minimum: PgVersion) -> Self {
        Self { minimum }
    }

    /// Minimum version enforced.
    pub fn minimum(&self) -> PgVersion {
        self.minimum
    }

    /// Resolve version, cluster and authentication file path.
    pub fn select(&self, inventory: &dyn Inventory, menu: &mut dyn MenuInput) -> Result<Selection> {
        let versions = inventory.list_postgres_versions()?;
        let (version, _) = self.select_version(&versions, menu)?;

        let clusters = inventory.list_clusters(&version)?;
        let (cluster, _) = select_cluster(&version, &clusters, menu)?;

        Ok(Selection {
            cluster_dir: inventory.cluster_dir(&version, &cluster),
            hba_path: inventory.hba_path(&version, &cluster),
            version,
            cluster,
        })
    }

    /// Pick a version from the discovered list.
    pub fn select_version(
        &self,
        versions: &[String],
        menu: &mut dyn MenuInput,
    ) -> Result<(String, Choice)> {
        if let [only] = versions {
            return Ok((only.clone(), Choice::Automatic));
        }

        let compatible = filter_compatible(versions, self.minimum);
        match compatible.as_slice() {
            [] => Err(Error::NoCompatiblePostgresVersion {
                minimum: self.minimum.to_string(),
                found: versions.to_vec(),
            }),
            [only] => Ok((only.clone(), Choice::Automatic)),
            _ => {
                let idx = choose("Which PostgreSQL version should be used?", &compatible, menu)?;
                Ok((compatible[idx].clone(), Choice::Prompted))
            }
        }
    }
}

/// Pick a cluster of `version`.
pub fn select_cluster(
    version: &str,
    clusters: &[String],
    menu: &mut dyn MenuInput,
) -> Result<(String, Choice)> {
    match clusters {
        [] => Err(Error::NoClusterFound {
            version: version.to_string(),
        }),
        [only] => Ok((only.clone(), Choice::Automatic)),
        _ => {
            let title = format!("Which cluster of PostgreSQL {version} should be used?");
            let idx = choose(&title, clusters, menu)?;
            Ok((clusters[idx].clone(), Choice::Prompted))
        }
    }
}

/// Show `options` and loop until a valid 1-based entry is read.
///
/// Returns the 0-based index. Only a failure to read input ends the loop.
pub fn choose(title: &str, options: &[String], menu: &mut dyn MenuInput) -> Result<usize> {
    menu.show(title, options);
    loop {
        let answer = menu.read_choice()?;
        match parse_choice(&answer, options.len()) {
            Ok(idx) => return Ok(idx),
            Err(e) => menu.reject(&e),
        }
    }
}

/// Parse a 1-based menu answer into a 0-based index.
pub fn parse_choice(answer: &str, max: usize) -> Result<usize> {
    let invalid = || Error::InvalidMenuSelection {
        input: answer.trim().to_string(),
        max,
    };
    let n: usize = answer.trim().parse().map_err(|_| invalid())?;
    if n == 0 || n > max {
        return Err(invalid());
    }
    Ok(n - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashMap, VecDeque};
    use std::path::Path;

    /// Menu fed from a fixed list of answers.
    struct ScriptedMenu {
        answers: VecDeque<String>,
        shown: Vec<(String, Vec<String>)>,
        rejected: usize,
    }

    impl ScriptedMenu {
        fn new(answers: &[&str]) -> Self {
            Self {
                answers: answers.iter().map(ToString::to_string).collect(),
                shown: Vec::new(),
                rejected: 0,
            }
        }
    }

    impl MenuInput for ScriptedMenu {
        fn show(&mut self, title: &str, options: &[String]) {
            self.shown.push((title.to_string(), options.to_vec()));
        }

        fn read_choice(&mut self) -> std::io::Result<String> {
            self.answers
                .pop_front()
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))
        }

        fn reject(&mut self, error: &Error) {
            assert!(error.category().is_recoverable());
            self.rejected += 1;
        }
    }

    struct FakeInventory {
        versions: Vec<String>,
        clusters: HashMap<String, Vec<String>>,
    }

    impl FakeInventory {
        /// `layout` pairs a version with its comma-separated clusters.
        fn new(layout: &[(&str, &str)]) -> Self {
            Self {
                versions: layout.iter().map(|(v, _)| (*v).to_string()).collect(),
                clusters: layout
                    .iter()
                    .map(|(v, c)| {
                        let clusters = c
                            .split(',')
                            .filter(|s| !s.is_empty())
                            .map(ToString::to_string)
                            .collect();
                        ((*v).to_string(), clusters)
                    })
                    .collect(),
            }
        }
    }

    impl Inventory for FakeInventory {
        fn list_postgres_versions(&self) -> Result<Vec<String>> {
            Ok(self.versions.clone())
        }

        fn list_clusters(&self, version: &str) -> Result<Vec<String>> {
            Ok(self.clusters.get(version).cloned().unwrap_or_default())
        }

        fn cluster_dir(&self, version: &str, cluster: &str) -> PathBuf {
            Path::new("/etc/postgresql").join(version).join(cluster)
        }

        fn group_owning(&self, _path: &Path) -> Result<String> {
            Ok("postgres".to_string())
        }

        fn groups_of_user(&self, _user: &str) -> Result<BTreeSet<String>> {
            Ok(BTreeSet::new())
        }
    }

    fn selector() -> Selector {
        Selector::new(PgVersion::new(9, 4))
    }

    #[test]
    fn test_single_version_single_cluster_never_prompts() {
        let inv = FakeInventory::new(&[("9.4", "main")]);
        let mut menu = ScriptedMenu::new(&[]);
        let sel = selector().select(&inv, &mut menu).unwrap();
        assert_eq!(sel.version, "9.4");
        assert_eq!(sel.cluster, "main");
        assert_eq!(sel.hba_path, PathBuf::from("/etc/postgresql/9.4/main/pg_hba.conf"));
        assert!(menu.shown.is_empty());
    }

    #[test]
    fn test_single_version_below_minimum_still_selected() {
        let inv = FakeInventory::new(&[("9.1", "main")]);
        let mut menu = ScriptedMenu::new(&[]);
        let sel = selector().select(&inv, &mut menu).unwrap();
        assert_eq!(sel.version, "9.1");
    }

    #[test]
    fn test_no_versions_is_incompatible() {
        let inv = FakeInventory::new(&[]);
        let mut menu = ScriptedMenu::new(&[]);
        let err = selector().select(&inv, &mut menu).unwrap_err();
        assert!(matches!(err, Error::NoCompatiblePostgresVersion { .. }));
    }

    #[test]
    fn test_multiple_versions_none_compatible() {
        let inv = FakeInventory::new(&[("9.1", "main"), ("9.3", "main")]);
        let mut menu = ScriptedMenu::new(&[]);
        let err = selector().select(&inv, &mut menu).unwrap_err();
        match err {
            Error::NoCompatiblePostgresVersion { minimum, found } => {
                assert_eq!(minimum, "9.4");
                assert_eq!(found, vec!["9.1", "9.3"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_multiple_versions_one_compatible_is_automatic() {
        let versions = vec!["9.1".to_string(), "9.6".to_string()];
        let mut menu = ScriptedMenu::new(&[]);
        let (version, how) = selector().select_version(&versions, &mut menu).unwrap();
        assert_eq!(version, "9.6");
        assert_eq!(how, Choice::Automatic);
    }

    #[test]
    fn test_operator_picks_second_compatible_version() {
        let inv = FakeInventory::new(&[
            ("9.3", "main"),
            ("9.4", "main"),
            ("9.5", "main"),
        ]);
        let mut menu = ScriptedMenu::new(&["2"]);
        let sel = selector().select(&inv, &mut menu).unwrap();
        assert_eq!(sel.version, "9.5");
        assert_eq!(menu.shown.len(), 1);
        assert_eq!(menu.shown[0].1, vec!["9.4", "9.5"]);
    }

    #[test]
    fn test_invalid_answers_are_reprompted() {
        let versions = vec!["9.4".to_string(), "9.5".to_string(), "10".to_string()];
        let mut menu = ScriptedMenu::new(&["abc", "0", "4", "", " 3 "]);
        let (version, how) = selector().select_version(&versions, &mut menu).unwrap();
        assert_eq!(version, "10");
        assert_eq!(how, Choice::Prompted);
        assert_eq!(menu.rejected, 4);
    }

    #[test]
    fn test_input_exhausted_is_an_error() {
        let versions = vec!["9.4".to_string(), "9.5".to_string()];
        let mut menu = ScriptedMenu::new(&["x"]);
        let err = selector().select_version(&versions, &mut menu).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_version_without_clusters() {
        let inv = FakeInventory::new(&[("14", "")]);
        let mut menu = ScriptedMenu::new(&[]);
        let err = selector().select(&inv, &mut menu).unwrap_err();
        assert!(matches!(err, Error::NoClusterFound { version } if version == "14"));
    }

    #[test]
    fn test_multiple_clusters_prompt() {
        let inv = FakeInventory::new(&[("14", "main,test")]);
        let mut menu = ScriptedMenu::new(&["9", "2"]);
        let sel = selector().select(&inv, &mut menu).unwrap();
        assert_eq!(sel.cluster, "test");
        assert_eq!(sel.cluster_dir, PathBuf::from("/etc/postgresql/14/test"));
        assert_eq!(menu.rejected, 1);
    }

    #[test]
    fn test_parse_choice_bounds() {
        assert_eq!(parse_choice("1", 3).unwrap(), 0);
        assert_eq!(parse_choice("3", 3).unwrap(), 2);
        assert!(parse_choice("0", 3).is_err());
        assert!(parse_choice("4", 3).is_err());
        assert!(parse_choice("-1", 3).is_err());
        assert!(parse_choice("two", 3).is_err());
    }
}
