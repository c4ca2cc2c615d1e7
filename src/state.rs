use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Section holding the answers remembered between runs
pub const DEFAULT_SECTION: &str = "default";

/// Last repository path typed by the operator
pub const REPOSITORY_PATH_KEY: &str = "repository_path";

type Sections = BTreeMap<String, BTreeMap<String, String>>;

// ============================================================================
// Run-control file
// ============================================================================

/// Answers remembered between runs (`prepdevrc`, TOML)
///
/// ```toml
/// [default]
/// repository_path = "/home/dev/repository"
/// ```
///
/// Unknown sections and keys survive a read-modify-write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunControl {
    path: PathBuf,
    sections: Sections,
}

impl RunControl {
    /// Load from `path`; a missing file is empty
    pub fn load(path: &Path) -> Result<Self> {
        let sections = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Could not read {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Invalid run-control file: {}", path.display()))?
        } else {
            Sections::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            sections,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value of `key` in `[default]`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.sections
            .get(DEFAULT_SECTION)
            .and_then(|section| section.get(key))
            .map(String::as_str)
    }

    /// Set `key` in `[default]`
    pub fn set(&mut self, key: &str, value: &str) {
        self.sections
            .entry(DEFAULT_SECTION.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub fn repository_path(&self) -> Option<&str> {
        self.get(REPOSITORY_PATH_KEY)
    }

    pub fn set_repository_path(&mut self, path: &Path) {
        self.set(REPOSITORY_PATH_KEY, &path.to_string_lossy());
    }

    /// Write back to disk
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
        let content =
            toml::to_string_pretty(&self.sections).context("Failed to serialize run-control")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Could not write {}", self.path.display()))?;
        log::debug!("Saved run-control to {}", self.path.display());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
