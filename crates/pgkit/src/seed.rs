//! Discovery and rendering of seed SQL files.
//!
//! Seed trees encode load order in their depth: leaf directories hold data
//! with no dependencies, parents hold data that references it. Directories are
//! therefore visited bottom-up (children before their parent, the root last).
//! Files inside one directory are taken in file-name order.

use crate::error::{Error, Result};
use crate::template::{self, TemplateVariables};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extension of files that are applied.
pub const SEED_EXTENSION: &str = "sql";

/// Seed files under `root` in application order.
///
/// A missing root yields an empty list.
pub fn discover(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for dir in directories_bottom_up(root)? {
        let mut in_dir: Vec<PathBuf> = std::fs::read_dir(&dir)
            .map_err(|e| Error::from_io(e, &dir))?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_seed_file(path))
            .collect();
        in_dir.sort();
        files.extend(in_dir);
    }

    Ok(files)
}

/// Every directory under `root` (inclusive) in post-order.
fn directories_bottom_up(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(root)
        .contents_first(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| match e.into_io_error() {
            Some(io) => Error::from_io(io, root),
            None => Error::Io(std::io::Error::other("filesystem loop in seed directory")),
        })?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        }
    }
    Ok(dirs)
}

/// Whether `path` ends in `.sql`.
pub fn is_seed_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == SEED_EXTENSION)
}

/// Read `path` and substitute its placeholders.
pub fn render_file(path: &Path, vars: &TemplateVariables) -> Result<String> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::from_io(e, path))?;
    template::render(&content, vars)
}
