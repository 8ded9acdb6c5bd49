use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::paths;

/// Raw directory descriptor exchanged between server and tree client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DirectorySnapshot>,
}

impl DirectorySnapshot {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<DirectorySnapshot>) -> Self {
        self.children = children;
        self
    }
}

/// Whether a directory entry name is hidden from listings and scans.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// List the directories below `dirname` (relative to `root`).
///
/// Hidden entries and plain files are skipped; entries that can't be read are silently
/// dropped. With `recurse`, every level is listed. Order is by name; clients re-sort with
/// their own comparator.
pub fn list_directories(root: &Path, dirname: &str, recurse: bool) -> Result<Vec<DirectorySnapshot>> {
    let dir = paths::resolve(root, dirname)?;
    let mut result = Vec::new();

    for entry in fs::read_dir(&dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let name = entry.file_name().to_string_lossy().to_string();
        if is_hidden(&name) || !entry.path().is_dir() {
            continue;
        }

        let mut directory = DirectorySnapshot::new(paths::join(dirname, &name), name);
        if recurse {
            directory.children = list_directories(root, &directory.id, true)?;
        }
        result.push(directory);
    }

    result.sort_by(|a, b| a.text.cmp(&b.text));
    Ok(result)
}
