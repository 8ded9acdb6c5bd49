//! Catalog of media records and the directory filter the host listing consumes.
//!
//! The catalog is the second store next to the filesystem: every record points at a primary
//! file by a path relative to the content root, plus derived (resized) files living in the same
//! directory.

pub mod sqlite;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::paths;

pub use sqlite::SqliteCatalog;

/// Catalog record identifier.
pub type RecordId = i64;

/// A derived file (e.g. a resized image) stored next to the primary file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedFile {
    /// Size name, e.g. `thumbnail`.
    pub suffix: String,
    /// File name relative to the record's directory.
    pub file: String,
    pub width: u32,
    pub height: u32,
}

/// One logical media file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: RecordId,
    /// Canonical URL the record was registered under. Never rewritten.
    pub guid: String,
    pub title: String,
    pub mime_type: Option<String>,
    /// Primary file path relative to the content root, e.g. `photos/2024/cat.jpg`.
    pub primary_path: String,
    pub derived: Vec<DerivedFile>,
}

impl CatalogRecord {
    /// Directory identifier the record lives in.
    pub fn directory(&self) -> &str {
        paths::dirname(&self.primary_path)
    }
}

/// Fields needed to register a new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub guid: String,
    pub title: String,
    pub mime_type: Option<String>,
    pub primary_path: String,
}

/// Filter clause selecting records directly inside one directory.
///
/// Given `D`, a record matches when its path starts with `D/` and the remainder has no further
/// separator. The root `/` selects records at the top level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryFilter {
    prefix: String,
}

impl DirectoryFilter {
    /// `dir` is normalized first, so `/a`, `a/` and `a` select the same records.
    pub fn new(dir: &str) -> Self {
        let dir = paths::normalize(dir);
        let prefix = if dir == paths::ROOT_ID {
            String::new()
        } else {
            format!("{}/", dir)
        };
        Self { prefix }
    }

    /// Path prefix including the trailing separator (empty for the root).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// Storage interface for catalog records.
///
/// Implementations must be shareable across request handlers.
pub trait Catalog: Send + Sync {
    /// Fetch a record by id.
    fn get(&self, id: RecordId) -> Result<Option<CatalogRecord>>;

    /// Every record whose primary path lies anywhere below `dir`.
    fn records_under(&self, dir: &str) -> Result<Vec<CatalogRecord>>;

    /// Records directly inside `dir` (see [`DirectoryFilter`]).
    fn records_in(&self, dir: &str) -> Result<Vec<CatalogRecord>>;

    /// Number of records anywhere below `dir`.
    fn count_under(&self, dir: &str) -> Result<usize> {
        Ok(self.records_under(dir)?.len())
    }

    /// Register a record, returning its id.
    fn insert(&self, record: NewRecord) -> Result<RecordId>;

    /// Rewrite a record's primary path.
    fn set_primary_path(&self, id: RecordId, primary_path: &str) -> Result<()>;

    /// Replace a record's derived file list.
    fn set_derived(&self, id: RecordId, derived: &[DerivedFile]) -> Result<()>;

    /// Whether some record references the file directly, by canonical URL or by primary path.
    fn references_file(&self, guid: &str, primary_path: &str) -> Result<bool>;

    /// Whether some record in `dir` lists `filename` among its derived files.
    fn references_derived(&self, dir: &str, filename: &str) -> Result<bool>;
}
