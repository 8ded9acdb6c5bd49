//! Keeps catalog record paths in step with the filesystem.
//!
//! Two paths with opposite responsibilities:
//! - a directory move renames the directory once and then only rewrites record paths;
//! - a record move physically relocates the primary file and all derived files, then rewrites the
//!   record path.
//!
//! Neither is transactional across both stores. If the catalog update fails after the rename,
//! the error is returned and the catalog stays stale until the next sync.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::catalog::{Catalog, RecordId};
use crate::error::{AppError, Result};
use crate::fs::operations;
use crate::paths;

pub struct Reconciler<'a> {
    root: &'a Path,
    catalog: &'a dyn Catalog,
}

impl<'a> Reconciler<'a> {
    pub fn new(root: &'a Path, catalog: &'a dyn Catalog) -> Self {
        Self { root, catalog }
    }

    /// Rename directory `id` to `new_id` on disk, then rewrite the records below it.
    ///
    /// Returns the number of records rewritten.
    pub fn move_directory(&self, id: &str, new_id: &str) -> Result<usize> {
        let (id, new_id) = (paths::normalize(id), paths::normalize(new_id));
        let from = paths::resolve(self.root, &id)?;
        let to = paths::resolve(self.root, &new_id)?;
        operations::rename(&from, &to)?;
        info!(from = %id, to = %new_id, "directory renamed");

        self.relocate_records(&id, &new_id).inspect_err(|e| {
            warn!(
                from = %id,
                to = %new_id,
                error = %e,
                "directory renamed but catalog update failed; run a sync to repair"
            );
        })
    }

    /// Rewrite the path of every record below `id` so it lives below `new_id` instead.
    ///
    /// Only touches the catalog. Matching is on a separator boundary, so records of a sibling
    /// `id2` are left alone.
    pub fn relocate_records(&self, id: &str, new_id: &str) -> Result<usize> {
        let (id, new_id) = (paths::normalize(id), paths::normalize(new_id));
        let records = self.catalog.records_under(&id)?;
        let mut updated = 0;
        for record in &records {
            let Some(rest) = paths::strip_dir_prefix(&record.primary_path, &id) else {
                continue;
            };
            let new_path = paths::join(&new_id, rest);
            self.catalog.set_primary_path(record.id, &new_path)?;
            debug!(record = record.id, from = %record.primary_path, to = %new_path, "record path rewritten");
            updated += 1;
        }
        Ok(updated)
    }

    /// Move one record's files into directory `to` and update its path.
    ///
    /// Returns the new primary path. Derived files missing on disk are skipped with a warning.
    /// Every destination is checked before anything moves, so a collision leaves all files and
    /// the record where they were.
    pub fn move_record(&self, id: RecordId, to: &str) -> Result<String> {
        let record = self
            .catalog
            .get(id)?
            .ok_or_else(|| AppError::Validation(format!("record {} does not exist", id)))?;

        let to = paths::normalize(to);
        let source_dir = record.directory().to_string();
        let target = paths::join(&to, paths::basename(&record.primary_path));
        if paths::dirname(&target) == source_dir {
            return Ok(record.primary_path);
        }

        let primary = (
            paths::resolve(self.root, &record.primary_path)?,
            paths::resolve(self.root, &target)?,
        );
        let mut derived = Vec::new();
        for file in &record.derived {
            let from = paths::resolve(self.root, &paths::join(&source_dir, &file.file))?;
            if !from.exists() {
                warn!(record = id, file = %file.file, "derived file missing, not moved");
                continue;
            }
            derived.push((from, paths::resolve(self.root, &paths::join(&to, &file.file))?));
        }
        for (_, dest) in std::iter::once(&primary).chain(&derived) {
            if dest.symlink_metadata().is_ok() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("{} already exists", dest.display()),
                )
                .into());
            }
        }

        operations::rename(&primary.0, &primary.1)?;
        self.catalog.set_primary_path(id, &target)?;
        for (from, dest) in &derived {
            operations::rename(from, dest)?;
        }
        info!(record = id, from = %record.primary_path, to = %target, "record moved");
        Ok(target)
    }
}
