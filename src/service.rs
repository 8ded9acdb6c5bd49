//! Directory service: request handlers for create, move/rename, delete, move-records and sync.
//!
//! Every handler runs to completion on its own; nothing is held across requests. Required
//! fields are checked before the filesystem or the catalog is touched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::catalog::{Catalog, CatalogRecord, RecordId};
use crate::error::{AppError, Result};
use crate::fs::operations;
use crate::fs::tree::{self, DirectorySnapshot};
use crate::paths;
use crate::reconcile::Reconciler;
use crate::scan::variants::VariantGenerator;
use crate::scan::{ContentScanner, ScanReport};

/// A directory request, discriminated by `action`.
///
/// Fields are optional on the wire so a missing field surfaces as a validation error instead of
/// a decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DirectoryRequest {
    Mkdir {
        parent: Option<String>,
        name: Option<String>,
    },
    Rename {
        id: Option<String>,
        name: Option<String>,
    },
    Move {
        id: Option<String>,
        parent: Option<String>,
    },
    Delete {
        id: Option<String>,
    },
    MoveRecords {
        #[serde(default)]
        ids: Vec<RecordId>,
        parent: Option<String>,
    },
    Sync {
        id: Option<String>,
    },
}

impl DirectoryRequest {
    pub fn action(&self) -> &'static str {
        match self {
            DirectoryRequest::Mkdir { .. } => "mkdir",
            DirectoryRequest::Rename { .. } => "rename",
            DirectoryRequest::Move { .. } => "move",
            DirectoryRequest::Delete { .. } => "delete",
            DirectoryRequest::MoveRecords { .. } => "move_records",
            DirectoryRequest::Sync { .. } => "sync",
        }
    }
}

/// Response envelope: `{success, data?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl DirectoryResponse {
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
        }
    }

    pub fn failure(err: &AppError) -> Self {
        Self {
            success: false,
            data: Some(json!({ "kind": err.kind(), "message": err.to_string() })),
        }
    }

    /// Human-readable failure detail, if any.
    pub fn error_message(&self) -> Option<String> {
        let data = self.data.as_ref()?;
        match data.get("message").and_then(Value::as_str) {
            Some(message) => Some(message.to_string()),
            None => Some(data.to_string()),
        }
    }
}

/// A required directory id in normalized form (`/a/` becomes `a`).
fn required_id(value: Option<&str>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(paths::normalize(v)),
        _ => Err(AppError::Validation(format!("{} is required", field))),
    }
}

fn not_root(id: String) -> Result<String> {
    if id == paths::ROOT_ID {
        return Err(AppError::Validation(
            "the root directory cannot be changed".into(),
        ));
    }
    Ok(id)
}

/// A directory name must be a single path component.
fn directory_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name is required".into()));
    }
    if name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(AppError::Validation(format!("invalid directory name: {}", name)));
    }
    Ok(name)
}

/// Server side of the directory tree.
pub struct DirectoryService {
    root: PathBuf,
    base_url: String,
    catalog: Arc<dyn Catalog>,
    variants: Arc<dyn VariantGenerator>,
    variant_mode: Option<u32>,
}

impl DirectoryService {
    pub fn new(
        root: impl Into<PathBuf>,
        base_url: impl Into<String>,
        catalog: Arc<dyn Catalog>,
        variants: Arc<dyn VariantGenerator>,
    ) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
            catalog,
            variants,
            variant_mode: None,
        }
    }

    /// Permission bits applied to variant files generated during sync.
    pub fn with_variant_mode(mut self, mode: Option<u32>) -> Self {
        self.variant_mode = mode;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(&self.root, self.catalog.as_ref())
    }

    /// Full recursive listing of the directory tree.
    pub fn snapshot(&self) -> Result<Vec<DirectorySnapshot>> {
        tree::list_directories(&self.root, paths::ROOT_ID, true)
    }

    /// Records directly inside `dir`.
    pub fn records_in(&self, dir: &str) -> Result<Vec<CatalogRecord>> {
        self.catalog.records_in(dir)
    }

    /// Create directory `name` below `parent` (default: the root). Returns the new id.
    pub fn mkdir(&self, parent: Option<&str>, name: Option<&str>) -> Result<String> {
        let name = directory_name(name.unwrap_or_default())?;
        let parent = paths::normalize(parent.unwrap_or(paths::ROOT_ID));
        let new_id = paths::join(&parent, name);
        operations::create_dir(&paths::resolve(&self.root, &new_id)?)?;
        info!(id = %new_id, "directory created");
        Ok(new_id)
    }

    /// Rename directory `id` within its parent. Returns the new id.
    pub fn rename(&self, id: Option<&str>, name: Option<&str>) -> Result<String> {
        let id = not_root(required_id(id, "id")?)?;
        let name = directory_name(name.unwrap_or_default())?;
        let new_id = paths::join(paths::dirname(&id), paths::basename(name));
        self.relocate(&id, &new_id)
    }

    /// Move directory `id` below `parent`, keeping its name. Returns the new id.
    pub fn move_directory(&self, id: Option<&str>, parent: Option<&str>) -> Result<String> {
        let id = not_root(required_id(id, "id")?)?;
        let parent = required_id(parent, "parent")?;
        if paths::is_within(&parent, &id) {
            return Err(AppError::Validation(format!(
                "cannot move {} into {}",
                id, parent
            )));
        }
        let new_id = paths::join(&parent, paths::basename(&id));
        self.relocate(&id, &new_id)
    }

    fn relocate(&self, id: &str, new_id: &str) -> Result<String> {
        if id == new_id {
            return Ok(new_id.to_string());
        }
        self.reconciler().move_directory(id, new_id)?;
        Ok(new_id.to_string())
    }

    /// Delete directory `id` and its contents, refused while any record lives below it.
    pub fn delete(&self, id: Option<&str>) -> Result<()> {
        let id = not_root(required_id(id, "id")?)?;
        let path = paths::resolve(&self.root, &id)?;
        if std::fs::symlink_metadata(&path).is_ok_and(|meta| !meta.is_dir()) {
            return Err(AppError::Validation(format!("{} is not a directory", id)));
        }
        let tracked = self.catalog.count_under(&id)?;
        if tracked > 0 {
            return Err(AppError::Refused(format!(
                "{} still contains {} tracked record(s)",
                id, tracked
            )));
        }
        operations::remove_tree(&path)?;
        info!(id = %id, "directory deleted");
        Ok(())
    }

    /// Move records (and their files) into directory `parent`.
    pub fn move_records(&self, ids: &[RecordId], parent: Option<&str>) -> Result<()> {
        if ids.is_empty() {
            return Err(AppError::Validation("ids are required".into()));
        }
        let parent = required_id(parent, "parent")?;
        let reconciler = self.reconciler();
        for id in ids {
            reconciler.move_record(*id, &parent)?;
        }
        Ok(())
    }

    /// Register every untracked file below `id` (default: the root).
    pub fn sync(&self, id: Option<&str>) -> Result<ScanReport> {
        let id = paths::normalize(id.unwrap_or(paths::ROOT_ID));
        ContentScanner::new(
            &self.root,
            &self.base_url,
            self.catalog.as_ref(),
            self.variants.as_ref(),
        )
        .with_variant_mode(self.variant_mode)
        .scan(&id)
    }

    /// Dispatch a wire request and wrap the outcome in the response envelope.
    pub fn handle(&self, request: DirectoryRequest) -> DirectoryResponse {
        let action = request.action();
        let result = match request {
            DirectoryRequest::Mkdir { parent, name } => self
                .mkdir(parent.as_deref(), name.as_deref())
                .map(|id| Some(Value::String(id))),
            DirectoryRequest::Rename { id, name } => self
                .rename(id.as_deref(), name.as_deref())
                .map(|id| Some(Value::String(id))),
            DirectoryRequest::Move { id, parent } => self
                .move_directory(id.as_deref(), parent.as_deref())
                .map(|id| Some(Value::String(id))),
            DirectoryRequest::Delete { id } => self.delete(id.as_deref()).map(|_| None),
            DirectoryRequest::MoveRecords { ids, parent } => {
                self.move_records(&ids, parent.as_deref()).map(|_| None)
            }
            DirectoryRequest::Sync { id } => self
                .sync(id.as_deref())
                .map(|report| Some(json!({ "registered": report.registered }))),
        };

        match result {
            Ok(data) => DirectoryResponse::ok(data),
            Err(e) => {
                error!(action, error = %e, "directory request failed");
                DirectoryResponse::failure(&e)
            }
        }
    }
}
