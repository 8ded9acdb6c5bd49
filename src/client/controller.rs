//! The observable directory tree: static entries, selection, editing, drag and drop, and the
//! remote calls behind them.
//!
//! Structural changes (move, rename, delete) are applied to the model only after the remote
//! confirms them, so a failed request leaves the tree as it was.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::RecordId;
use crate::client::node::{DirectoryNode, FlatItem, NodeFeatures, NodeKey};
use crate::client::remote::{into_directory_id, into_payload, DirectoryRemote};
use crate::client::session::{
    validate_move, ClickEvent, ClickTracker, DragPayload, DragSession, EditSession, MoveRejection,
};
use crate::error::{AppError, Result};
use crate::event::{EventBus, TreeEvent};
use crate::fs::tree::DirectorySnapshot;
use crate::paths;
use crate::service::DirectoryRequest;

pub const ALL_MEDIA_LABEL: &str = "All media";
pub const ROOT_LABEL: &str = "Uncategorized";
pub const NEW_FOLDER_LABEL: &str = "New folder";

/// Clears the in-flight flag when a sync settles, whatever the outcome.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct DirectoryTree {
    remote: Arc<dyn DirectoryRemote>,
    /// Virtual "everything" entry; never sent to the server as a directory.
    all: DirectoryNode,
    /// The real tree root `/`; its children are the user tree.
    root: DirectoryNode,
    selected: NodeKey,
    edit: Option<EditSession>,
    drag: Option<DragSession>,
    clicks: ClickTracker,
    events: EventBus,
    syncing: AtomicBool,
    filter: String,
}

impl DirectoryTree {
    pub fn new(remote: Arc<dyn DirectoryRemote>) -> Self {
        let mut all = DirectoryNode::new(
            None,
            ALL_MEDIA_LABEL,
            NodeFeatures::STATIC.with_droppable(false),
        );
        let mut root = DirectoryNode::new(
            Some(paths::ROOT_ID.to_string()),
            ROOT_LABEL,
            NodeFeatures::STATIC,
        );
        root.set_open(true);
        all.set_selected(true);

        Self {
            remote,
            selected: all.key(),
            all,
            root,
            edit: None,
            drag: None,
            clicks: ClickTracker::default(),
            events: EventBus::new(),
            syncing: AtomicBool::new(false),
            filter: String::new(),
        }
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&mut self) -> tokio::sync::mpsc::UnboundedReceiver<TreeEvent> {
        self.events.subscribe()
    }

    /// Replace the user tree with the server's listing.
    pub async fn load(&mut self) -> Result<()> {
        let snapshot = self.remote.snapshot().await?;
        self.set_children(&snapshot);
        Ok(())
    }

    pub fn set_children(&mut self, children: &[DirectorySnapshot]) {
        self.root.set_children(children);
        self.edit = None;
        self.drag = None;
        if self.node(self.selected).is_none() {
            self.selected = self.all.key();
            self.all.set_selected(true);
        }
        if !self.filter.is_empty() {
            let filter = self.filter.clone();
            self.root.filter(&filter);
        }
        debug!(count = children.len(), "tree children replaced");
    }

    // ── Lookup ───────────────────────────────────────────────────────────────

    pub fn node(&self, key: NodeKey) -> Option<&DirectoryNode> {
        if key == self.all.key() {
            return Some(&self.all);
        }
        self.root.find(key)
    }

    fn node_mut(&mut self, key: NodeKey) -> Option<&mut DirectoryNode> {
        if key == self.all.key() {
            return Some(&mut self.all);
        }
        self.root.find_mut(key)
    }

    /// Key of the node with directory id `id`.
    pub fn find_by_id(&self, id: &str) -> Option<NodeKey> {
        self.root.find_by_id(id).map(DirectoryNode::key)
    }

    pub fn all_key(&self) -> NodeKey {
        self.all.key()
    }

    pub fn root_key(&self) -> NodeKey {
        self.root.key()
    }

    pub fn root(&self) -> &DirectoryNode {
        &self.root
    }

    fn is_static(&self, key: NodeKey) -> bool {
        key == self.all.key() || key == self.root.key()
    }

    fn sort_parent_of(&mut self, key: NodeKey) {
        let Some(parent) = self.root.find_parent_of(key).map(DirectoryNode::key) else {
            return;
        };
        if let Some(parent) = self.root.find_mut(parent) {
            parent.sort_children();
        }
    }

    /// Rows to render: the static entries followed by the visible user tree.
    pub fn rows(&self) -> Vec<FlatItem> {
        let mut items = Vec::new();
        self.all.flatten(0, &mut items);
        self.root.flatten(0, &mut items);
        items
    }

    // ── Selection ────────────────────────────────────────────────────────────

    pub fn selected_key(&self) -> NodeKey {
        self.selected
    }

    /// Directory id of the selection; `None` while "All media" is selected.
    pub fn selected_id(&self) -> Option<String> {
        self.node(self.selected)
            .and_then(|n| n.id())
            .map(str::to_string)
    }

    /// Rename and delete apply only to user directories.
    pub fn can_modify_selection(&self) -> bool {
        !self.is_static(self.selected)
    }

    /// Select `key`, emitting [`TreeEvent::Selected`] when the selection changes.
    pub fn select(&mut self, key: NodeKey) -> bool {
        match self.node(key) {
            Some(node) if node.features().selectable => {}
            _ => return false,
        }
        if key == self.selected {
            return false;
        }
        if let Some(previous) = self.node_mut(self.selected) {
            previous.set_selected(false);
        }
        self.selected = key;
        if let Some(node) = self.node_mut(key) {
            node.set_selected(true);
        }
        let id = self.selected_id();
        debug!(id = ?id, "selection changed");
        self.events.emit(TreeEvent::Selected { id });
        true
    }

    /// Icon click: flip the open state of an openable node.
    pub fn toggle_open(&mut self, key: NodeKey) {
        if let Some(node) = self.node_mut(key) {
            if node.features().openable {
                let open = !node.is_open();
                node.set_open(open);
            }
        }
    }

    /// Label click: select, and enter edit mode on a double click.
    pub fn click_label(&mut self, key: NodeKey, click: ClickEvent) {
        let Some(features) = self.node(key).map(DirectoryNode::features) else {
            return;
        };
        if features.selectable {
            self.select(key);
        }
        if features.renameable && self.clicks.register(click) {
            self.begin_edit(key);
        }
    }

    pub fn filter(&mut self, text: &str) {
        self.filter = text.trim().to_string();
        let filter = self.filter.clone();
        self.root.filter(&filter);
    }

    // ── Editing ──────────────────────────────────────────────────────────────

    pub fn editing(&self) -> Option<&EditSession> {
        self.edit.as_ref()
    }

    pub fn edit_mut(&mut self) -> Option<&mut EditSession> {
        self.edit.as_mut()
    }

    /// Put `key` into edit mode. A different node still being edited is canceled first.
    pub fn begin_edit(&mut self, key: NodeKey) -> bool {
        if self.edit.as_ref().is_some_and(|e| e.key == key) {
            return true;
        }
        let Some(node) = self.root.find(key) else {
            return false;
        };
        if !node.features().renameable {
            return false;
        }
        let session = EditSession::new(key, node.name(), node.id().is_none());
        self.cancel_edit();
        self.edit = Some(session);
        true
    }

    /// Edit the selected directory's name.
    pub fn rename_selected(&mut self) -> bool {
        self.can_modify_selection() && self.begin_edit(self.selected)
    }

    /// Leave edit mode without sending anything. An unconfirmed new directory disappears.
    pub fn cancel_edit(&mut self) {
        let Some(edit) = self.edit.take() else {
            return;
        };
        if edit.is_new {
            self.remove_node(edit.key);
        }
    }

    fn remove_node(&mut self, key: NodeKey) -> Option<DirectoryNode> {
        let parent = self.root.find_parent_of(key)?.key();
        self.root.find_mut(parent)?.remove_child(key)
    }

    /// Confirm the edit: create the directory for a new node, rename an existing one.
    ///
    /// Returns the directory id assigned by the server, or `None` when nothing was sent.
    pub async fn commit_edit(&mut self) -> Result<Option<String>> {
        let Some(edit) = self.edit.take() else {
            return Ok(None);
        };
        let name = edit.value().to_string();

        if edit.is_new {
            let parent = self
                .root
                .find_parent_of(edit.key)
                .and_then(|p| p.id())
                .map(str::to_string);
            let result = self
                .remote
                .call(DirectoryRequest::Mkdir {
                    parent,
                    name: Some(name.clone()),
                })
                .await
                .and_then(into_directory_id);
            return match result {
                Ok(id) => {
                    if let Some(node) = self.root.find_mut(edit.key) {
                        node.set_name(name);
                        node.set_id(Some(id.clone()));
                    }
                    self.sort_parent_of(edit.key);
                    info!(id = %id, "directory created");
                    Ok(Some(id))
                }
                Err(e) => {
                    self.remove_node(edit.key);
                    warn!(error = %e, "directory creation failed");
                    Err(e)
                }
            };
        }

        if name == edit.original {
            return Ok(None);
        }
        let Some(id) = self
            .root
            .find(edit.key)
            .and_then(|n| n.id())
            .map(str::to_string)
        else {
            return Ok(None);
        };
        let new_id = into_directory_id(
            self.remote
                .call(DirectoryRequest::Rename {
                    id: Some(id.clone()),
                    name: Some(name.clone()),
                })
                .await?,
        )?;
        if let Some(node) = self.root.find_mut(edit.key) {
            node.set_name(name);
            node.set_id(Some(new_id.clone()));
        }
        self.sort_parent_of(edit.key);
        info!(from = %id, to = %new_id, "directory renamed");
        Ok(Some(new_id))
    }

    /// Add a "New folder" placeholder below `parent` in edit mode; "All media" means the root.
    pub fn mkdir(&mut self, parent: NodeKey) -> Option<NodeKey> {
        let parent = if parent == self.all.key() {
            self.root.key()
        } else {
            parent
        };
        self.cancel_edit();
        let target = self.root.find_mut(parent)?;
        if target.id().is_none() {
            return None;
        }
        let placeholder = DirectoryNode::new(None, NEW_FOLDER_LABEL, NodeFeatures::default());
        let key = placeholder.key();
        target.append_child(placeholder);
        target.set_open(true);
        self.begin_edit(key);
        Some(key)
    }

    // ── Structural operations ────────────────────────────────────────────────

    /// Move directory `dragged` below `target`.
    ///
    /// Local checks run first; a rejected move sends nothing.
    pub async fn move_directory(&mut self, dragged: NodeKey, target: NodeKey) -> Result<String> {
        let old_parent = validate_move(&self.root, dragged, target).map_err(AppError::Rejected)?;
        let id = self.root.find(dragged).and_then(|n| n.id()).map(str::to_string);
        let parent = self.root.find(target).and_then(|n| n.id()).map(str::to_string);

        let new_id = into_directory_id(
            self.remote
                .call(DirectoryRequest::Move {
                    id: id.clone(),
                    parent,
                })
                .await?,
        )?;

        let mut node = self
            .root
            .find_mut(old_parent)
            .and_then(|p| p.remove_child(dragged))
            .ok_or(AppError::Rejected(MoveRejection::Unmovable))?;
        node.set_id(Some(new_id.clone()));
        if let Some(target) = self.root.find_mut(target) {
            target.append_child(node);
            target.set_open(true);
        }
        info!(from = ?id, to = %new_id, "directory moved");
        Ok(new_id)
    }

    /// Move catalog records into directory `target`.
    pub async fn move_records(&mut self, ids: Vec<RecordId>, target: NodeKey) -> Result<()> {
        let parent = match self.node(target) {
            Some(node) if node.features().droppable => node.id().map(str::to_string),
            _ => None,
        }
        .ok_or(AppError::Rejected(MoveRejection::NotDroppable))?;

        into_payload(
            self.remote
                .call(DirectoryRequest::MoveRecords {
                    ids: ids.clone(),
                    parent: Some(parent.clone()),
                })
                .await?,
        )?;
        info!(count = ids.len(), parent = %parent, "records moved");
        self.events.emit(TreeEvent::RecordsMoved { ids, parent });
        Ok(())
    }

    /// Delete directory `key` after `confirm` approves it. Returns `false` when not confirmed.
    ///
    /// On success the parent becomes the selection.
    pub async fn delete(&mut self, key: NodeKey, confirm: impl FnOnce(&str) -> bool) -> Result<bool> {
        if self.is_static(key) {
            return Err(AppError::Validation(
                "static entries cannot be deleted".into(),
            ));
        }
        let node = self
            .root
            .find(key)
            .ok_or_else(|| AppError::Validation("unknown directory".into()))?;
        let (id, name) = (node.id().map(str::to_string), node.name().to_string());
        if !confirm(&name) {
            return Ok(false);
        }

        into_payload(self.remote.call(DirectoryRequest::Delete { id: id.clone() }).await?)?;

        if let Some(parent) = self.root.find_parent_of(key).map(DirectoryNode::key) {
            self.remove_node(key);
            self.select(parent);
        }
        info!(id = ?id, "directory deleted");
        Ok(true)
    }

    pub async fn delete_selected(&mut self, confirm: impl FnOnce(&str) -> bool) -> Result<bool> {
        self.delete(self.selected, confirm).await
    }

    // ── Sync ─────────────────────────────────────────────────────────────────

    /// Whether the sync control is enabled (no sync in flight).
    pub fn is_sync_enabled(&self) -> bool {
        !self.syncing.load(Ordering::SeqCst)
    }

    /// Sync the selected directory. Returns `false` if a sync is already in flight.
    ///
    /// Success emits [`TreeEvent::Requery`]; failure is logged and leaves the tree untouched.
    pub async fn sync(&self) -> Result<bool> {
        if self.syncing.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        let _in_flight = InFlight(&self.syncing);

        let id = self.selected_id();
        let result = self
            .remote
            .call(DirectoryRequest::Sync { id: id.clone() })
            .await
            .and_then(into_payload);
        match result {
            Ok(_) => {
                self.events.emit(TreeEvent::Requery { id });
                Ok(true)
            }
            Err(e) => {
                warn!(id = ?id, error = %e, "sync failed");
                Err(e)
            }
        }
    }

    // ── Drag and drop ────────────────────────────────────────────────────────

    /// Begin a drag. Only one drag may be active; returns `false` if it cannot start.
    pub fn start_drag(&mut self, payload: DragPayload) -> bool {
        if self.drag.is_some() {
            return false;
        }
        let mut excluded = HashSet::new();
        if let DragPayload::Directory(key) = &payload {
            match self.root.find(*key) {
                Some(node) if node.features().draggable && node.id().is_some() => {
                    excluded.extend(node.subtree_keys());
                }
                _ => return false,
            }
        }
        let mut exclude = |n: &DirectoryNode| {
            if !n.features().droppable || n.id().is_none() {
                excluded.insert(n.key());
            }
        };
        self.all.for_all(&mut exclude);
        self.root.for_all(&mut exclude);

        self.drag = Some(DragSession::new(payload, excluded));
        true
    }

    pub fn dragging(&self) -> Option<&DragSession> {
        self.drag.as_ref()
    }

    /// Whether `key` is marked not-droppable in the current drag.
    pub fn is_drop_disabled(&self, key: NodeKey) -> bool {
        self.drag.as_ref().is_some_and(|d| !d.accepts(key))
    }

    /// Pointer moved over `key` (or off the tree); returns the highlighted target.
    pub fn drag_over(&mut self, key: Option<NodeKey>) -> Option<NodeKey> {
        self.drag.as_mut().and_then(|d| d.hover(key))
    }

    pub fn cancel_drag(&mut self) {
        self.drag = None;
    }

    /// Drop onto `target`, ending the drag. Returns `false` if the target does not accept it.
    pub async fn drop_on(&mut self, target: NodeKey) -> Result<bool> {
        let Some(drag) = self.drag.take() else {
            return Ok(false);
        };
        if !drag.accepts(target) {
            return Ok(false);
        }
        match drag.into_payload() {
            DragPayload::Directory(key) => self.move_directory(key, target).await.map(|_| true),
            DragPayload::Records(ids) => self.move_records(ids, target).await.map(|_| true),
        }
    }
}
