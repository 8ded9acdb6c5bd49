//! Interaction session state: click tracking, in-place rename editing, drag sessions and the
//! local checks a directory move must pass before any request is sent.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::catalog::RecordId;
use crate::client::node::{DirectoryNode, NodeKey};

/// Two clicks on the same spot within this window count as a double click.
pub const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(500);

/// Why a directory move was refused locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveRejection {
    #[error("target lies inside the moved directory")]
    Cycle,
    #[error("directory is already inside the target")]
    SameParent,
    #[error("target already contains a directory with that name")]
    NameCollision,
    #[error("target does not accept drops")]
    NotDroppable,
    #[error("directory cannot be moved")]
    Unmovable,
}

/// Check a directory move against the tree before issuing it.
///
/// Returns the key of the current parent on success.
pub fn validate_move(
    tree: &DirectoryNode,
    dragged: NodeKey,
    target: NodeKey,
) -> Result<NodeKey, MoveRejection> {
    let dragged_node = tree.find(dragged).ok_or(MoveRejection::Unmovable)?;
    if !dragged_node.features().draggable || dragged_node.id().is_none() {
        return Err(MoveRejection::Unmovable);
    }
    let target_node = tree.find(target).ok_or(MoveRejection::NotDroppable)?;
    if !target_node.features().droppable || target_node.id().is_none() {
        return Err(MoveRejection::NotDroppable);
    }
    if dragged_node.contains(target) {
        return Err(MoveRejection::Cycle);
    }
    let parent = tree
        .find_parent_of(dragged)
        .ok_or(MoveRejection::Unmovable)?;
    if parent.key() == target {
        return Err(MoveRejection::SameParent);
    }
    if target_node
        .children()
        .iter()
        .any(|c| c.name() == dragged_node.name())
    {
        return Err(MoveRejection::NameCollision);
    }
    Ok(parent.key())
}

/// A pointer click on a node label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickEvent {
    pub x: i32,
    pub y: i32,
    pub at: Instant,
}

impl ClickEvent {
    pub fn new(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            at: Instant::now(),
        }
    }

    pub fn at(x: i32, y: i32, at: Instant) -> Self {
        Self { x, y, at }
    }
}

/// Remembers the previous click of one tree.
#[derive(Debug, Default)]
pub struct ClickTracker {
    last: Option<ClickEvent>,
}

impl ClickTracker {
    /// Record `click`; returns whether it completes a double click.
    pub fn register(&mut self, click: ClickEvent) -> bool {
        let double = self.last.is_some_and(|last| {
            last.x == click.x
                && last.y == click.y
                && click.at.saturating_duration_since(last.at) <= DOUBLE_CLICK_WINDOW
        });
        self.last = Some(click);
        double
    }
}

/// In-place rename of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    pub key: NodeKey,
    /// Name before editing, restored on cancel or failure.
    pub original: String,
    /// The node has no server directory yet; committing creates it.
    pub is_new: bool,
    pub input: String,
    pub cursor_position: usize,
}

impl EditSession {
    pub fn new(key: NodeKey, original: &str, is_new: bool) -> Self {
        Self {
            key,
            original: original.to_string(),
            is_new,
            input: original.to_string(),
            cursor_position: original.len(),
        }
    }

    /// Insert a character at the current cursor position.
    pub fn insert_char(&mut self, c: char) {
        self.input.insert(self.cursor_position, c);
        self.cursor_position += c.len_utf8();
    }

    /// Delete the character before the cursor (backspace).
    pub fn delete_char(&mut self) {
        if let Some(prev) = self.input[..self.cursor_position].chars().next_back() {
            self.cursor_position -= prev.len_utf8();
            self.input.remove(self.cursor_position);
        }
    }

    /// Move cursor left by one character.
    pub fn move_cursor_left(&mut self) {
        if let Some(prev) = self.input[..self.cursor_position].chars().next_back() {
            self.cursor_position -= prev.len_utf8();
        }
    }

    /// Move cursor right by one character.
    pub fn move_cursor_right(&mut self) {
        if let Some(next) = self.input[self.cursor_position..].chars().next() {
            self.cursor_position += next.len_utf8();
        }
    }

    pub fn cursor_home(&mut self) {
        self.cursor_position = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor_position = self.input.len();
    }

    /// Replace the whole input, cursor at the end.
    pub fn set_input(&mut self, value: &str) {
        self.input = value.to_string();
        self.cursor_position = self.input.len();
    }

    /// Trimmed value to commit.
    pub fn value(&self) -> &str {
        self.input.trim()
    }
}

/// What is being dragged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragPayload {
    Directory(NodeKey),
    /// Record ids dragged in from the host catalog listing.
    Records(Vec<RecordId>),
}

/// An active drag. Excluded nodes cannot be dropped onto.
#[derive(Debug, Clone)]
pub struct DragSession {
    payload: DragPayload,
    excluded: HashSet<NodeKey>,
    hover: Option<NodeKey>,
}

impl DragSession {
    pub fn new(payload: DragPayload, excluded: HashSet<NodeKey>) -> Self {
        Self {
            payload,
            excluded,
            hover: None,
        }
    }

    pub fn payload(&self) -> &DragPayload {
        &self.payload
    }

    pub fn accepts(&self, key: NodeKey) -> bool {
        !self.excluded.contains(&key)
    }

    /// Pointer moved over `key`; returns the node to highlight, if any.
    pub fn hover(&mut self, key: Option<NodeKey>) -> Option<NodeKey> {
        self.hover = key.filter(|k| self.accepts(*k));
        self.hover
    }

    pub fn hovered(&self) -> Option<NodeKey> {
        self.hover
    }

    pub fn into_payload(self) -> DragPayload {
        self.payload
    }
}
