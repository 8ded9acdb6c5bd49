//! Client-side directory node model.
//!
//! A node owns its children; there is no parent back-reference, so parent lookup is a tree
//! search by [`NodeKey`].

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::fs::tree::DirectorySnapshot;
use crate::paths;

/// Identity of a node, stable across renames and moves.
pub type NodeKey = u64;

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

fn next_key() -> NodeKey {
    NEXT_KEY.fetch_add(1, AtomicOrdering::Relaxed)
}

/// Interaction capabilities of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeFeatures {
    pub openable: bool,
    pub selectable: bool,
    pub renameable: bool,
    pub draggable: bool,
    pub droppable: bool,
}

impl Default for NodeFeatures {
    fn default() -> Self {
        Self {
            openable: true,
            selectable: true,
            renameable: true,
            draggable: true,
            droppable: true,
        }
    }
}

impl NodeFeatures {
    /// Fixed entries above the user tree: selectable and droppable only.
    pub const STATIC: NodeFeatures = NodeFeatures {
        openable: false,
        selectable: true,
        renameable: false,
        draggable: false,
        droppable: true,
    };

    pub fn with_droppable(mut self, droppable: bool) -> Self {
        self.droppable = droppable;
        self
    }
}

/// Per-node filter outcome; `None` on the node means no filter is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FilterState {
    has_visible_children: bool,
}

/// A directory in the client tree.
#[derive(Debug, Clone)]
pub struct DirectoryNode {
    key: NodeKey,
    id: Option<String>,
    name: String,
    features: NodeFeatures,
    children: Vec<DirectoryNode>,
    is_open: bool,
    is_selected: bool,
    filter: Option<FilterState>,
    /// Whether this node passed its parent's current filter.
    visible: bool,
}

/// A flattened representation of a tree node for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatItem {
    pub key: NodeKey,
    pub id: Option<String>,
    pub name: String,
    pub depth: usize,
    pub is_open: bool,
    pub is_selected: bool,
    pub is_last_sibling: bool,
}

impl DirectoryNode {
    pub fn new(id: Option<String>, name: impl Into<String>, features: NodeFeatures) -> Self {
        Self {
            key: next_key(),
            id,
            name: name.into(),
            features,
            children: Vec::new(),
            is_open: false,
            is_selected: false,
            filter: None,
            visible: true,
        }
    }

    /// Build a node and its subtree from a server descriptor.
    pub fn from_snapshot(snapshot: &DirectorySnapshot) -> Self {
        let mut node = Self::new(
            Some(snapshot.id.clone()),
            snapshot.text.clone(),
            NodeFeatures::default(),
        );
        node.set_children(&snapshot.children);
        node
    }

    pub fn key(&self) -> NodeKey {
        self.key
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn features(&self) -> NodeFeatures {
        self.features
    }

    pub fn children(&self) -> &[DirectoryNode] {
        &self.children
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn is_selected(&self) -> bool {
        self.is_selected
    }

    /// Replace all children with nodes built from `descriptors`, in comparator order.
    pub fn set_children(&mut self, descriptors: &[DirectorySnapshot]) {
        self.children = descriptors.iter().map(Self::from_snapshot).collect();
        self.sort_children();
    }

    /// Insert `child` at its sorted position. Returns the index it landed at.
    pub fn append_child(&mut self, child: DirectoryNode) -> usize {
        let index = self
            .children
            .partition_point(|c| compare_names(&c.name, &child.name) != Ordering::Greater);
        self.children.insert(index, child);
        index
    }

    /// Remove the direct child with `key`; `None` if it is not a direct child.
    pub fn remove_child(&mut self, key: NodeKey) -> Option<DirectoryNode> {
        let index = self.children.iter().position(|c| c.key == key)?;
        Some(self.children.remove(index))
    }

    pub fn sort_children(&mut self) {
        self.children.sort_by(|a, b| compare_names(&a.name, &b.name));
    }

    /// Set this node's id and rewrite every descendant id from the old prefix to the new one.
    pub fn set_id(&mut self, id: Option<String>) {
        let old = std::mem::replace(&mut self.id, id);
        if let (Some(old), Some(new)) = (old, self.id.clone()) {
            for child in &mut self.children {
                child.rebase(&old, &new);
            }
        }
    }

    fn rebase(&mut self, old: &str, new: &str) {
        if let Some(rest) = self.id.as_deref().and_then(|id| paths::strip_dir_prefix(id, old)) {
            self.id = Some(paths::join(new, rest));
        }
        for child in &mut self.children {
            child.rebase(old, new);
        }
    }

    /// Open or close the node.
    ///
    /// Opening an open node does nothing. Closing closes every descendant too.
    pub fn set_open(&mut self, open: bool) {
        if open {
            if self.is_open {
                return;
            }
            self.is_open = true;
        } else {
            self.is_open = false;
            for child in &mut self.children {
                child.set_open(false);
            }
        }
    }

    /// Mark the node (de)selected; selecting an openable node also opens it.
    pub fn set_selected(&mut self, selected: bool) {
        self.is_selected = selected;
        if selected && self.features.openable {
            self.set_open(true);
        }
    }

    /// Restrict the visible children to those whose name contains `text` (case-insensitive) or
    /// that have such a descendant. An empty `text` clears the filter.
    ///
    /// Returns whether any child stays visible.
    pub fn filter(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            self.clear_filter();
            return !self.children.is_empty();
        }
        let needle = text.to_lowercase();
        self.apply_filter(&needle)
    }

    fn apply_filter(&mut self, needle: &str) -> bool {
        let mut any = false;
        for child in &mut self.children {
            let descendants = child.apply_filter(needle);
            child.visible = descendants || child.name.to_lowercase().contains(needle);
            any |= child.visible;
        }
        self.filter = Some(FilterState {
            has_visible_children: any,
        });
        any
    }

    fn clear_filter(&mut self) {
        self.filter = None;
        for child in &mut self.children {
            child.visible = true;
            child.clear_filter();
        }
    }

    pub fn is_filtered(&self) -> bool {
        self.filter.is_some()
    }

    /// Whether children are rendered: open, or a filter matched something below.
    pub fn shows_children(&self) -> bool {
        self.is_open || self.filter.is_some_and(|f| f.has_visible_children)
    }

    /// Children that pass the current filter.
    pub fn visible_children(&self) -> impl Iterator<Item = &DirectoryNode> {
        self.children.iter().filter(|c| c.visible)
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.find(key).is_some()
    }

    /// Find `key` in this subtree (including this node).
    pub fn find(&self, key: NodeKey) -> Option<&DirectoryNode> {
        if self.key == key {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(key))
    }

    pub fn find_mut(&mut self, key: NodeKey) -> Option<&mut DirectoryNode> {
        if self.key == key {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(key))
    }

    /// Find the node whose direct child is `key`.
    pub fn find_parent_of(&self, key: NodeKey) -> Option<&DirectoryNode> {
        if self.children.iter().any(|c| c.key == key) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_parent_of(key))
    }

    pub fn find_by_id(&self, id: &str) -> Option<&DirectoryNode> {
        if self.id.as_deref() == Some(id) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_by_id(id))
    }

    /// Keys of this node and all its descendants.
    pub fn subtree_keys(&self) -> Vec<NodeKey> {
        let mut keys = vec![self.key];
        for child in &self.children {
            keys.extend(child.subtree_keys());
        }
        keys
    }

    /// Every node in this subtree, depth-first.
    pub fn for_all(&self, f: &mut impl FnMut(&DirectoryNode)) {
        f(self);
        for child in &self.children {
            child.for_all(f);
        }
    }

    /// Flatten the rendered part of this subtree.
    pub fn flatten(&self, depth: usize, items: &mut Vec<FlatItem>) {
        self.flatten_node(depth, true, items);
    }

    fn flatten_node(&self, depth: usize, is_last: bool, items: &mut Vec<FlatItem>) {
        let shows_children = self.shows_children();
        items.push(FlatItem {
            key: self.key,
            id: self.id.clone(),
            name: self.name.clone(),
            depth,
            is_open: shows_children && self.features.openable,
            is_selected: self.is_selected,
            is_last_sibling: is_last,
        });
        if !shows_children {
            return;
        }
        let visible: Vec<&DirectoryNode> = self.visible_children().collect();
        for (i, child) in visible.iter().enumerate() {
            child.flatten_node(depth + 1, i == visible.len() - 1, items);
        }
    }
}

/// Split off the leading run of characters satisfying `pred`.
fn split_run(s: &str, pred: impl Fn(char) -> bool) -> (&str, &str) {
    let end = s.find(|c: char| !pred(c)).unwrap_or(s.len());
    s.split_at(end)
}

/// Compare two digit runs by numeric value without overflowing.
fn compare_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Sibling order: case-insensitive, with embedded numbers compared by value
/// (`item2` < `item10`).
pub fn compare_names(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    let lower_a = a.to_lowercase();
    let lower_b = b.to_lowercase();
    let (mut s1, mut s2) = (lower_a.as_str(), lower_b.as_str());

    while !s1.is_empty() {
        let (text1, rest1) = split_run(s1, |c| !c.is_ascii_digit());
        let (text2, rest2) = split_run(s2, |c| !c.is_ascii_digit());
        if text1 != text2 {
            return s1.cmp(s2);
        }
        s1 = rest1;
        s2 = rest2;

        let (num1, rest1) = split_run(s1, |c| c.is_ascii_digit());
        let (num2, rest2) = split_run(s2, |c| c.is_ascii_digit());
        if num1.is_empty() || num2.is_empty() {
            break;
        }
        match compare_digits(num1, num2) {
            Ordering::Equal => {
                s1 = rest1;
                s2 = rest2;
            }
            order => return order,
        }
    }

    s1.cmp(s2).then_with(|| a.cmp(b))
}
