//! Node-indexed state table for the rendered tree.
//!
//! Entries are keyed by node id and linked to their parent and children by
//! id. Every entry owns a cancellation scope derived from its parent's, so
//! cancelling an entry also cancels everything fetched underneath it.

use crate::action::{ActionDispatcher, ControlState};
use crate::error::TreeError;
use crate::model::{Node, NodeId};
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;

/// Monotonic stamp handed out by the arena. Identifies one entry instance
/// and one fetch attempt; async results carrying an old stamp are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    NotStarted,
    Loading,
    Loaded,
    Errored(TreeError),
}

impl LoadState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotStarted => "not loaded",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Errored(_) => "errored",
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded)
    }

    pub fn error(&self) -> Option<&TreeError> {
        match self {
            Self::Errored(e) => Some(e),
            _ => None,
        }
    }
}

/// The children fetch currently outstanding for an entry.
#[derive(Debug, Clone)]
pub struct PendingFetch {
    pub ticket: Generation,
    pub token: CancellationToken,
}

#[derive(Debug)]
pub struct Entry {
    /// Local copy; diverges from the backend only through applied mutations.
    pub node: Node,
    pub parent: Option<NodeId>,
    pub depth: usize,
    pub generation: Generation,
    pub load: LoadState,
    /// Backend order, plus local replies appended at the end.
    pub children: Vec<NodeId>,
    /// Replies confirmed while the children fetch was outstanding. Added
    /// after that fetch lands unless it already lists them.
    pub pending_replies: Vec<Node>,
    pub scope: CancellationToken,
    pub fetch: Option<PendingFetch>,
    pub actions: ActionDispatcher,
    pub boost: ControlState,
    pub reply: ControlState,
}

impl Entry {
    pub fn id(&self) -> &NodeId {
        &self.node.id
    }
}

#[derive(Debug, Default)]
pub struct Arena {
    entries: HashMap<NodeId, Entry>,
    root: Option<NodeId>,
    next_generation: u64,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_generation(&mut self) -> Generation {
        self.next_generation += 1;
        Generation(self.next_generation)
    }

    pub fn root(&self) -> Option<&NodeId> {
        self.root.as_ref()
    }

    pub fn root_entry(&self) -> Option<&Entry> {
        self.root.as_ref().and_then(|id| self.entries.get(id))
    }

    pub fn get(&self, id: &NodeId) -> Option<&Entry> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut Entry> {
        self.entries.get_mut(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.entries.values_mut()
    }

    fn new_entry(&mut self, node: Node, parent: Option<NodeId>, depth: usize, scope: CancellationToken) -> Entry {
        Entry {
            node,
            parent,
            depth,
            generation: self.next_generation(),
            load: LoadState::NotStarted,
            children: Vec::new(),
            pending_replies: Vec::new(),
            scope,
            fetch: None,
            actions: ActionDispatcher::default(),
            boost: ControlState::default(),
            reply: ControlState::default(),
        }
    }

    /// Replaces whatever was there with a single root entry scoped under `scope`.
    pub fn set_root(&mut self, node: Node, scope: &CancellationToken) -> Generation {
        self.clear();
        let id = node.id.clone();
        let entry = self.new_entry(node, None, 0, scope.child_token());
        let generation = entry.generation;
        self.entries.insert(id.clone(), entry);
        self.root = Some(id);
        generation
    }

    /// Appends `node` to `parent`'s children. `None` if the parent is gone or
    /// the id is already taken.
    pub fn push_child(&mut self, parent: &NodeId, node: Node, load: LoadState) -> Option<Generation> {
        if self.entries.contains_key(&node.id) {
            return None;
        }
        let (depth, scope) = {
            let p = self.entries.get(parent)?;
            (p.depth + 1, p.scope.child_token())
        };
        let id = node.id.clone();
        let mut entry = self.new_entry(node, Some(parent.clone()), depth, scope);
        entry.load = load;
        let generation = entry.generation;
        self.entries.insert(id.clone(), entry);
        if let Some(p) = self.entries.get_mut(parent) {
            p.children.push(id);
        }
        Some(generation)
    }

    /// Parent-link chain from `id` (exclusive) up to the root.
    pub fn lineage(&self, id: &NodeId) -> Vec<&NodeId> {
        let mut chain = Vec::new();
        let mut cursor = self.entries.get(id).and_then(|e| e.parent.as_ref());
        while let Some(pid) = cursor {
            // Links are only ever created by push_child, but stay bounded anyway.
            if chain.len() > self.entries.len() {
                break;
            }
            chain.push(pid);
            cursor = self.entries.get(pid).and_then(|e| e.parent.as_ref());
        }
        chain
    }

    /// Rejects a children list that would turn the tree into a graph.
    pub fn validate_children(&self, parent: &NodeId, children: &[Node]) -> Result<(), String> {
        let lineage: HashSet<&NodeId> = self.lineage(parent).into_iter().collect();
        let mut seen = HashSet::new();
        for child in children {
            if &child.id == parent {
                return Err(format!("{parent} lists itself as a reply"));
            }
            if lineage.contains(&child.id) {
                return Err(format!("cycle: {} is an ancestor of {parent}", child.id));
            }
            if !seen.insert(&child.id) {
                return Err(format!("{} is listed twice", child.id));
            }
            if self.entries.contains_key(&child.id) {
                return Err(format!("{} already appears elsewhere in the thread", child.id));
            }
        }
        Ok(())
    }

    /// Removes `id` and every loaded descendant, cancelling their scopes and
    /// detaching `id` from its parent's children. Returns the removed ids,
    /// `id` first.
    pub fn remove_subtree(&mut self, id: &NodeId) -> Vec<NodeId> {
        let Some(top) = self.entries.get(id) else {
            return Vec::new();
        };
        top.scope.cancel();
        if let Some(parent) = top.parent.clone() {
            if let Some(p) = self.entries.get_mut(&parent) {
                p.children.retain(|c| c != id);
            }
        }

        let mut removed = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(next) = stack.pop() {
            if let Some(entry) = self.entries.remove(&next) {
                entry.scope.cancel();
                stack.extend(entry.children.iter().rev().cloned());
                removed.push(next);
            }
        }
        if self.root.as_ref() == Some(id) {
            self.root = None;
        }
        removed
    }

    pub fn clear(&mut self) {
        for entry in self.entries.values() {
            entry.scope.cancel();
        }
        self.entries.clear();
        self.root = None;
    }

    /// Pre-order walk from the root with depth relative to the root.
    pub fn preorder(&self) -> Vec<(&Entry, usize)> {
        let mut out = Vec::with_capacity(self.entries.len());
        let Some(root) = self.root_entry() else {
            return out;
        };
        let mut stack = vec![(root, 0usize)];
        while let Some((entry, depth)) = stack.pop() {
            out.push((entry, depth));
            for child in entry.children.iter().rev() {
                if let Some(c) = self.entries.get(child) {
                    stack.push((c, depth + 1));
                }
            }
        }
        out
    }

    /// Number of loaded descendants under `id`.
    pub fn descendant_count(&self, id: &NodeId) -> usize {
        let mut count = 0;
        let mut stack: Vec<&NodeId> = self
            .entries
            .get(id)
            .map(|e| e.children.iter().collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            if let Some(entry) = self.entries.get(next) {
                count += 1;
                stack.extend(entry.children.iter());
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Submitter;
    use chrono::Utc;

    fn node(id: &str) -> Node {
        Node {
            id: id.into(),
            title: None,
            body: None,
            submitter: Submitter {
                id: "u".to_string(),
                username: "u".to_string(),
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
            parent: None,
            ancestors: Vec::new(),
            points: 0,
            child_count: 0,
        }
    }

    /// r ─┬─ a ── a1 ── a11
    ///    └─ b
    fn arena() -> (Arena, CancellationToken) {
        let scope = CancellationToken::new();
        let mut arena = Arena::new();
        arena.set_root(node("r"), &scope);
        arena.push_child(&"r".into(), node("a"), LoadState::Loaded);
        arena.push_child(&"r".into(), node("b"), LoadState::NotStarted);
        arena.push_child(&"a".into(), node("a1"), LoadState::Loaded);
        arena.push_child(&"a1".into(), node("a11"), LoadState::Loading);
        (arena, scope)
    }

    fn ids(entries: &[(&Entry, usize)]) -> Vec<(String, usize)> {
        entries
            .iter()
            .map(|(e, d)| (e.id().to_string(), *d))
            .collect()
    }

    #[test]
    fn preorder_follows_child_order() {
        let (arena, _) = arena();
        assert_eq!(
            ids(&arena.preorder()),
            vec![
                ("r".to_string(), 0),
                ("a".to_string(), 1),
                ("a1".to_string(), 2),
                ("a11".to_string(), 3),
                ("b".to_string(), 1),
            ]
        );
    }

    #[test]
    fn generations_are_unique() {
        let (arena, _) = arena();
        let gens: HashSet<Generation> = arena.entries().map(|e| e.generation).collect();
        assert_eq!(gens.len(), arena.len());
    }

    #[test]
    fn push_child_refuses_duplicate_and_orphan() {
        let (mut arena, _) = arena();
        assert!(arena
            .push_child(&"b".into(), node("a"), LoadState::NotStarted)
            .is_none());
        assert!(arena
            .push_child(&"nope".into(), node("z"), LoadState::NotStarted)
            .is_none());
        assert_eq!(arena.len(), 5);
    }

    #[test]
    fn lineage_walks_parent_links() {
        let (arena, _) = arena();
        let chain: Vec<&str> = arena
            .lineage(&"a11".into())
            .iter()
            .map(|id| id.as_str())
            .collect();
        assert_eq!(chain, ["a1", "a", "r"]);
        assert!(arena.lineage(&"r".into()).is_empty());
    }

    #[test]
    fn validate_children_detects_cycles_and_duplicates() {
        let (arena, _) = arena();
        let a1: NodeId = "a1".into();
        assert!(arena.validate_children(&a1, &[node("x"), node("y")]).is_ok());
        assert!(arena
            .validate_children(&a1, &[node("a1")])
            .unwrap_err()
            .contains("itself"));
        assert!(arena
            .validate_children(&a1, &[node("r")])
            .unwrap_err()
            .contains("cycle"));
        assert!(arena
            .validate_children(&a1, &[node("x"), node("x")])
            .unwrap_err()
            .contains("twice"));
        assert!(arena
            .validate_children(&a1, &[node("b")])
            .unwrap_err()
            .contains("elsewhere"));
    }

    #[test]
    fn ancestors_field_is_not_consulted() {
        let (arena, _) = arena();
        let mut x = node("x");
        x.ancestors = vec!["a1".into(), "x".into()];
        assert!(arena.validate_children(&"a1".into(), &[x]).is_ok());
    }

    #[test]
    fn remove_subtree_cancels_and_detaches() {
        let (mut arena, _) = arena();
        let deep_scope = arena.get(&"a11".into()).unwrap().scope.clone();
        assert_eq!(arena.descendant_count(&"a".into()), 2);

        let removed = arena.remove_subtree(&"a".into());
        assert_eq!(removed.len(), 3);
        assert_eq!(removed[0], NodeId::from("a"));
        assert!(deep_scope.is_cancelled());
        assert_eq!(arena.len(), 2);
        assert_eq!(
            arena.get(&"r".into()).unwrap().children,
            vec![NodeId::from("b")]
        );
        assert!(!arena.get(&"b".into()).unwrap().scope.is_cancelled());
    }

    #[test]
    fn cancelling_outer_scope_reaches_every_entry() {
        let (arena, scope) = arena();
        scope.cancel();
        assert!(arena.entries().all(|e| e.scope.is_cancelled()));
    }

    #[test]
    fn clear_empties_and_cancels() {
        let (mut arena, _) = arena();
        let b_scope = arena.get(&"b".into()).unwrap().scope.clone();
        arena.clear();
        assert!(arena.is_empty());
        assert!(arena.root().is_none());
        assert!(b_scope.is_cancelled());
    }
}
