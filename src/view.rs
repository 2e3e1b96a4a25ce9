//! Read-only projections of the arena for rendering and inspection.

use crate::arena::{Arena, Entry, LoadState};
use crate::model::{Node, NodeId};
use serde::Serialize;

/// One visible line of the tree.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    pub entry: &'a Entry,
    pub depth: usize,
}

impl Row<'_> {
    pub fn id(&self) -> &NodeId {
        self.entry.id()
    }

    pub fn node(&self) -> &Node {
        &self.entry.node
    }

    /// Replies the backend advertises that are not shown below this row.
    pub fn hidden_replies(&self) -> usize {
        if self.entry.load.is_loaded() {
            0
        } else {
            self.entry.node.child_count
        }
    }
}

pub fn rows(arena: &Arena) -> Vec<Row<'_>> {
    arena
        .preorder()
        .into_iter()
        .map(|(entry, depth)| Row { entry, depth })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum NodeStatus {
    NotStarted,
    Loading,
    Loaded,
    Errored(String),
}

impl From<&LoadState> for NodeStatus {
    fn from(load: &LoadState) -> Self {
        match load {
            LoadState::NotStarted => Self::NotStarted,
            LoadState::Loading => Self::Loading,
            LoadState::Loaded => Self::Loaded,
            LoadState::Errored(e) => Self::Errored(e.to_string()),
        }
    }
}

/// Owned copy of the rendered tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedNode {
    pub node: Node,
    pub status: NodeStatus,
    pub children: Vec<RenderedNode>,
}

impl RenderedNode {
    /// Depth-first search by id.
    pub fn find(&self, id: &NodeId) -> Option<&RenderedNode> {
        let mut stack = vec![self];
        while let Some(next) = stack.pop() {
            if &next.node.id == id {
                return Some(next);
            }
            stack.extend(next.children.iter());
        }
        None
    }

    /// Nodes in this subtree, itself included.
    pub fn count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(next) = stack.pop() {
            count += 1;
            stack.extend(next.children.iter());
        }
        count
    }

    pub fn child_ids(&self) -> Vec<&str> {
        self.children.iter().map(|c| c.node.id.as_str()).collect()
    }
}

/// Builds the owned tree from the arena's pre-order walk. `None` when
/// nothing is mounted.
pub fn snapshot(arena: &Arena) -> Option<RenderedNode> {
    // stack[d] is the open node at depth d.
    let mut stack: Vec<RenderedNode> = Vec::new();
    for (entry, depth) in arena.preorder() {
        while stack.len() > depth {
            close(&mut stack);
        }
        stack.push(RenderedNode {
            node: entry.node.clone(),
            status: NodeStatus::from(&entry.load),
            children: Vec::new(),
        });
    }
    while stack.len() > 1 {
        close(&mut stack);
    }
    stack.pop()
}

fn close(stack: &mut Vec<RenderedNode>) {
    if let Some(done) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(done);
        }
    }
}
