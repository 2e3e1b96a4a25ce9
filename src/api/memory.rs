//! In-process [`ThreadApi`] backed by a node table.
//!
//! Serves the `mews` binary's thread files and the test suite. Beyond the
//! plain operations it can inject latency, fail a node's children fetch or
//! every mutation, hold a children fetch open until released, and splice
//! extra child links to produce malformed (cyclic) data. Every call is logged.

use super::ThreadApi;
use crate::model::{Content, Node, NodeId, Submitter};
use async_trait::async_trait;
use chrono::Utc;
use color_eyre::eyre::{eyre, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    FetchNode(NodeId),
    FetchChildren(NodeId),
    Boost(NodeId),
    CreateReply(NodeId),
    EditNode(NodeId),
    DeleteNode(NodeId),
}

#[derive(Default)]
struct Store {
    nodes: HashMap<NodeId, Node>,
    /// Ordered child ids per parent. Kept apart from `Node::parent` so tests
    /// can link a node under a second parent.
    children: HashMap<NodeId, Vec<NodeId>>,
    failing_children: HashSet<NodeId>,
    failing_mutations: bool,
    next_id: u64,
}

impl Store {
    fn snapshot(&self, id: &NodeId) -> Option<Node> {
        let mut node = self.nodes.get(id)?.clone();
        node.child_count = self.children.get(id).map_or(0, Vec::len);
        Some(node)
    }

    fn node_mut(&mut self, id: &NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| eyre!("node {id} not found"))
    }

    fn check_mutations(&self) -> Result<()> {
        if self.failing_mutations {
            return Err(eyre!("backend rejected the request"));
        }
        Ok(())
    }
}

pub struct MemoryApi {
    store: Mutex<Store>,
    calls: Mutex<Vec<ApiCall>>,
    gates: Mutex<HashMap<NodeId, watch::Sender<bool>>>,
    latency: Duration,
    user: Submitter,
}

impl MemoryApi {
    /// Children keep the order in which they appear in `nodes`.
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        let mut store = Store::default();
        for node in nodes {
            if let Some(parent) = &node.parent {
                store
                    .children
                    .entry(parent.clone())
                    .or_default()
                    .push(node.id.clone());
            }
            store.nodes.insert(node.id.clone(), node);
        }
        Self {
            store: Mutex::new(store),
            calls: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
            latency: Duration::ZERO,
            user: Submitter {
                id: "local".to_string(),
                username: "you".to_string(),
            },
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Identity stamped on replies created through this backend.
    pub fn with_user(mut self, user: Submitter) -> Self {
        self.user = user;
        self
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: ApiCall) {
        tracing::trace!(?call, "memory api call");
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current backend copy of a node, with its child count filled in.
    pub fn node(&self, id: &NodeId) -> Option<Node> {
        self.store().snapshot(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.store().nodes.contains_key(id)
    }

    pub fn fail_children(&self, id: &NodeId) {
        self.store().failing_children.insert(id.clone());
    }

    pub fn heal_children(&self, id: &NodeId) {
        self.store().failing_children.remove(id);
    }

    pub fn fail_mutations(&self, failing: bool) {
        self.store().failing_mutations = failing;
    }

    /// Adds `child` to `parent`'s children without touching `child.parent`.
    pub fn link_child(&self, parent: &NodeId, child: &NodeId) {
        self.store()
            .children
            .entry(parent.clone())
            .or_default()
            .push(child.clone());
    }

    /// Children fetches for `id` block until [`release_children`](Self::release_children).
    /// The list they return is read when the request arrives.
    pub fn hold_children(&self, id: &NodeId) {
        let (tx, _rx) = watch::channel(false);
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), tx);
    }

    pub fn release_children(&self, id: &NodeId) {
        if let Some(tx) = self
            .gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
        {
            tx.send_replace(true);
        }
    }

    fn gate(&self, id: &NodeId) -> Option<watch::Receiver<bool>> {
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(watch::Sender::subscribe)
    }

    async fn pause(&self, gate: Option<watch::Receiver<bool>>, cancel: &CancellationToken) -> Result<()> {
        let latency = self.latency;
        let wait = async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            if let Some(mut rx) = gate {
                // Sender dropped without release counts as released.
                let _ = rx.wait_for(|open| *open).await;
            }
        };
        tokio::select! {
            () = cancel.cancelled() => Err(eyre!("request aborted")),
            () = wait => Ok(()),
        }
    }

    fn list_children(&self, parent: &NodeId) -> Result<Vec<Node>> {
        let store = self.store();
        if store.failing_children.contains(parent) {
            return Err(eyre!("service unavailable while listing replies of {parent}"));
        }
        if !store.nodes.contains_key(parent) {
            return Err(eyre!("node {parent} not found"));
        }
        store
            .children
            .get(parent)
            .map_or(&[][..], Vec::as_slice)
            .iter()
            .map(|id| {
                store
                    .snapshot(id)
                    .ok_or_else(|| eyre!("dangling child {id} under {parent}"))
            })
            .collect()
    }

    async fn mutation_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl ThreadApi for MemoryApi {
    async fn fetch_node(&self, id: &NodeId, cancel: &CancellationToken) -> Result<Node> {
        self.record(ApiCall::FetchNode(id.clone()));
        self.pause(None, cancel).await?;
        self.store()
            .snapshot(id)
            .ok_or_else(|| eyre!("node {id} not found"))
    }

    async fn fetch_children(
        &self,
        parent: &NodeId,
        cancel: &CancellationToken,
    ) -> Result<Vec<Node>> {
        self.record(ApiCall::FetchChildren(parent.clone()));
        // Answered from the state at request time, delivered after the pause.
        let response = self.list_children(parent);
        let gate = self.gate(parent);
        self.pause(gate, cancel).await?;
        response
    }

    async fn boost(&self, id: &NodeId) -> Result<Node> {
        self.record(ApiCall::Boost(id.clone()));
        self.mutation_latency().await;
        let mut store = self.store();
        store.check_mutations()?;
        let node = store.node_mut(id)?;
        node.points = node.points.saturating_add(1);
        store
            .snapshot(id)
            .ok_or_else(|| eyre!("node {id} not found"))
    }

    async fn create_reply(&self, parent: &NodeId, content: &Content) -> Result<Node> {
        self.record(ApiCall::CreateReply(parent.clone()));
        self.mutation_latency().await;
        let mut store = self.store();
        store.check_mutations()?;
        let parent_node = store
            .nodes
            .get(parent)
            .ok_or_else(|| eyre!("node {parent} not found"))?;
        let mut ancestors = parent_node.ancestors.clone();
        ancestors.push(parent.clone());

        store.next_id += 1;
        let id = NodeId::new(format!("local-{}", store.next_id));
        let now = Utc::now();
        let node = Node {
            id: id.clone(),
            title: content.title.clone(),
            body: content.body.clone(),
            submitter: self.user.clone(),
            created_at: now,
            updated_at: now,
            parent: Some(parent.clone()),
            ancestors,
            points: 0,
            child_count: 0,
        };
        store.nodes.insert(id.clone(), node.clone());
        store.children.entry(parent.clone()).or_default().push(id);
        Ok(node)
    }

    async fn edit_node(&self, id: &NodeId, content: &Content) -> Result<Node> {
        self.record(ApiCall::EditNode(id.clone()));
        self.mutation_latency().await;
        let mut store = self.store();
        store.check_mutations()?;
        let node = store.node_mut(id)?;
        node.title = content.title.clone();
        node.body = content.body.clone();
        node.updated_at = Utc::now().max(node.created_at);
        store
            .snapshot(id)
            .ok_or_else(|| eyre!("node {id} not found"))
    }

    async fn delete_node(&self, id: &NodeId) -> Result<()> {
        self.record(ApiCall::DeleteNode(id.clone()));
        self.mutation_latency().await;
        let mut store = self.store();
        store.check_mutations()?;
        let node = store
            .nodes
            .remove(id)
            .ok_or_else(|| eyre!("node {id} not found"))?;
        if let Some(parent) = &node.parent {
            if let Some(siblings) = store.children.get_mut(parent) {
                siblings.retain(|c| c != id);
            }
        }
        let mut stack = store.children.remove(id).unwrap_or_default();
        while let Some(child) = stack.pop() {
            store.nodes.remove(&child);
            if let Some(grandchildren) = store.children.remove(&child) {
                stack.extend(grandchildren);
            }
        }
        Ok(())
    }
}
