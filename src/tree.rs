//! The tree controller: instantiates one arena entry per rendered node,
//! drives every fetch and mutation, and applies their results.
//!
//! All state lives in the arena and is only touched from `&mut self`
//! methods, so every transition is atomic with respect to rendering.
//! Backend work runs on spawned tasks that report back through one
//! channel; the host either awaits [`TreeController::next_event`] in its
//! loop or calls [`TreeController::settle`] / [`TreeController::pump`].

use crate::action::ActionKind;
use crate::api::ThreadApi;
use crate::arena::{Arena, Entry, Generation, LoadState, PendingFetch};
use crate::config::TreeConfig;
use crate::error::{Rejection, TreeError};
use crate::events::TreeEvent;
use crate::fetcher;
use crate::model::{Content, Node, NodeId};
use crate::mutation::{self, Mutation, MutationKind, Payload, Resolved, Settled};
use crate::view::{self, RenderedNode, Row};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootStatus {
    Unmounted,
    /// Root content requested; nothing rendered yet.
    Loading(NodeId),
    Failed(NodeId, TreeError),
    Ready(NodeId),
    /// The root itself was deleted.
    Removed(NodeId),
}

impl RootStatus {
    pub fn id(&self) -> Option<&NodeId> {
        match self {
            Self::Unmounted => None,
            Self::Loading(id) | Self::Failed(id, _) | Self::Ready(id) | Self::Removed(id) => Some(id),
        }
    }
}

pub struct TreeController {
    api: Arc<dyn ThreadApi>,
    config: TreeConfig,
    arena: Arena,
    status: RootStatus,
    root_fetch: Option<PendingFetch>,
    /// Parent of every token issued for the current mount.
    scope: CancellationToken,
    tx: mpsc::UnboundedSender<TreeEvent>,
    rx: mpsc::UnboundedReceiver<TreeEvent>,
    in_flight: usize,
}

impl TreeController {
    pub fn new(api: Arc<dyn ThreadApi>, config: TreeConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            api,
            config,
            arena: Arena::new(),
            status: RootStatus::Unmounted,
            root_fetch: None,
            scope: CancellationToken::new(),
            tx,
            rx,
            in_flight: 0,
        }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn status(&self) -> &RootStatus {
        &self.status
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn entry(&self, id: &NodeId) -> Option<&Entry> {
        self.arena.get(id)
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.arena.get(id).map(|e| &e.node)
    }

    /// Spawned operations whose completion has not been applied yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight == 0
    }

    pub fn rows(&self) -> Vec<Row<'_>> {
        view::rows(&self.arena)
    }

    pub fn snapshot(&self) -> Option<RenderedNode> {
        view::snapshot(&self.arena)
    }

    // ── Lifecycle ──

    /// Shows the thread rooted at `id`. A different root replaces the
    /// current tree, cancelling all of its fetches; the same root is a no-op
    /// unless it failed or was removed.
    pub fn mount(&mut self, id: NodeId) {
        if let RootStatus::Loading(current) | RootStatus::Ready(current) = &self.status {
            if *current == id {
                return;
            }
        }
        self.unmount();
        tracing::info!(root = %id, "mounting thread");
        self.start_root(id);
    }

    /// Cancels every outstanding fetch and drops all node state.
    pub fn unmount(&mut self) {
        if self.status == RootStatus::Unmounted {
            return;
        }
        if let Some(id) = self.status.id() {
            tracing::info!(root = %id, nodes = self.arena.len(), "unmounting thread");
        }
        self.scope.cancel();
        self.scope = CancellationToken::new();
        self.arena.clear();
        self.root_fetch = None;
        self.status = RootStatus::Unmounted;
    }

    /// Re-roots the tree at `id`: a shown node, or the current root's parent.
    /// Returns the root that was replaced.
    pub fn focus(&mut self, id: NodeId) -> Option<NodeId> {
        let previous = self.status.id().cloned();
        tracing::debug!(from = ?previous, to = %id, "focus");
        self.mount(id);
        previous
    }

    fn start_root(&mut self, id: NodeId) {
        let ticket = self.arena.next_generation();
        let token = self.scope.child_token();
        self.root_fetch = Some(PendingFetch {
            ticket,
            token: token.clone(),
        });
        self.status = RootStatus::Loading(id.clone());
        self.in_flight += 1;
        fetcher::spawn_node(self.api.clone(), id, ticket, token, self.tx.clone());
    }

    /// Marks `id` loading and issues its children fetch under a fresh token.
    fn start_children(&mut self, id: &NodeId) {
        let ticket = self.arena.next_generation();
        let Some(entry) = self.arena.get_mut(id) else {
            return;
        };
        if let Some(superseded) = entry.fetch.take() {
            superseded.token.cancel();
        }
        let token = entry.scope.child_token();
        entry.fetch = Some(PendingFetch {
            ticket,
            token: token.clone(),
        });
        entry.load = LoadState::Loading;
        self.in_flight += 1;
        fetcher::spawn_children(self.api.clone(), id.clone(), ticket, token, self.tx.clone());
    }

    fn auto_expands(&self, depth: usize) -> bool {
        depth < self.config.max_depth
    }

    // ── Event application ──

    pub async fn next_event(&mut self) -> Option<TreeEvent> {
        self.rx.recv().await
    }

    pub fn apply(&mut self, event: TreeEvent) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match event {
            TreeEvent::Root { id, ticket, result } => self.on_root(id, ticket, result),
            TreeEvent::Children {
                parent,
                ticket,
                result,
            } => self.on_children(&parent, ticket, result),
            TreeEvent::Mutation { mutation, result } => self.on_mutation(&mutation, result),
        }
    }

    /// Applies whatever has already arrived, without waiting.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Applies events until nothing is outstanding, including fetches that
    /// the applied events themselves start.
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            match self.rx.recv().await {
                Some(event) => self.apply(event),
                None => break,
            }
        }
    }

    fn on_root(&mut self, id: NodeId, ticket: Generation, result: Result<Node, TreeError>) {
        let current = self
            .root_fetch
            .as_ref()
            .is_some_and(|f| f.ticket == ticket && !f.token.is_cancelled());
        if !current {
            tracing::debug!(root = %id, "dropping superseded root result");
            return;
        }
        self.root_fetch = None;
        match result {
            Ok(node) => {
                self.arena.set_root(node, &self.scope);
                self.status = RootStatus::Ready(id.clone());
                if self.auto_expands(0) {
                    self.start_children(&id);
                }
            }
            Err(TreeError::Cancelled) => {
                tracing::debug!(root = %id, "root fetch cancelled");
            }
            Err(error) => self.status = RootStatus::Failed(id, error),
        }
    }

    fn on_children(&mut self, parent: &NodeId, ticket: Generation, result: Result<Vec<Node>, TreeError>) {
        let Some(entry) = self.arena.get_mut(parent) else {
            tracing::debug!(%parent, "dropping children of a removed node");
            return;
        };
        let current = entry
            .fetch
            .as_ref()
            .is_some_and(|f| f.ticket == ticket && !f.token.is_cancelled());
        if !current {
            tracing::debug!(%parent, "dropping superseded children result");
            return;
        }
        entry.fetch = None;

        let nodes = match result {
            Ok(nodes) => nodes,
            Err(TreeError::Cancelled) => {
                tracing::debug!(%parent, "children fetch cancelled");
                entry.load = LoadState::NotStarted;
                return;
            }
            Err(error) => {
                entry.load = LoadState::Errored(error);
                return;
            }
        };

        if let Err(reason) = self.arena.validate_children(parent, &nodes) {
            tracing::warn!(%parent, "malformed thread data: {reason}");
            if let Some(entry) = self.arena.get_mut(parent) {
                entry.load = LoadState::Errored(TreeError::fetch_failed(parent, reason));
            }
            return;
        }

        let mut created = Vec::with_capacity(nodes.len());
        for node in nodes {
            let id = node.id.clone();
            if self.arena.push_child(parent, node, LoadState::NotStarted).is_some() {
                created.push(id);
            }
        }
        let pending = match self.arena.get_mut(parent) {
            Some(entry) => {
                entry.load = LoadState::Loaded;
                std::mem::take(&mut entry.pending_replies)
            }
            None => Vec::new(),
        };
        // Replies confirmed after the backend read this list.
        for reply in pending {
            let id = reply.id.clone();
            if self.arena.push_child(parent, reply, LoadState::Loaded).is_some() {
                tracing::debug!(%parent, reply = %id, "appended reply missing from fetched list");
            }
        }
        for id in created {
            let depth = self.arena.get(&id).map_or(usize::MAX, |e| e.depth);
            if self.auto_expands(depth) {
                self.start_children(&id);
            }
        }
    }

    fn on_mutation(&mut self, mutation: &Mutation, result: Result<Resolved, TreeError>) {
        let kind = mutation.kind();
        let node = &mutation.target;
        match mutation::settle(&mut self.arena, mutation, result) {
            Settled::Applied(kind) => tracing::info!(%node, "{kind} applied"),
            Settled::Removed(ids) => {
                tracing::info!(%node, removed = ids.len(), "delete applied");
            }
            Settled::RootRemoved => {
                tracing::info!(%node, "root deleted");
                self.root_fetch = None;
                self.status = RootStatus::Removed(node.clone());
            }
            Settled::Failed(error) => tracing::warn!(%node, "{error}"),
            Settled::Stale => tracing::debug!(%node, "dropping stale {kind} result"),
        }
    }

    // ── Requests from the host ──

    fn entry_mut(&mut self, id: &NodeId) -> Result<&mut Entry, Rejection> {
        if !matches!(self.status, RootStatus::Ready(_)) {
            return Err(Rejection::NotMounted);
        }
        self.arena
            .get_mut(id)
            .ok_or_else(|| Rejection::UnknownNode(id.clone()))
    }

    fn issue(&mut self, target: &NodeId, generation: Generation, payload: Payload) {
        let mutation = Mutation {
            target: target.clone(),
            generation,
            payload,
        };
        tracing::debug!(node = %target, kind = %mutation.kind(), "issuing mutation");
        self.in_flight += 1;
        mutation::spawn_execute(self.api.clone(), mutation, self.tx.clone());
    }

    /// Single fire-and-forget request; refused while one is in flight.
    pub fn boost(&mut self, id: &NodeId) -> Result<(), Rejection> {
        let entry = self.entry_mut(id)?;
        if !entry.boost.begin() {
            return Err(Rejection::InFlight {
                node: id.clone(),
                kind: MutationKind::Boost,
            });
        }
        let generation = entry.generation;
        self.issue(id, generation, Payload::Boost);
        Ok(())
    }

    /// Creates a reply under `parent`. At most one per parent in flight.
    pub fn submit_reply(&mut self, parent: &NodeId, content: Content) -> Result<(), Rejection> {
        if content.is_empty() {
            return Err(Rejection::EmptyContent(parent.clone()));
        }
        let entry = self.entry_mut(parent)?;
        if !entry.reply.begin() {
            return Err(Rejection::InFlight {
                node: parent.clone(),
                kind: MutationKind::Reply,
            });
        }
        let generation = entry.generation;
        self.issue(parent, generation, Payload::Reply(content));
        Ok(())
    }

    /// Forgets the last failed reply under `parent`.
    pub fn clear_reply_error(&mut self, parent: &NodeId) {
        if let Some(entry) = self.arena.get_mut(parent) {
            entry.reply.clear_failure();
        }
    }

    pub fn request_edit(&mut self, id: &NodeId) -> Result<(), Rejection> {
        self.entry_mut(id)?
            .actions
            .request(ActionKind::Edit)
            .map_err(|r| r.on(id))
    }

    pub fn request_delete(&mut self, id: &NodeId) -> Result<(), Rejection> {
        self.entry_mut(id)?
            .actions
            .request(ActionKind::Delete)
            .map_err(|r| r.on(id))
    }

    pub fn cancel_action(&mut self, id: &NodeId) -> Result<ActionKind, Rejection> {
        self.entry_mut(id)?.actions.cancel().map_err(|r| r.on(id))
    }

    pub fn submit_edit(&mut self, id: &NodeId, content: Content) -> Result<(), Rejection> {
        if content.is_empty() {
            return Err(Rejection::EmptyContent(id.clone()));
        }
        let entry = self.entry_mut(id)?;
        entry
            .actions
            .begin_submit(ActionKind::Edit)
            .map_err(|r| r.on(id))?;
        let generation = entry.generation;
        self.issue(id, generation, Payload::Edit(content));
        Ok(())
    }

    pub fn confirm_delete(&mut self, id: &NodeId) -> Result<(), Rejection> {
        let entry = self.entry_mut(id)?;
        entry
            .actions
            .begin_submit(ActionKind::Delete)
            .map_err(|r| r.on(id))?;
        let generation = entry.generation;
        self.issue(id, generation, Payload::Delete);
        Ok(())
    }

    /// Re-issues a failed fetch: the root's own fetch, or a node's children.
    pub fn retry(&mut self, id: &NodeId) -> Result<(), Rejection> {
        if let RootStatus::Failed(root, _) = &self.status {
            if root == id {
                let root = root.clone();
                tracing::info!(%root, "retrying root fetch");
                self.start_root(root);
                return Ok(());
            }
        }
        let entry = self.entry_mut(id)?;
        match &entry.load {
            LoadState::Errored(_) => {
                tracing::info!(node = %id, "retrying children fetch");
                self.start_children(id);
                Ok(())
            }
            other => Err(Rejection::WrongLoadState {
                node: id.clone(),
                state: other.label(),
            }),
        }
    }

    /// Starts the children fetch of a node left unexpanded by the depth guard.
    pub fn expand(&mut self, id: &NodeId) -> Result<(), Rejection> {
        let entry = self.entry_mut(id)?;
        match &entry.load {
            LoadState::NotStarted => {
                self.start_children(id);
                Ok(())
            }
            other => Err(Rejection::WrongLoadState {
                node: id.clone(),
                state: other.label(),
            }),
        }
    }

    /// Expires boost failures older than the configured TTL.
    pub fn prune_transient(&mut self) -> usize {
        let ttl = self.config.boost_error_ttl;
        self.arena
            .entries_mut()
            .map(|e| e.boost.expire(ttl))
            .filter(|expired| *expired)
            .count()
    }
}

impl Drop for TreeController {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::{ApiCall, MemoryApi};
    use crate::model::Submitter;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn node(id: &str, parent: Option<&str>) -> Node {
        Node {
            id: id.into(),
            title: None,
            body: Some(format!("body of {id}")),
            submitter: Submitter {
                id: "u".to_string(),
                username: "u".to_string(),
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
            parent: parent.map(NodeId::from),
            ancestors: Vec::new(),
            points: 0,
            child_count: 0,
        }
    }

    /// r ── a ── a1 ── a11
    fn chain() -> Arc<MemoryApi> {
        Arc::new(MemoryApi::from_nodes(vec![
            node("r", None),
            node("a", Some("r")),
            node("a1", Some("a")),
            node("a11", Some("a1")),
        ]))
    }

    fn controller(api: &Arc<MemoryApi>, config: TreeConfig) -> TreeController {
        TreeController::new(api.clone(), config)
    }

    #[tokio::test]
    async fn mount_loads_every_level() {
        let api = chain();
        let mut tree = controller(&api, TreeConfig::default());
        tree.mount("r".into());
        assert_eq!(tree.status(), &RootStatus::Loading("r".into()));
        tree.settle().await;

        assert_eq!(tree.status(), &RootStatus::Ready("r".into()));
        assert_eq!(tree.arena().len(), 4);
        assert!(tree.is_idle());
        assert!(tree.arena().entries().all(|e| e.load.is_loaded()));
    }

    #[tokio::test]
    async fn same_root_is_a_noop() {
        let api = chain();
        let mut tree = controller(&api, TreeConfig::default());
        tree.mount("r".into());
        tree.settle().await;
        tree.mount("r".into());
        tree.settle().await;
        let root_fetches = api
            .calls()
            .iter()
            .filter(|c| matches!(c, ApiCall::FetchNode(_)))
            .count();
        assert_eq!(root_fetches, 1);
    }

    #[tokio::test]
    async fn depth_guard_stops_auto_expansion() {
        let api = chain();
        let mut tree = controller(&api, TreeConfig::default().with_max_depth(2));
        tree.mount("r".into());
        tree.settle().await;

        let a1 = tree.entry(&"a1".into()).unwrap();
        assert_eq!(a1.depth, 2);
        assert_eq!(a1.load, LoadState::NotStarted);
        assert!(!tree.arena().contains(&"a11".into()));

        tree.expand(&"a1".into()).unwrap();
        tree.settle().await;
        assert!(tree.arena().contains(&"a11".into()));
        assert_eq!(
            tree.expand(&"a1".into()),
            Err(Rejection::WrongLoadState {
                node: "a1".into(),
                state: "loaded"
            })
        );
    }

    #[tokio::test]
    async fn requests_are_refused_before_mount() {
        let api = chain();
        let mut tree = controller(&api, TreeConfig::default());
        assert_eq!(tree.boost(&"r".into()), Err(Rejection::NotMounted));
        tree.mount("r".into());
        tree.settle().await;
        assert_eq!(
            tree.boost(&"zz".into()),
            Err(Rejection::UnknownNode("zz".into()))
        );
        assert_eq!(
            tree.submit_reply(&"r".into(), Content::default()),
            Err(Rejection::EmptyContent("r".into()))
        );
    }

    #[tokio::test]
    async fn missing_root_fails_and_retries() {
        let api = chain();
        let mut tree = controller(&api, TreeConfig::default());
        tree.mount("ghost".into());
        tree.settle().await;
        assert!(matches!(
            tree.status(),
            RootStatus::Failed(id, TreeError::FetchFailed { .. }) if id.as_str() == "ghost"
        ));
        assert!(tree.arena().is_empty());

        tree.retry(&"ghost".into()).unwrap();
        assert_eq!(tree.status(), &RootStatus::Loading("ghost".into()));
        tree.settle().await;
        assert!(matches!(tree.status(), RootStatus::Failed(..)));
    }

    #[tokio::test]
    async fn unmount_discards_outstanding_fetches() {
        let api = chain();
        api.hold_children(&"a".into());
        let mut tree = controller(&api, TreeConfig::default());
        tree.mount("r".into());
        while tree.arena().get(&"a".into()).map(|e| &e.load) != Some(&LoadState::Loading) {
            let event = tree.next_event().await.unwrap();
            tree.apply(event);
        }

        tree.unmount();
        assert_eq!(tree.status(), &RootStatus::Unmounted);
        tree.settle().await;
        assert!(tree.arena().is_empty());
        assert!(tree.is_idle());
    }

    #[tokio::test]
    async fn boost_guard_holds_until_settled() {
        let api = chain();
        let mut tree = controller(&api, TreeConfig::default());
        tree.mount("r".into());
        tree.settle().await;

        tree.boost(&"a".into()).unwrap();
        assert_eq!(
            tree.boost(&"a".into()),
            Err(Rejection::InFlight {
                node: "a".into(),
                kind: MutationKind::Boost
            })
        );
        tree.settle().await;
        assert_eq!(tree.node(&"a".into()).unwrap().points, 1);
        tree.boost(&"a".into()).unwrap();
        tree.settle().await;
        assert_eq!(tree.node(&"a".into()).unwrap().points, 2);
    }

    #[tokio::test]
    async fn boost_failure_expires() {
        let api = chain();
        let mut tree = controller(
            &api,
            TreeConfig {
                boost_error_ttl: std::time::Duration::ZERO,
                ..TreeConfig::default()
            },
        );
        tree.mount("r".into());
        tree.settle().await;
        api.fail_mutations(true);
        tree.boost(&"a".into()).unwrap();
        tree.settle().await;
        assert!(tree.entry(&"a".into()).unwrap().boost.error().is_some());
        assert_eq!(tree.prune_transient(), 1);
        assert!(tree.entry(&"a".into()).unwrap().boost.error().is_none());
    }
}
