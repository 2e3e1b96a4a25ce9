//! Mutation messages and their propagation into the arena.
//!
//! A mutation is addressed to one entry by id and generation. It is sent
//! to the backend, and only a successful result is written back, to the
//! exact entry that owns the affected state:
//!
//! - boost and edit: the target's own entry (created by its parent's fetch)
//! - reply: the parent's entry, whose children list grows by one (held
//!   on the entry until an outstanding children fetch lands)
//! - delete: the target's parent, whose children list shrinks by one
//!
//! Nothing is re-fetched. A result for an entry that no longer exists, or
//! that was replaced by a newer instance with the same id, is dropped.

use crate::action::ActionKind;
use crate::api::ThreadApi;
use crate::arena::{Arena, Generation, LoadState};
use crate::error::TreeError;
use crate::events::{self, TreeEvent};
use crate::model::{Content, Node, NodeId};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Boost,
    Reply,
    Edit,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Boost => "boost",
            Self::Reply => "reply",
            Self::Edit => "edit",
            Self::Delete => "delete",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Boost,
    Reply(Content),
    Edit(Content),
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// For a reply this is the parent being replied to.
    pub target: NodeId,
    /// Generation of the target entry when the mutation was issued.
    pub generation: Generation,
    pub payload: Payload,
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self.payload {
            Payload::Boost => MutationKind::Boost,
            Payload::Reply(_) => MutationKind::Reply,
            Payload::Edit(_) => MutationKind::Edit,
            Payload::Delete => MutationKind::Delete,
        }
    }
}

/// What the backend confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Boosted,
    Replied(Node),
    Edited(Node),
    Deleted,
}

/// How a settled mutation landed in the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    Applied(MutationKind),
    /// Subtree removed; ids in pre-order starting with the target.
    Removed(Vec<NodeId>),
    RootRemoved,
    Failed(TreeError),
    Stale,
}

/// Performs the backend call for `mutation`.
pub async fn execute(api: &dyn ThreadApi, mutation: &Mutation) -> Result<Resolved, TreeError> {
    let target = &mutation.target;
    let outcome = match &mutation.payload {
        Payload::Boost => api.boost(target).await.map(|_| Resolved::Boosted),
        Payload::Reply(content) => api.create_reply(target, content).await.map(Resolved::Replied),
        Payload::Edit(content) => api.edit_node(target, content).await.map(Resolved::Edited),
        Payload::Delete => api.delete_node(target).await.map(|()| Resolved::Deleted),
    };
    outcome.map_err(|e| TreeError::mutation_failed(mutation.kind(), target, format!("{e:#}")))
}

/// Runs [`execute`] on a task and reports exactly one [`TreeEvent::Mutation`],
/// even if the backend panics.
pub fn spawn_execute(api: Arc<dyn ThreadApi>, mutation: Mutation, tx: mpsc::UnboundedSender<TreeEvent>) {
    tokio::spawn(async move {
        let task = {
            let mutation = mutation.clone();
            tokio::spawn(async move { execute(api.as_ref(), &mutation).await })
        };
        let result = task.await.unwrap_or_else(|e| {
            Err(TreeError::mutation_failed(
                mutation.kind(),
                &mutation.target,
                events::join_failure(e),
            ))
        });
        if tx.send(TreeEvent::Mutation { mutation, result }).is_err() {
            tracing::warn!("mutation: channel closed");
        }
    });
}

/// Writes a settled mutation back into the arena. Also releases the guard
/// (boost/reply control or edit/delete dialog) that was held for it.
pub fn settle(arena: &mut Arena, mutation: &Mutation, result: Result<Resolved, TreeError>) -> Settled {
    let target = &mutation.target;
    let Some(entry) = arena
        .get_mut(target)
        .filter(|e| e.generation == mutation.generation)
    else {
        return Settled::Stale;
    };

    let kind = mutation.kind();
    let resolved = match result {
        Ok(resolved) => resolved,
        Err(error) => {
            match kind {
                MutationKind::Boost => entry.boost.finish(Err(error.clone())),
                MutationKind::Reply => entry.reply.finish(Err(error.clone())),
                MutationKind::Edit => {
                    entry.actions.finish_submit(ActionKind::Edit, Err(error.clone()));
                }
                MutationKind::Delete => {
                    entry.actions.finish_submit(ActionKind::Delete, Err(error.clone()));
                }
            }
            return Settled::Failed(error);
        }
    };

    match resolved {
        Resolved::Boosted => {
            entry.boost.finish(Ok(()));
            entry.node.points = entry.node.points.saturating_add(1);
            Settled::Applied(kind)
        }
        Resolved::Edited(edited) => {
            entry.actions.finish_submit(ActionKind::Edit, Ok(()));
            entry.node.title = edited.title;
            entry.node.body = edited.body;
            entry.node.updated_at = edited.updated_at;
            Settled::Applied(kind)
        }
        Resolved::Replied(reply) => {
            entry.reply.finish(Ok(()));
            // The parent's copy predates the reply, even when a children
            // fetch that finished first already listed it.
            entry.node.child_count += 1;
            if matches!(entry.load, LoadState::Loading) {
                entry.pending_replies.push(reply);
            } else if entry.load.is_loaded() && !arena.contains(&reply.id) {
                arena.push_child(target, reply, LoadState::Loaded);
            }
            Settled::Applied(kind)
        }
        Resolved::Deleted => {
            let Some(parent) = entry.parent.clone() else {
                arena.clear();
                return Settled::RootRemoved;
            };
            let removed = arena.remove_subtree(target);
            if let Some(owner) = arena.get_mut(&parent) {
                owner.node.child_count = owner.node.child_count.saturating_sub(1);
            }
            Settled::Removed(removed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Submitter;
    use chrono::{Duration, Utc};
    use tokio_util::sync::CancellationToken;

    fn node(id: &str, child_count: usize) -> Node {
        Node {
            id: id.into(),
            title: Some(format!("title {id}")),
            body: Some(format!("body {id}")),
            submitter: Submitter {
                id: "u".to_string(),
                username: "u".to_string(),
            },
            created_at: Utc::now() - Duration::hours(1),
            updated_at: Utc::now() - Duration::hours(1),
            parent: None,
            ancestors: Vec::new(),
            points: 2,
            child_count,
        }
    }

    /// r(loaded) ─┬─ a(loaded) ── a1
    ///            └─ b(not started)
    fn arena() -> Arena {
        let mut arena = Arena::new();
        arena.set_root(node("r", 2), &CancellationToken::new());
        arena.get_mut(&"r".into()).unwrap().load = LoadState::Loaded;
        arena.push_child(&"r".into(), node("a", 1), LoadState::Loaded);
        arena.push_child(&"r".into(), node("b", 4), LoadState::NotStarted);
        arena.push_child(&"a".into(), node("a1", 0), LoadState::Loaded);
        arena
    }

    fn mutation(arena: &Arena, target: &str, payload: Payload) -> Mutation {
        Mutation {
            target: target.into(),
            generation: arena.get(&target.into()).unwrap().generation,
            payload,
        }
    }

    #[test]
    fn boost_adds_exactly_one() {
        let mut arena = arena();
        let m = mutation(&arena, "a", Payload::Boost);
        arena.get_mut(&"a".into()).unwrap().boost.begin();
        assert_eq!(
            settle(&mut arena, &m, Ok(Resolved::Boosted)),
            Settled::Applied(MutationKind::Boost)
        );
        let a = arena.get(&"a".into()).unwrap();
        assert_eq!(a.node.points, 3);
        assert!(!a.boost.is_in_flight());
        assert_eq!(arena.get(&"r".into()).unwrap().node.points, 2);
    }

    #[test]
    fn failed_boost_changes_nothing_but_the_control() {
        let mut arena = arena();
        let m = mutation(&arena, "a", Payload::Boost);
        arena.get_mut(&"a".into()).unwrap().boost.begin();
        let err = TreeError::mutation_failed(MutationKind::Boost, &"a".into(), "rate limited");
        assert_eq!(
            settle(&mut arena, &m, Err(err.clone())),
            Settled::Failed(err.clone())
        );
        let a = arena.get(&"a".into()).unwrap();
        assert_eq!(a.node.points, 2);
        assert_eq!(a.boost.error(), Some(&err));
    }

    #[test]
    fn edit_replaces_content_only() {
        let mut arena = arena();
        let m = mutation(&arena, "a", Payload::Edit(Content::body("new")));
        {
            let a = arena.get_mut(&"a".into()).unwrap();
            a.actions.request(ActionKind::Edit).unwrap();
            a.actions.begin_submit(ActionKind::Edit).unwrap();
        }
        let mut edited = node("a", 99);
        edited.title = None;
        edited.body = Some("new".to_string());
        edited.updated_at = Utc::now();
        edited.points = 1000;
        edited.ancestors = vec!["zzz".into()];

        settle(&mut arena, &m, Ok(Resolved::Edited(edited.clone())));
        let a = arena.get(&"a".into()).unwrap();
        assert_eq!(a.node.title, None);
        assert_eq!(a.node.body.as_deref(), Some("new"));
        assert_eq!(a.node.updated_at, edited.updated_at);
        assert_eq!(a.node.points, 2);
        assert_eq!(a.node.child_count, 1);
        assert!(a.node.ancestors.is_empty());
        assert_eq!(a.children, vec![NodeId::from("a1")]);
        assert_eq!(a.actions.active(), None);
    }

    #[test]
    fn reply_appends_to_loaded_parent() {
        let mut arena = arena();
        let m = mutation(&arena, "a", Payload::Reply(Content::body("hi")));
        arena.get_mut(&"a".into()).unwrap().reply.begin();
        settle(&mut arena, &m, Ok(Resolved::Replied(node("a2", 0))));
        let a = arena.get(&"a".into()).unwrap();
        assert_eq!(a.children, vec![NodeId::from("a1"), NodeId::from("a2")]);
        assert_eq!(a.node.child_count, 2);
        let a2 = arena.get(&"a2".into()).unwrap();
        assert_eq!(a2.load, LoadState::Loaded);
        assert_eq!(a2.depth, 2);
    }

    #[test]
    fn reply_to_loading_parent_is_kept_for_the_fetch() {
        let mut arena = arena();
        arena.get_mut(&"b".into()).unwrap().load = LoadState::Loading;
        let m = mutation(&arena, "b", Payload::Reply(Content::body("hi")));
        settle(&mut arena, &m, Ok(Resolved::Replied(node("b9", 0))));
        let b = arena.get(&"b".into()).unwrap();
        assert!(b.children.is_empty());
        assert_eq!(b.node.child_count, 5);
        let pending: Vec<&str> = b.pending_replies.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(pending, ["b9"]);
        assert!(!arena.contains(&"b9".into()));
    }

    #[test]
    fn reply_already_listed_still_bumps_hint() {
        let mut arena = arena();
        let m = mutation(&arena, "a", Payload::Reply(Content::body("hi")));
        arena.get_mut(&"a".into()).unwrap().reply.begin();
        arena.push_child(&"a".into(), node("a2", 0), LoadState::Loaded);
        settle(&mut arena, &m, Ok(Resolved::Replied(node("a2", 0))));
        let a = arena.get(&"a".into()).unwrap();
        assert_eq!(a.children, vec![NodeId::from("a1"), NodeId::from("a2")]);
        assert_eq!(a.node.child_count, 2);
        assert!(a.pending_replies.is_empty());
        assert!(!a.reply.is_in_flight());
    }

    #[test]
    fn reply_to_unloaded_parent_only_bumps_hint() {
        let mut arena = arena();
        let m = mutation(&arena, "b", Payload::Reply(Content::body("hi")));
        settle(&mut arena, &m, Ok(Resolved::Replied(node("b9", 0))));
        let b = arena.get(&"b".into()).unwrap();
        assert!(b.children.is_empty());
        assert_eq!(b.node.child_count, 5);
        assert!(!arena.contains(&"b9".into()));
    }

    #[test]
    fn delete_removes_subtree_and_decrements_parent() {
        let mut arena = arena();
        let m = mutation(&arena, "a", Payload::Delete);
        let settled = settle(&mut arena, &m, Ok(Resolved::Deleted));
        assert_eq!(
            settled,
            Settled::Removed(vec![NodeId::from("a"), NodeId::from("a1")])
        );
        let r = arena.get(&"r".into()).unwrap();
        assert_eq!(r.children, vec![NodeId::from("b")]);
        assert_eq!(r.node.child_count, 1);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn delete_root_clears_everything() {
        let mut arena = arena();
        let m = mutation(&arena, "r", Payload::Delete);
        assert_eq!(
            settle(&mut arena, &m, Ok(Resolved::Deleted)),
            Settled::RootRemoved
        );
        assert!(arena.is_empty());
    }

    #[test]
    fn stale_generation_is_dropped() {
        let mut arena = arena();
        let mut m = mutation(&arena, "a", Payload::Boost);
        m.generation = arena.next_generation();
        assert_eq!(settle(&mut arena, &m, Ok(Resolved::Boosted)), Settled::Stale);
        assert_eq!(arena.get(&"a".into()).unwrap().node.points, 2);
    }

    #[test]
    fn removed_target_is_dropped() {
        let mut arena = arena();
        let m = mutation(&arena, "a1", Payload::Boost);
        arena.remove_subtree(&"a".into());
        assert_eq!(settle(&mut arena, &m, Ok(Resolved::Boosted)), Settled::Stale);
    }
}
