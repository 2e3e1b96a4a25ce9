//! Cancellable loading of a node and of a node's direct children.
//!
//! No retries here: one failed request is one `FetchFailed`, and the caller
//! decides whether to offer a retry. Cancellation wins over any response,
//! including one that arrives after the token fired.

use crate::api::ThreadApi;
use crate::arena::Generation;
use crate::error::TreeError;
use crate::events::{self, TreeEvent};
use crate::model::{Node, NodeId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub async fn fetch_children(
    api: &dyn ThreadApi,
    parent: &NodeId,
    cancel: &CancellationToken,
) -> Result<Vec<Node>, TreeError> {
    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(TreeError::Cancelled),
        outcome = api.fetch_children(parent, cancel) => outcome,
    };
    if cancel.is_cancelled() {
        return Err(TreeError::Cancelled);
    }
    outcome.map_err(|e| TreeError::fetch_failed(parent, format!("{e:#}")))
}

pub async fn fetch_node(
    api: &dyn ThreadApi,
    id: &NodeId,
    cancel: &CancellationToken,
) -> Result<Node, TreeError> {
    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(TreeError::Cancelled),
        outcome = api.fetch_node(id, cancel) => outcome,
    };
    if cancel.is_cancelled() {
        return Err(TreeError::Cancelled);
    }
    let node = outcome.map_err(|e| TreeError::fetch_failed(id, format!("{e:#}")))?;
    if &node.id != id {
        return Err(TreeError::fetch_failed(
            id,
            format!("backend answered with node {}", node.id),
        ));
    }
    Ok(node)
}

/// Spawns a children fetch that reports exactly one [`TreeEvent::Children`],
/// `Cancelled` included. A panicking backend is reported as a failure.
pub fn spawn_children(
    api: Arc<dyn ThreadApi>,
    parent: NodeId,
    ticket: Generation,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<TreeEvent>,
) {
    tokio::spawn(async move {
        let task = {
            let parent = parent.clone();
            tokio::spawn(async move { fetch_children(api.as_ref(), &parent, &cancel).await })
        };
        let result = task
            .await
            .unwrap_or_else(|e| Err(TreeError::fetch_failed(&parent, events::join_failure(e))));
        if let Err(e) = &result {
            if !e.is_cancelled() {
                tracing::warn!(%parent, "children fetch failed: {e}");
            }
        }
        if tx
            .send(TreeEvent::Children {
                parent,
                ticket,
                result,
            })
            .is_err()
        {
            tracing::debug!("children fetch: channel closed");
        }
    });
}

/// Spawns the root fetch; reports exactly one [`TreeEvent::Root`].
pub fn spawn_node(
    api: Arc<dyn ThreadApi>,
    id: NodeId,
    ticket: Generation,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<TreeEvent>,
) {
    tokio::spawn(async move {
        let task = {
            let id = id.clone();
            tokio::spawn(async move { fetch_node(api.as_ref(), &id, &cancel).await })
        };
        let result = task
            .await
            .unwrap_or_else(|e| Err(TreeError::fetch_failed(&id, events::join_failure(e))));
        if let Err(e) = &result {
            if !e.is_cancelled() {
                tracing::warn!(%id, "root fetch failed: {e}");
            }
        }
        if tx.send(TreeEvent::Root { id, ticket, result }).is_err() {
            tracing::debug!("root fetch: channel closed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::MemoryApi;
    use crate::model::Submitter;
    use chrono::Utc;

    fn node(id: &str, parent: Option<&str>) -> Node {
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
            parent: parent.map(NodeId::from),
            ancestors: Vec::new(),
            points: 0,
            child_count: 0,
        }
    }

    fn api() -> MemoryApi {
        MemoryApi::from_nodes(vec![
            node("r", None),
            node("b", Some("r")),
            node("a", Some("r")),
        ])
    }

    #[tokio::test]
    async fn children_order_is_preserved() {
        let api = api();
        let kids = fetch_children(&api, &"r".into(), &CancellationToken::new())
            .await
            .unwrap();
        let ids: Vec<&str> = kids.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[tokio::test]
    async fn backend_error_becomes_fetch_failed() {
        let api = api();
        api.fail_children(&"r".into());
        let err = fetch_children(&api, &"r".into(), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            TreeError::FetchFailed { node, reason } => {
                assert_eq!(node, NodeId::from("r"));
                assert!(reason.contains("unavailable"), "reason: {reason}");
            }
            other => panic!("expected FetchFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits() {
        let api = api();
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(
            fetch_children(&api, &"r".into(), &token).await,
            Err(TreeError::Cancelled)
        );
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn cancel_while_held_reports_cancelled() {
        let api = Arc::new(api());
        api.hold_children(&"r".into());
        let token = CancellationToken::new();
        let task = {
            let api = api.clone();
            let token = token.clone();
            tokio::spawn(async move { fetch_children(api.as_ref(), &"r".into(), &token).await })
        };
        tokio::task::yield_now().await;
        token.cancel();
        assert_eq!(task.await.unwrap(), Err(TreeError::Cancelled));
    }

    #[tokio::test]
    async fn fetch_node_checks_identity() {
        let api = api();
        let root = fetch_node(&api, &"r".into(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(root.child_count, 2);
        assert!(matches!(
            fetch_node(&api, &"missing".into(), &CancellationToken::new()).await,
            Err(TreeError::FetchFailed { .. })
        ));
    }
}
