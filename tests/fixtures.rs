#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use mews_thread::api::memory::{ApiCall, MemoryApi};
use mews_thread::app::{AppConfig, AppState};
use mews_thread::model::{Node, NodeId, Submitter};
use mews_thread::{TreeConfig, TreeController};
use std::sync::Arc;

pub fn posted_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
}

pub fn node(id: &str, parent: Option<&str>) -> Node {
    Node {
        id: id.into(),
        title: parent.is_none().then(|| format!("Thread {id}")),
        body: Some(format!("Post {id}")),
        submitter: Submitter {
            id: "u1".to_string(),
            username: "ada".to_string(),
        },
        created_at: posted_at(),
        updated_at: posted_at(),
        parent: parent.map(NodeId::from),
        ancestors: Vec::new(),
        points: 3,
        child_count: 0,
    }
}

/// `r` with replies `a` (no replies) and `b` (two replies).
pub fn small_thread() -> Vec<Node> {
    vec![
        node("r", None),
        node("a", Some("r")),
        node("b", Some("r")),
        node("b1", Some("b")),
        node("b2", Some("b")),
    ]
}

/// A single chain `n0 ── n1 ── … ── n{len-1}`.
pub fn chain(len: usize) -> Vec<Node> {
    (0..len)
        .map(|i| {
            let id = format!("n{i}");
            let parent = i.checked_sub(1).map(|p| format!("n{p}"));
            node(&id, parent.as_deref())
        })
        .collect()
}

pub fn api(nodes: Vec<Node>) -> Arc<MemoryApi> {
    Arc::new(MemoryApi::from_nodes(nodes))
}

pub fn controller(api: &Arc<MemoryApi>) -> TreeController {
    TreeController::new(api.clone(), TreeConfig::default())
}

pub async fn mounted(api: &Arc<MemoryApi>, root: &str) -> TreeController {
    let mut tree = controller(api);
    tree.mount(root.into());
    tree.settle().await;
    tree
}

pub fn app_state(tree: TreeController) -> AppState {
    AppState::new(
        AppConfig {
            source: "thread.json".to_string(),
            version_string: "mews test".to_string(),
        },
        tree,
    )
}

pub fn children_calls(api: &MemoryApi) -> Vec<String> {
    api.calls()
        .into_iter()
        .filter_map(|c| match c {
            ApiCall::FetchChildren(id) => Some(id.to_string()),
            _ => None,
        })
        .collect()
}

pub fn ids(tree: &TreeController) -> Vec<String> {
    tree.rows().iter().map(|r| r.id().to_string()).collect()
}
