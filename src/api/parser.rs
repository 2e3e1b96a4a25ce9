use crate::model::{Node, NodeId};
use color_eyre::eyre::{eyre, Result};
use std::collections::HashSet;

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum ThreadDocument {
    Wrapped { mews: Vec<Node> },
    Bare(Vec<Node>),
}

/// Parses a thread document: either a bare array of nodes or the backend's
/// `{"mews": [...]}` envelope. Ids must be unique.
pub fn parse_thread(json: &str) -> Result<Vec<Node>> {
    let nodes = match serde_json::from_str::<ThreadDocument>(json)? {
        ThreadDocument::Wrapped { mews } => mews,
        ThreadDocument::Bare(nodes) => nodes,
    };
    let mut seen = HashSet::new();
    for node in &nodes {
        if !seen.insert(&node.id) {
            return Err(eyre!("duplicate node id {} in thread document", node.id));
        }
    }
    Ok(nodes)
}

/// The first node without a parent, in document order.
pub fn first_root(nodes: &[Node]) -> Option<&NodeId> {
    nodes.iter().find(|n| n.is_root()).map(|n| &n.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREAD_JSON: &str = r#"[
        {
            "id": "r",
            "title": "Root post",
            "submitter": {"id": "u1", "username": "ada"},
            "createdAt": "2024-01-15T10:00:00Z",
            "updatedAt": "2024-01-15T10:00:00Z",
            "points": 4
        },
        {
            "id": "a",
            "body": "first reply",
            "submitter": {"id": "u2", "username": "grace"},
            "createdAt": "2024-01-15T10:05:00Z",
            "updatedAt": "2024-01-15T10:06:00Z",
            "parent": "r",
            "ancestors": []
        }
    ]"#;

    #[test]
    fn parse_bare_array() {
        let nodes = parse_thread(THREAD_JSON).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].title.as_deref(), Some("Root post"));
        assert_eq!(nodes[0].points, 4);
        assert_eq!(nodes[1].parent, Some(NodeId::from("r")));
        assert!(nodes[1].was_edited());
    }

    #[test]
    fn parse_wrapped_envelope() {
        let json = format!(r#"{{"mews": {THREAD_JSON}}}"#);
        let nodes = parse_thread(&json).unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn parse_rejects_duplicate_ids() {
        let json = THREAD_JSON.replace(r#""id": "a""#, r#""id": "r""#);
        let err = parse_thread(&json).unwrap_err();
        assert!(err.to_string().contains("duplicate node id r"));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_thread("{not json").is_err());
        assert!(parse_thread(r#"{"runs": []}"#).is_err());
    }

    #[test]
    fn first_root_skips_replies() {
        let mut nodes = parse_thread(THREAD_JSON).unwrap();
        nodes.reverse();
        assert_eq!(first_root(&nodes), Some(&NodeId::from("r")));
        assert_eq!(first_root(&nodes[..1]), None);
    }
}
