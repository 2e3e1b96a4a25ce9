//! Discussion node data model and display helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Opaque, immutable node identity as issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submitter {
    #[serde(alias = "_id")]
    pub id: String,
    pub username: String,
}

/// One post or reply.
///
/// `ancestors` is breadcrumb data only. Nothing in the tree walks it; the
/// real structure is the `parent` link plus whatever a children fetch returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(alias = "_id")]
    pub id: NodeId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    pub submitter: Submitter,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub parent: Option<NodeId>,
    #[serde(default)]
    pub ancestors: Vec<NodeId>,
    #[serde(default)]
    pub points: u64,
    /// Hint only; says nothing about whether children are loaded.
    #[serde(default, alias = "children", deserialize_with = "count_or_ids")]
    pub child_count: usize,
}

/// The backend reports children either as a count or as the raw id array.
fn count_or_ids<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum CountOrIds {
        Count(usize),
        Ids(Vec<serde_json::Value>),
    }

    Ok(match CountOrIds::deserialize(deserializer)? {
        CountOrIds::Count(n) => n,
        CountOrIds::Ids(ids) => ids.len(),
    })
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Root-to-parent chain for display.
    pub fn breadcrumb(&self) -> Vec<&NodeId> {
        self.ancestors.iter().chain(self.parent.as_ref()).collect()
    }

    /// First line of the title, falling back to the body.
    pub fn headline(&self) -> &str {
        self.title
            .as_deref()
            .or(self.body.as_deref())
            .and_then(|s| s.lines().next())
            .unwrap_or("")
    }

    pub fn content(&self) -> Content {
        Content {
            title: self.title.clone(),
            body: self.body.clone(),
        }
    }

    pub fn was_edited(&self) -> bool {
        self.updated_at > self.created_at
    }
}

/// Title/body payload of a reply or an edit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub title: Option<String>,
    pub body: Option<String>,
}

impl Content {
    /// Trims both fields; blank strings become `None`.
    pub fn new(title: Option<&str>, body: Option<&str>) -> Self {
        fn clean(s: Option<&str>) -> Option<String> {
            s.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }
        Self {
            title: clean(title),
            body: clean(body),
        }
    }

    pub fn body(body: &str) -> Self {
        Self::new(None, Some(body))
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.body.is_none()
    }
}

/// Compact relative age: "now", "42s", "5m", "3h", "2d", then a calendar date.
pub fn format_age(created: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = now.signed_duration_since(created).num_seconds().max(0);
    if secs < 5 {
        "now".to_string()
    } else if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3600)
    } else if secs < 7 * 86_400 {
        format!("{}d", secs / 86_400)
    } else {
        created.format("%Y-%m-%d").to_string()
    }
}
