//! The transport seam. Everything the tree knows about the backend goes
//! through [`ThreadApi`].

pub mod memory;
pub mod parser;

use crate::model::{Content, Node, NodeId};
use async_trait::async_trait;
use color_eyre::eyre::Result;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait ThreadApi: Send + Sync {
    async fn fetch_node(&self, id: &NodeId, cancel: &CancellationToken) -> Result<Node>;
    /// Direct children in backend order.
    async fn fetch_children(&self, parent: &NodeId, cancel: &CancellationToken)
        -> Result<Vec<Node>>;
    async fn boost(&self, id: &NodeId) -> Result<Node>;
    /// Not idempotent: every successful call creates a node.
    async fn create_reply(&self, parent: &NodeId, content: &Content) -> Result<Node>;
    async fn edit_node(&self, id: &NodeId, content: &Content) -> Result<Node>;
    async fn delete_node(&self, id: &NodeId) -> Result<()>;
}
