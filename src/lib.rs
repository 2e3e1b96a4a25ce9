#![warn(clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::struct_excessive_bools,
    clippy::wildcard_imports,
    clippy::too_many_lines,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::fn_params_excessive_bools,
    clippy::too_many_arguments,
    clippy::doc_markdown
)]

pub mod action;
pub mod api;
pub mod app;
pub mod arena;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod input;
pub mod model;
pub mod mutation;
pub mod tree;
pub mod tui;
pub mod view;

pub use api::ThreadApi;
pub use config::TreeConfig;
pub use error::{Rejection, TreeError};
pub use model::{Content, Node, NodeId};
pub use tree::{RootStatus, TreeController};
