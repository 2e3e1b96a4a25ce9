pub mod composer;
pub mod confirm;
pub mod footer;
pub mod header;
pub mod render;
pub mod spinner;
pub mod tree;
