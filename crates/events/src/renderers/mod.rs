//! Event renderers.

pub mod cli;
pub mod json;

pub use cli::{CliRenderer, CliRendererConfig};
pub use json::JsonRenderer;
