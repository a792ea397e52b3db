//! CLI command handling

pub mod config;
pub mod output;
pub mod send;

pub use config::*;
pub use output::*;
pub use send::*;
