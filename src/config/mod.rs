//! Configuration: TOML file with compiled-in defaults

pub mod loader;
mod schema;

pub use loader::{load, registry, resolve_path};
pub use schema::*;
