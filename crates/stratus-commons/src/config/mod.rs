//! Cloud topology configuration.
//!
//! The topology file is declarative JSON describing the primary SQL cloud,
//! any secondary SQL clouds, and the KV (cache cluster) clouds, with
//! `${VAR}` / `${SECRET:name:key}` placeholders resolved at load time.

mod loader;
mod types;

pub use loader::substitute_placeholders;
pub use types::{CloudConfig, DbConfig, KvCloud, SqlCloud};
