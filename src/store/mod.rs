//! Persistence layer — libSQL-backed contact rows and namespaced key-value state.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use memory::MemoryKv;
pub use traits::{ContactStore, KeyValueStore};
