//! Local persistence layer for Inkpost

mod connection;
mod migrations;
mod store;

pub use connection::Database;
pub use store::{EntryMeta, LocalStore, Namespace, NamespaceUsage};
