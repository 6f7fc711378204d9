//! SQLite persistence for graph documents and run results.

pub mod store;

pub use store::SqliteStore;
