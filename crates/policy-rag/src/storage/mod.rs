//! Storage module for persistent data storage
//!
//! Provides SQLite-based persistence for documents and index entries.

mod database;

pub use database::{IndexChangeSet, IndexDb, IndexMeta, LoadedIndex, NewDocument};
