//! Storage module
//!
//! Durable store of items, links, artifacts, threads, vectors, and the
//! feedback journal, backed by SQLite.

pub mod migrations;
mod sqlite;

pub use sqlite::{
    vector_from_bytes, vector_to_bytes, MemoryStore, NewItem, StoreError, StoreResult, VectorRow,
};
