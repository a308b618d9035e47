//! State store backends for palaver.
//!
//! The `StateStore` contract lives in `palaver-core`; this crate ships
//! implementations. Database-backed stores belong to the embedding
//! application — what lives here is the in-memory backend used by tests and
//! ephemeral sessions.

pub mod in_memory;

pub use in_memory::InMemoryStateStore;
