//! In-memory storage layer.

mod keyspace;

pub use keyspace::{Entry, Keyspace};
