//! Lock-free ordered sequence containers.
//!
//! The core type is [`ConcurrentList`], a doubly linked list that supports
//! insertion, removal and bidirectional traversal from many threads without
//! a global lock, built on tagged links (ABA-safe CAS), per-edge
//! locking-by-nulling, and per-node reference counting.

pub mod common_tests;
pub mod data_structures;

pub use data_structures::{ConcurrentList, Iter, ListCursor, ListError, ListRef};
