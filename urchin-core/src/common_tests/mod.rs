//! Helpers shared by the unit and integration tests.
//!
//! Living in `src/` rather than `tests/` lets the structural checks reach
//! the crate-private node layer (link pointers, reference counts).

pub mod linked_list_helpers;
