//! Callbridge API Library Crate
//!
//! Everything the `callbridge` binary serves: configuration, shared state,
//! the HTTP handlers and the per-call media bridge. The binary is a thin
//! wrapper around this library.

pub mod bridge;
pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
