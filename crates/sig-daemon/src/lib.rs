//! sig-daemon library target.
//!
//! Exposes the router, state, and wire types for integration tests.
//! The binary `main.rs` depends on this library target.

pub mod api_types;
pub mod routes;
pub mod state;
pub mod ws;
