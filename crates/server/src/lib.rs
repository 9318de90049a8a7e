//! Cyberbiz shopping MCP server library.
//!
//! An OAuth resource server that lets AI agents discover products in a
//! single Cyberbiz shop. Every request is authenticated, bound to exactly one
//! shop, and answered from that shop's data only.
//!
//! # Architecture
//!
//! ```text
//! request -> auth gate (token introspection | trusted headers)
//!         -> tenant::scope(identity)
//!         -> MCP JSON-RPC dispatch -> tool
//!         -> ProductSearchEngine
//!              keyword: catalog listing
//!              vector:  embedding -> BigQuery VECTOR_SEARCH -> parallel detail fetch
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod config;
pub mod error;
pub mod mcp;
pub mod middleware;
pub mod routes;
pub mod search;
pub mod services;
pub mod state;
pub mod tenant;
pub mod tools;

#[cfg(test)]
mod test_support;

pub use routes::router;
