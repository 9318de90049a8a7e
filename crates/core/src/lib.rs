//! Cyberbiz MCP Core - Shared domain types.
//!
//! This crate provides the types shared between the MCP server and its tests:
//! - Tenant identity (the shop a request acts for)
//! - The read-only product projection returned by discovery
//! - Catalog enums (`StoreType`, `Genre`, `SortKey`) with their wire codes
//! - Validated search queries
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no HTTP clients,
//! no async runtime. This keeps it lightweight and allows it to be used anywhere.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
