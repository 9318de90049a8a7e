//! HTTP middleware stack.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Authentication gate (MCP routes only; binds the tenant)

pub mod auth;
pub mod request_id;

pub use auth::{AuthRejection, RESOURCE_METADATA_PATH, authenticate};
pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};
