//! Model Context Protocol server surface.
//!
//! Agents speak JSON-RPC 2.0 over one of two HTTP transports. The methods
//! handled are `initialize`, `ping`, `tools/list` and `tools/call`;
//! notifications are accepted and ignored.

pub mod handler;
pub mod protocol;
pub mod transport;

pub use handler::{dispatch, handle_message};
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use transport::SseSessions;
