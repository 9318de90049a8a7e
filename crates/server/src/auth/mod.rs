//! Bearer-token verification.
//!
//! The MCP server is an OAuth resource server: agents present a bearer token
//! issued by the Cyberbiz authorization server and every request is checked
//! via token introspection before any tool runs.

pub mod introspection;

use secrecy::SecretString;
use thiserror::Error;

#[cfg(test)]
pub use introspection::MockTokenVerifier;
pub use introspection::{TokenIntrospector, TokenVerifier, VerifiedToken};

/// Bearer credential the current request may present to the catalog API.
///
/// In token mode this is the agent's own token; in header mode it is the
/// configured service token.
#[derive(Debug, Clone)]
pub struct CatalogCredential(pub SecretString);

/// Failures of the introspection call itself.
///
/// An inactive token is not an error; see [`TokenVerifier::verify`].
#[derive(Debug, Error)]
pub enum IntrospectionError {
    /// The authority rejected this server's own client credentials.
    #[error("Unauthorized: Invalid client credentials")]
    InvalidClientCredentials,

    /// The authority answered with an unexpected status.
    #[error("Introspection failed with status {status}: {body}")]
    Protocol {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Network or timeout failure.
    #[error("Introspection request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The response body was not valid introspection JSON.
    #[error("Malformed introspection response: {0}")]
    MalformedResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            IntrospectionError::InvalidClientCredentials.to_string(),
            "Unauthorized: Invalid client credentials"
        );
        let err = IntrospectionError::Protocol {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Introspection failed with status 500: boom"
        );
    }
}
