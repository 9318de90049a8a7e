//! Server configuration loaded from the command line and environment variables.
//!
//! # Command Line
//!
//! - `--transport` / `TRANSPORT` - `sse` or `streamable-http` (required)
//! - `--host` / `HOST` - Bind address (default: 127.0.0.1)
//! - `--port` / `PORT` - Listen port (default: 8000)
//!
//! # Environment Variables
//!
//! ## Always required
//! - `CYBERBIZ_API_BASE_URL` - Catalog API base URL (e.g. `https://api.cyberbiz.co/v2`)
//! - `CYBERBIZ_GCP_PROJECT_ID` - GCP project hosting BigQuery and Vertex AI
//!
//! ## Token mode (`AUTH_MODE=token`, the default)
//! - `MCP_SERVER_CLIENT_ID` - This server's OAuth client id (introspection only)
//! - `MCP_SERVER_CLIENT_SECRET` - This server's OAuth client secret
//! - `CYBERBIZ_AUTH_PUBLIC_URL` - Authorization server base URL, or
//!   `CYBERBIZ_AUTH_HOST` + `CYBERBIZ_AUTH_PORT` to build `http://host:port`
//!
//! ## Header mode (`AUTH_MODE=headers`)
//! - `CYBERBIZ_API_TOKEN` - Service token used for catalog calls
//!
//! ## Optional
//! - `INTROSPECTION_PATH` - Path on the authorization server (default: /oauth/introspect)
//! - `REQUIRED_SCOPES` - Space-delimited scopes every token must carry
//! - `CYBERBIZ_GENAI_LOCATION` - Vertex AI region (default: us-central1)
//! - `PRODUCT_EMBEDDING_TABLE` - Fully-qualified BigQuery table of product embeddings
//! - `GOOGLE_ACCESS_TOKEN` - Static GCP access token (otherwise the metadata server is used)
//! - `PUBLIC_URL` - Externally visible URL of this server
//! - `SENTRY_DSN` / `SENTRY_ENVIRONMENT` - Sentry error tracking

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use clap::{Parser, ValueEnum};
use secrecy::SecretString;
use thiserror::Error;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;
const DEFAULT_INTROSPECTION_PATH: &str = "/oauth/introspect";
const DEFAULT_GENAI_LOCATION: &str = "us-central1";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Wire transport the MCP endpoint is served over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// Server-sent events stream plus a POST endpoint for client messages.
    #[value(name = "sse")]
    Sse,
    /// Single POST endpoint returning JSON responses.
    #[value(name = "streamable-http")]
    StreamableHttp,
}

/// How the tenant of a request is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Bearer tokens verified by remote introspection.
    Token,
    /// `X-Shop-ID` / `X-Shop-Domain` set by a trusted upstream proxy.
    Headers,
}

/// Process arguments.
#[derive(Debug, Clone, Parser)]
#[command(name = "cyberbiz-mcp-server", version, about = "Cyberbiz shopping MCP server")]
pub struct Cli {
    /// Transport to serve the MCP endpoint over.
    #[arg(long, env = "TRANSPORT", value_enum)]
    pub transport: Transport,
    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// MCP transport
    pub transport: Transport,
    /// Externally visible URL (overrides `http://host:port`)
    pub public_url: Option<String>,
    /// Tenant resolution mode
    pub auth_mode: AuthMode,
    /// Token introspection settings (token mode only)
    pub introspection: Option<IntrospectionConfig>,
    /// Catalog API settings
    pub catalog: CatalogConfig,
    /// GCP (BigQuery + Vertex AI) settings
    pub gcp: GcpConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Authorization server introspection settings.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct IntrospectionConfig {
    /// Authorization server base URL (advertised in protected-resource metadata)
    pub auth_base_url: String,
    /// Full introspection endpoint URL
    pub introspection_url: String,
    /// This server's registered client id
    pub client_id: String,
    /// This server's registered client secret
    pub client_secret: SecretString,
    /// Scopes every token must carry
    pub required_scopes: Vec<String>,
}

impl std::fmt::Debug for IntrospectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntrospectionConfig")
            .field("auth_base_url", &self.auth_base_url)
            .field("introspection_url", &self.introspection_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("required_scopes", &self.required_scopes)
            .finish()
    }
}

/// Catalog API settings.
#[derive(Clone)]
pub struct CatalogConfig {
    /// Base URL the `/products` paths are appended to
    pub base_url: String,
    /// Service token for header mode (token mode forwards the caller's token)
    pub service_token: Option<SecretString>,
}

impl std::fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("base_url", &self.base_url)
            .field(
                "service_token",
                &self.service_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// GCP settings shared by the embedding and BigQuery clients.
#[derive(Clone)]
pub struct GcpConfig {
    /// GCP project id
    pub project_id: String,
    /// Vertex AI region
    pub location: String,
    /// Fully-qualified product embedding table
    pub embedding_table: String,
    /// Static access token; when absent the metadata server is queried
    pub access_token: Option<SecretString>,
}

impl std::fmt::Debug for GcpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpConfig")
            .field("project_id", &self.project_id)
            .field("location", &self.location)
            .field("embedding_table", &self.embedding_table)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from the parsed CLI and environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env(cli: &Cli) -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(cli, |key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`ServerConfig::from_env`].
    pub fn from_lookup<F>(cli: &Cli, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let auth_mode = match env.or_default("AUTH_MODE", "token").as_str() {
            "token" => AuthMode::Token,
            "headers" => AuthMode::Headers,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "AUTH_MODE".to_string(),
                    format!("'{other}' (expected 'token' or 'headers')"),
                ));
            }
        };

        let introspection = match auth_mode {
            AuthMode::Token => Some(IntrospectionConfig::load(&env)?),
            AuthMode::Headers => None,
        };

        let catalog = CatalogConfig {
            base_url: env
                .required("CYBERBIZ_API_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            service_token: env.optional("CYBERBIZ_API_TOKEN").map(SecretString::from),
        };
        if auth_mode == AuthMode::Headers && catalog.service_token.is_none() {
            return Err(ConfigError::MissingEnvVar("CYBERBIZ_API_TOKEN".to_string()));
        }

        let project_id = env.required("CYBERBIZ_GCP_PROJECT_ID")?;
        let embedding_table = env.or_default(
            "PRODUCT_EMBEDDING_TABLE",
            &format!("{project_id}.cyberbiz_embedding_gemini.product_embeddings"),
        );
        let gcp = GcpConfig {
            location: env.or_default("CYBERBIZ_GENAI_LOCATION", DEFAULT_GENAI_LOCATION),
            embedding_table,
            access_token: env.optional("GOOGLE_ACCESS_TOKEN").map(SecretString::from),
            project_id,
        };

        Ok(Self {
            host: cli.host,
            port: cli.port,
            transport: cli.transport,
            public_url: env.optional("PUBLIC_URL"),
            auth_mode,
            introspection,
            catalog,
            gcp,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Externally visible base URL of this server.
    #[must_use]
    pub fn server_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port))
    }
}

impl IntrospectionConfig {
    fn load<F>(env: &Env<F>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let auth_base_url = match env.optional("CYBERBIZ_AUTH_PUBLIC_URL") {
            Some(url) => url,
            None => {
                let host = env.required("CYBERBIZ_AUTH_HOST")?;
                let port = env.required("CYBERBIZ_AUTH_PORT")?;
                port.parse::<u16>().map_err(|e| {
                    ConfigError::InvalidEnvVar("CYBERBIZ_AUTH_PORT".to_string(), e.to_string())
                })?;
                format!("http://{host}:{port}")
            }
        };
        let auth_base_url = auth_base_url.trim_end_matches('/').to_string();
        url::Url::parse(&auth_base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("CYBERBIZ_AUTH_PUBLIC_URL".to_string(), e.to_string())
        })?;

        let path = env.or_default("INTROSPECTION_PATH", DEFAULT_INTROSPECTION_PATH);
        let introspection_url = format!("{auth_base_url}/{}", path.trim_start_matches('/'));

        Ok(Self {
            introspection_url,
            auth_base_url,
            client_id: env.required("MCP_SERVER_CLIENT_ID")?,
            client_secret: env.validated_secret("MCP_SERVER_CLIENT_SECRET")?,
            required_scopes: env
                .optional("REQUIRED_SCOPES")
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Get an optional variable, treating empty values as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Load and validate a secret.
    fn validated_secret(&self, key: &str) -> Result<SecretString, ConfigError> {
        let value = self.required(key)?;
        validate_secret_strength(&value, key)?;
        Ok(SecretString::from(value))
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}
