//! Client configuration.
//!
//! Configuration is resolved from three layers, later layers winning:
//! built-in defaults, a `ksqldb.toml` file in the working directory, and
//! `KSQLDB_*` environment variables.
//!
//! ```toml
//! # ksqldb.toml
//! server_url = "http://localhost:8088"
//! buffer_capacity = 200
//! request_timeout_ms = 30000
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! KSQLDB_SERVER_URL=http://10.0.0.5:8088
//! KSQLDB_BUFFER_CAPACITY=500
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::KsqlError;

/// Settings for a [`Client`](crate::Client).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the server, e.g. `http://localhost:8088`.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Capacity of the bounded row/ack buffer between the transport-reading
    /// task and the consumer. The reader blocks once this many items are
    /// buffered and unconsumed.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Timeout for one-shot (non-streaming) requests, in milliseconds.
    /// 0 disables the timeout. Streaming requests are never timed out;
    /// they end with the stream or by cancellation.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_server_url() -> String {
    "http://localhost:8088".to_string()
}

fn default_buffer_capacity() -> usize {
    200
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            server_url: default_server_url(),
            buffer_capacity: default_buffer_capacity(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ClientConfig {
    /// Creates a configuration for the given server URL with defaults for
    /// everything else. A trailing `/` is stripped.
    pub fn new(server_url: impl Into<String>) -> Self {
        ClientConfig {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            ..ClientConfig::default()
        }
    }

    /// Loads configuration from `ksqldb.toml` and `KSQLDB_*` environment
    /// variables over the defaults.
    pub fn load() -> Result<Self, KsqlError> {
        Self::load_from(Toml::file("ksqldb.toml"))
    }

    /// Loads configuration from a specific TOML file plus the environment.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Self, KsqlError> {
        Self::load_from(Toml::file(path.as_ref()))
    }

    fn load_from(file: figment::providers::Data<Toml>) -> Result<Self, KsqlError> {
        let config: ClientConfig = Figment::from(Serialized::defaults(ClientConfig::default()))
            .merge(file)
            .merge(Env::prefixed("KSQLDB_"))
            .extract()
            .map_err(|e| KsqlError::validation(format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<(), KsqlError> {
        if self.server_url.trim().is_empty() {
            return Err(KsqlError::validation("server_url must not be empty"));
        }
        if self.buffer_capacity == 0 {
            return Err(KsqlError::validation("buffer_capacity must be at least 1"));
        }
        Ok(())
    }
}
