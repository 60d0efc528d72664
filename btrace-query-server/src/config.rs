// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// btrace Query Server Configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP API listen address (e.g., "0.0.0.0:8080")
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    /// Whole-request timeout in seconds; must exceed the storage connect
    /// timeout plus the per-record receive timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Enable CORS
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,

    /// Allowed CORS origins (empty = allow all)
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Hostname of the btrace storage gRPC service
    #[serde(default = "default_storage_hostname")]
    pub hostname: String,

    /// Port of the btrace storage gRPC service
    #[serde(default = "default_storage_port")]
    pub port: u16,

    /// Connect timeout in seconds; an unreachable backend fails the request
    /// after this long
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Maximum wait for a single streamed record in seconds (0 = no limit)
    #[serde(default = "default_recv_timeout")]
    pub recv_timeout_secs: u64,
}

// Default values
fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_enable_cors() -> bool {
    true
}

fn default_storage_hostname() -> String {
    "localhost".to_string()
}

fn default_storage_port() -> u16 {
    50051
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_recv_timeout() -> u64 {
    30
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_addr(),
            request_timeout_secs: default_request_timeout(),
            enable_cors: default_enable_cors(),
            cors_origins: vec![],
            log_format: LogFormat::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            hostname: default_storage_hostname(),
            port: default_storage_port(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            recv_timeout_secs: default_recv_timeout(),
        }
    }
}

impl StorageConfig {
    /// gRPC endpoint URI of the storage service
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.hostname, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl StreamConfig {
    pub fn recv_timeout(&self) -> Option<Duration> {
        (self.recv_timeout_secs > 0).then(|| Duration::from_secs(self.recv_timeout_secs))
    }
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply environment variables on top of `self`
    ///
    /// Supported environment variables:
    /// - BTRACE_QUERY_HTTP_ADDR: HTTP listen address (default: 0.0.0.0:8080)
    /// - BTRACE_QUERY_REQUEST_TIMEOUT: Request timeout in seconds (default: 60)
    /// - BTRACE_QUERY_ENABLE_CORS: Enable CORS (default: true)
    /// - BTRACE_QUERY_CORS_ORIGINS: Comma-separated allowed origins
    /// - BTRACE_QUERY_LOG_FORMAT: "pretty" or "json"
    /// - BTRACE_QUERY_STORAGE_HOST: Storage service hostname (default: localhost)
    /// - BTRACE_QUERY_STORAGE_PORT: Storage service port (default: 50051)
    /// - BTRACE_QUERY_CONNECT_TIMEOUT: Storage connect timeout in seconds (default: 5)
    /// - BTRACE_QUERY_RECV_TIMEOUT: Per-record receive timeout in seconds (default: 30)
    pub fn merge_with_env(mut self) -> Self {
        if let Ok(addr) = std::env::var("BTRACE_QUERY_HTTP_ADDR") {
            self.server.listen_addr = addr;
        }

        if let Ok(timeout) = std::env::var("BTRACE_QUERY_REQUEST_TIMEOUT") {
            if let Ok(val) = timeout.parse() {
                self.server.request_timeout_secs = val;
            }
        }

        if let Ok(cors) = std::env::var("BTRACE_QUERY_ENABLE_CORS") {
            self.server.enable_cors = cors.parse().unwrap_or(true);
        }

        if let Ok(origins) = std::env::var("BTRACE_QUERY_CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        if let Ok(format) = std::env::var("BTRACE_QUERY_LOG_FORMAT") {
            if format.eq_ignore_ascii_case("json") {
                self.server.log_format = LogFormat::Json;
            } else if format.eq_ignore_ascii_case("pretty") {
                self.server.log_format = LogFormat::Pretty;
            }
        }

        // Storage configuration
        if let Ok(host) = std::env::var("BTRACE_QUERY_STORAGE_HOST") {
            self.storage.hostname = host;
        }

        if let Ok(port) = std::env::var("BTRACE_QUERY_STORAGE_PORT") {
            if let Ok(val) = port.parse() {
                self.storage.port = val;
            }
        }

        if let Ok(timeout) = std::env::var("BTRACE_QUERY_CONNECT_TIMEOUT") {
            if let Ok(val) = timeout.parse() {
                self.storage.connect_timeout_secs = val;
            }
        }

        // Stream configuration
        if let Ok(timeout) = std::env::var("BTRACE_QUERY_RECV_TIMEOUT") {
            if let Ok(val) = timeout.parse() {
                self.stream.recv_timeout_secs = val;
            }
        }

        self
    }

    /// Load configuration with priority: env > file > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
        } else {
            Self::default()
        };

        Ok(config.merge_with_env())
    }

    /// Parse listen address as SocketAddr
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.listen_addr.parse()?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.storage.hostname.trim().is_empty() {
            anyhow::bail!("storage.hostname must not be empty");
        }
        if self.storage.port == 0 {
            anyhow::bail!("storage.port must not be 0");
        }
        self.storage.endpoint().parse::<http::Uri>()?;

        if self.server.request_timeout_secs == 0 {
            anyhow::bail!("server.request_timeout_secs must be greater than 0");
        }

        // A stall on the first record must surface from the drain, not from
        // the outer request timeout.
        let first_record_budget =
            self.storage.connect_timeout_secs + self.stream.recv_timeout_secs;
        if self.stream.recv_timeout_secs > 0
            && self.server.request_timeout_secs <= first_record_budget
        {
            anyhow::bail!(
                "server.request_timeout_secs ({}) must exceed storage.connect_timeout_secs + stream.recv_timeout_secs ({})",
                self.server.request_timeout_secs,
                first_record_budget
            );
        }

        for origin in &self.server.cors_origins {
            origin
                .parse::<http::HeaderValue>()
                .map_err(|e| anyhow::anyhow!("invalid CORS origin '{}': {}", origin, e))?;
        }

        Ok(())
    }
}
