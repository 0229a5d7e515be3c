//! Connection endpoint, tunnel and session option models.

use crate::error::PocketError;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Transport security for the SQL connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    /// Plain TCP
    Disabled,
    /// Use TLS if the server offers it (default)
    #[default]
    Preferred,
    /// Fail unless TLS is negotiated
    Required,
}

/// A SQL server reachable by host and port.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServerEndpoint {
    /// Server hostname or IP
    pub host: String,
    /// Server port (default 3306)
    pub port: u16,
    /// Login username
    pub username: String,
    /// Login password
    pub password: String,
    /// Database to select after connecting
    pub database: Option<String>,
    /// Transport security
    #[serde(default)]
    pub ssl_mode: SslMode,
}

impl ServerEndpoint {
    /// Default MySQL port.
    pub const DEFAULT_PORT: u16 = 3306;

    /// Create an endpoint on the default port.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: Self::DEFAULT_PORT,
            username: username.into(),
            password: password.into(),
            database: None,
            ssl_mode: SslMode::default(),
        }
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the target database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the SSL mode.
    pub fn with_ssl_mode(mut self, ssl_mode: SslMode) -> Self {
        self.ssl_mode = ssl_mode;
        self
    }

    /// Same credentials and database, reached through a local forwarded port.
    pub fn via_local_port(&self, local_port: u16) -> Self {
        Self { host: "127.0.0.1".to_string(), port: local_port, ..self.clone() }
    }

    /// Validate the endpoint before any I/O.
    pub fn validate(&self) -> Result<(), PocketError> {
        if self.host.trim().is_empty() {
            return Err(PocketError::validation("Host is required"));
        }
        if self.port == 0 {
            return Err(PocketError::validation("Port must be between 1 and 65535"));
        }
        if self.username.trim().is_empty() {
            return Err(PocketError::validation("Username is required"));
        }
        if matches!(&self.database, Some(db) if db.trim().is_empty()) {
            return Err(PocketError::validation("Database name cannot be blank"));
        }
        Ok(())
    }

    /// Display address without credentials.
    pub fn display_url(&self) -> String {
        match &self.database {
            Some(db) => format!("mysql://{}@{}:{}/{}", self.username, self.host, self.port, db),
            None => format!("mysql://{}@{}:{}", self.username, self.host, self.port),
        }
    }
}

impl std::fmt::Debug for ServerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// How to authenticate to the SSH intermediary.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TunnelAuth {
    /// Password authentication
    Password {
        /// SSH password
        password: String,
    },
    /// Private key file authentication
    KeyFile {
        /// Path to the private key
        path: PathBuf,
        /// Passphrase for an encrypted key
        passphrase: Option<String>,
    },
}

impl std::fmt::Debug for TunnelAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password { .. } => f.debug_struct("Password").finish_non_exhaustive(),
            Self::KeyFile { path, passphrase } => f
                .debug_struct("KeyFile")
                .field("path", path)
                .field("has_passphrase", &passphrase.is_some())
                .finish(),
        }
    }
}

/// A forwarding path through an SSH server to the SQL server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelSpec {
    /// SSH server hostname
    pub ssh_host: String,
    /// SSH server port (default 22)
    pub ssh_port: u16,
    /// SSH username
    pub username: String,
    /// Authentication method
    pub auth: TunnelAuth,
    /// Host the SSH server forwards to
    pub target_host: String,
    /// Port the SSH server forwards to
    pub target_port: u16,
}

impl TunnelSpec {
    /// Default SSH port.
    pub const DEFAULT_SSH_PORT: u16 = 22;

    /// Create a tunnel spec on the default SSH port.
    pub fn new(
        ssh_host: impl Into<String>,
        username: impl Into<String>,
        auth: TunnelAuth,
        target_host: impl Into<String>,
        target_port: u16,
    ) -> Self {
        Self {
            ssh_host: ssh_host.into(),
            ssh_port: Self::DEFAULT_SSH_PORT,
            username: username.into(),
            auth,
            target_host: target_host.into(),
            target_port,
        }
    }

    /// Set the SSH port.
    pub fn with_ssh_port(mut self, port: u16) -> Self {
        self.ssh_port = port;
        self
    }

    /// Tunnel to the host and port named by an endpoint.
    pub fn for_endpoint(
        ssh_host: impl Into<String>,
        username: impl Into<String>,
        auth: TunnelAuth,
        endpoint: &ServerEndpoint,
    ) -> Self {
        Self::new(ssh_host, username, auth, endpoint.host.clone(), endpoint.port)
    }

    /// Validate the tunnel spec before any I/O.
    pub fn validate(&self) -> Result<(), PocketError> {
        if self.ssh_host.trim().is_empty() {
            return Err(PocketError::validation("SSH host is required"));
        }
        if self.ssh_port == 0 || self.target_port == 0 {
            return Err(PocketError::validation("Port must be between 1 and 65535"));
        }
        if self.username.trim().is_empty() {
            return Err(PocketError::validation("SSH username is required"));
        }
        if self.target_host.trim().is_empty() {
            return Err(PocketError::validation("Tunnel target host is required"));
        }
        if let TunnelAuth::KeyFile { path, .. } = &self.auth {
            if path.as_os_str().is_empty() {
                return Err(PocketError::validation(
                    "Key path is required for key-based SSH authentication",
                ));
            }
        }
        Ok(())
    }
}

/// A saved way of reaching a server: the endpoint plus an optional tunnel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    /// SQL server as seen from the SSH host (or directly, without a tunnel)
    pub endpoint: ServerEndpoint,
    /// SSH intermediary
    #[serde(default)]
    pub tunnel: Option<TunnelSpec>,
}

impl ConnectionProfile {
    /// Read a profile from a JSON file.
    pub fn load(path: &std::path::Path) -> Result<Self, PocketError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PocketError::config(format!("Failed to read profile '{}': {e}", path.display()))
        })?;
        let profile: Self = serde_json::from_str(&text)?;
        profile.endpoint.validate()?;
        if let Some(tunnel) = &profile.tunnel {
            tunnel.validate()?;
        }
        Ok(profile)
    }
}

/// Timeouts and limits applied to tunnel and session operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// SSH connect + handshake timeout in seconds
    pub tunnel_connect_timeout_secs: u64,
    /// Engine connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Per-statement read timeout in seconds
    pub read_timeout_secs: u64,
    /// Raw socket reachability probe timeout in seconds
    pub probe_timeout_secs: u64,
    /// Liveness validation timeout in seconds
    pub validation_timeout_secs: u64,
    /// Rows fetched per page
    pub page_size: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            tunnel_connect_timeout_secs: 10,
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
            probe_timeout_secs: 5,
            validation_timeout_secs: 5,
            page_size: 50,
        }
    }
}

impl SessionOptions {
    /// SSH connect timeout.
    pub fn tunnel_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.tunnel_connect_timeout_secs)
    }

    /// Engine connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Per-statement read timeout.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Reachability probe timeout.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Liveness validation timeout.
    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }
}
