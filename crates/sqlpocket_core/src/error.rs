//! Error types for the SQLPocket session layer.
//!
//! Every fallible operation returns `Result<_, PocketError>`. Driver and SSH
//! errors are classified once at the boundary (see [`crate::classify`]) and
//! carry a fixed user-facing message per class.

use crate::classify::{self, ErrorClass};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error category shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Host unreachable, auth failure, timeout
    Connection,
    /// Identity load, SSH auth, timeout, forwarding setup
    Tunnel,
    /// Syntax, missing object, constraint violation, permission, lock
    Database,
    /// File output owned by export collaborators
    Export,
    /// Anything not classified above
    Unknown,
}

/// Which step of tunnel setup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TunnelStage {
    /// Private key could not be read or decoded
    IdentityLoad,
    /// SSH server rejected the credentials
    Authentication,
    /// SSH handshake exceeded the connect timeout
    Timeout,
    /// TCP connection or handshake to the SSH host failed
    Connect,
    /// Local listener or forwarding channel could not be set up
    Forwarding,
}

impl TunnelStage {
    fn label(&self) -> &'static str {
        match self {
            Self::IdentityLoad => "identity load",
            Self::Authentication => "authentication",
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Forwarding => "forwarding",
        }
    }
}

/// Main error type for the session layer.
#[derive(Debug, Error)]
pub enum PocketError {
    /// Reaching or logging in to the SQL server failed.
    #[error("Connection error: {message}")]
    Connection {
        /// Human-readable error message.
        message: String,
        /// Pattern-matched class.
        class: ErrorClass,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// SSH tunnel setup failed.
    #[error("Tunnel error ({}): {message}", stage.label())]
    Tunnel {
        /// Step that failed.
        stage: TunnelStage,
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The server rejected a statement.
    #[error("{message}")]
    Database {
        /// Server error message.
        message: String,
        /// MySQL error number, when the server sent one.
        code: Option<u16>,
        /// Pattern-matched class.
        class: ErrorClass,
    },

    /// Writing exported data failed.
    #[error("Export error: {message}")]
    Export {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// SQL text contained nothing but separators and whitespace.
    #[error("No valid statement to execute")]
    NoValidStatement,

    /// An operation needed the live session but none is open.
    #[error("Not connected to a database server")]
    NotConnected,

    /// Row update/delete requested on a table without a known primary key.
    #[error("Table `{table}` has no primary key; rows cannot be edited")]
    MissingPrimaryKey {
        /// Table the edit targeted.
        table: String,
    },

    /// Caller supplied an invalid request.
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// Configuration file could not be read or parsed.
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// Unexpected error nothing else matched.
    #[error("Unexpected error: {message}")]
    Unknown {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PocketError {
    // ========== Constructors ==========

    /// Create a connection error, classifying the message.
    pub fn connection(message: impl Into<String>) -> Self {
        let message = message.into();
        let class = classify::classify_message(&message);
        Self::Connection { message, class, source: None }
    }

    /// Create a connection error with an explicit class.
    pub fn connection_with_class(message: impl Into<String>, class: ErrorClass) -> Self {
        Self::Connection { message: message.into(), class, source: None }
    }

    /// Create a tunnel error.
    pub fn tunnel(stage: TunnelStage, message: impl Into<String>) -> Self {
        Self::Tunnel { stage, message: message.into(), source: None }
    }

    /// Create a tunnel error with source.
    pub fn tunnel_with_source(
        stage: TunnelStage,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Tunnel { stage, message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a database error, classifying by code then message.
    pub fn database(message: impl Into<String>, code: Option<u16>) -> Self {
        let message = message.into();
        let class = classify::classify(code, &message);
        Self::Database { message, code, class }
    }

    /// Create an export error.
    pub fn export(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Export { message: message.into(), source }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create an unknown error.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown { message: message.into(), source: None }
    }

    // ========== Methods ==========

    /// Get the top-level category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } | Self::NotConnected => ErrorKind::Connection,
            Self::Tunnel { .. } => ErrorKind::Tunnel,
            Self::Database { .. } | Self::NoValidStatement | Self::MissingPrimaryKey { .. } => {
                ErrorKind::Database
            }
            Self::Export { .. } => ErrorKind::Export,
            Self::Validation { .. } | Self::Config { .. } | Self::Unknown { .. } => {
                ErrorKind::Unknown
            }
        }
    }

    /// Get the pattern-matched class, if this error went through classification.
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            Self::Connection { class, .. } | Self::Database { class, .. } => Some(*class),
            _ => None,
        }
    }

    /// Get the MySQL error number (if applicable).
    pub fn mysql_code(&self) -> Option<u16> {
        match self {
            Self::Database { code, .. } => *code,
            _ => None,
        }
    }

    /// Fixed user-facing message for this error.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Connection { class, .. } | Self::Database { class, .. } => {
                classify::user_message(*class)
            }
            Self::Tunnel { stage, .. } => match stage {
                TunnelStage::IdentityLoad => "The private key could not be loaded.",
                TunnelStage::Authentication => "The SSH server rejected the credentials.",
                TunnelStage::Timeout => "The SSH server did not respond in time.",
                TunnelStage::Connect => "Could not connect to the SSH server.",
                TunnelStage::Forwarding => "The SSH tunnel could not forward the database port.",
            },
            Self::Export { .. } => "The export file could not be written.",
            Self::NoValidStatement => "There is no SQL statement to run.",
            Self::NotConnected => "Not connected. Connect to a server first.",
            Self::MissingPrimaryKey { .. } => {
                "This table has no primary key, so rows cannot be edited."
            }
            Self::Validation { .. } => "Some of the entered values are invalid.",
            Self::Config { .. } => "The configuration file could not be loaded.",
            Self::Unknown { .. } => classify::user_message(ErrorClass::Unclassified),
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Connection { class: ErrorClass::AccessDenied, .. } => {
                Some("Verify the username and password for this server")
            }
            Self::Connection { .. } => Some("Check that the database server is running and reachable"),
            Self::Tunnel { stage: TunnelStage::IdentityLoad, .. } => {
                Some("Check the key file path and passphrase")
            }
            Self::Tunnel { stage: TunnelStage::Forwarding, .. } => {
                Some("The SSH server may not allow TCP forwarding")
            }
            Self::Tunnel { .. } => Some("Verify the SSH host, port and credentials"),
            Self::Database { class: ErrorClass::Syntax, .. } => Some("Check your query syntax"),
            Self::Database { class: ErrorClass::Lock, .. } => Some("Retry once the other session finishes"),
            Self::NotConnected => Some("Reconnect to the server"),
            _ => None,
        }
    }

    /// Convert to user-displayable error info.
    pub fn to_error_info(&self) -> ErrorInfo {
        let error_type = match self.kind() {
            ErrorKind::Connection => "Connection Error",
            ErrorKind::Tunnel => "Tunnel Error",
            ErrorKind::Database => "Database Error",
            ErrorKind::Export => "Export Error",
            ErrorKind::Unknown => "Error",
        };

        let technical_detail = match self {
            Self::Database { code: Some(code), message, .. } => {
                Some(format!("Code: {code}\nDetail: {message}"))
            }
            _ => Some(self.to_string()),
        };

        ErrorInfo {
            kind: self.kind(),
            error_type: error_type.to_string(),
            message: self.user_message().to_string(),
            hint: self.hint().map(String::from),
            technical_detail,
        }
    }
}

/// User-displayable error information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Top-level category.
    pub kind: ErrorKind,
    /// Category name (e.g., "Connection Error").
    pub error_type: String,
    /// Fixed user-facing message.
    pub message: String,
    /// Actionable suggestion.
    pub hint: Option<String>,
    /// Technical detail for a "Show Details" expansion.
    pub technical_detail: Option<String>,
}

// ========== Error Conversions ==========

/// Convert from sqlx::Error to PocketError.
impl From<sqlx::Error> for PocketError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            let message = db_err.message().to_string();
            let code = db_err
                .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                .map(|e| e.number());

            // A rejected login is a connection problem, not a statement problem
            if code == Some(1045) {
                return PocketError::Connection {
                    message,
                    class: ErrorClass::AccessDenied,
                    source: Some(Box::new(err)),
                };
            }
            return PocketError::database(message, code);
        }

        match err {
            sqlx::Error::Io(e) => {
                let message = e.to_string();
                let class = match e.kind() {
                    std::io::ErrorKind::TimedOut => ErrorClass::Timeout,
                    std::io::ErrorKind::ConnectionRefused => ErrorClass::ConnectionRefused,
                    _ => classify::classify_message(&message),
                };
                PocketError::Connection { message, class, source: Some(Box::new(e)) }
            }
            sqlx::Error::Tls(e) => PocketError::Connection {
                message: format!("TLS error: {e}"),
                class: ErrorClass::Unclassified,
                source: Some(e),
            },
            sqlx::Error::Configuration(e) => PocketError::Config { message: e.to_string() },
            sqlx::Error::PoolTimedOut => PocketError::connection_with_class(
                "Timed out acquiring connection",
                ErrorClass::Timeout,
            ),
            sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => PocketError::NotConnected,
            sqlx::Error::Protocol(message) => PocketError::connection(message),
            other => PocketError::Unknown { message: other.to_string(), source: Some(Box::new(other)) },
        }
    }
}

/// Convert from serde_json::Error to PocketError.
impl From<serde_json::Error> for PocketError {
    fn from(err: serde_json::Error) -> Self {
        PocketError::Config { message: format!("JSON error: {err}") }
    }
}
