//! The single live MySQL connection.
//!
//! Provides:
//! - Reachability probing before the engine handshake
//! - Connect/read timeouts on every network round trip
//! - Best-effort, idempotent disconnect
//! - Text-protocol execution so USE/SHOW/DESCRIBE work unprepared

use crate::classify::ErrorClass;
use crate::error::PocketError;
use crate::models::{RawResultSet, ServerEndpoint, SessionOptions, SslMode};
use crate::services::executor::StatementExecutor;
use crate::sql::{BoundStatement, SqlCommandBuilder};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow, MySqlSslMode};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use uuid::Uuid;

/// How long a graceful close may take before the socket is dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection character set. Cells are decoded as UTF-8, so this is fixed.
const CONNECTION_CHARSET: &str = "utf8mb4";

struct ActiveSession {
    id: Uuid,
    conn: MySqlConnection,
    endpoint: ServerEndpoint,
    connected_at: DateTime<Utc>,
}

/// Owns at most one engine connection.
pub struct SqlSession {
    options: SessionOptions,
    active: Option<ActiveSession>,
}

impl SqlSession {
    /// Create a disconnected session.
    pub fn new(options: SessionOptions) -> Self {
        Self { options, active: None }
    }

    /// Options in effect.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Open a connection to `endpoint`, closing any existing one first.
    ///
    /// When the endpoint names a database it is selected after connecting; a
    /// failure there is logged and does not fail the connect.
    pub async fn connect(&mut self, endpoint: &ServerEndpoint) -> Result<(), PocketError> {
        self.disconnect().await;
        endpoint.validate()?;

        let session_id = Uuid::new_v4();
        tracing::info!(
            session_id = %session_id,
            url = %endpoint.display_url(),
            "Connecting to database server"
        );

        Self::probe(&endpoint.host, endpoint.port, self.options.probe_timeout()).await?;

        let opts = Self::connect_options(endpoint);
        let connect_timeout = self.options.connect_timeout();
        let mut conn = match tokio::time::timeout(connect_timeout, MySqlConnection::connect_with(&opts)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                let err = PocketError::from(e);
                tracing::warn!(session_id = %session_id, error = %err, "Database connect failed");
                return Err(err);
            }
            Err(_) => {
                tracing::warn!(session_id = %session_id, "Database connect timed out");
                return Err(PocketError::connection_with_class(
                    format!(
                        "Server {}:{} did not complete login within {}s",
                        endpoint.host,
                        endpoint.port,
                        connect_timeout.as_secs()
                    ),
                    ErrorClass::Timeout,
                ));
            }
        };

        if let Some(database) = &endpoint.database {
            let sql = SqlCommandBuilder::use_database(database);
            match with_timeout(self.options.read_timeout(), Executor::execute(&mut conn, sql.as_str())).await {
                Ok(_) => tracing::debug!(session_id = %session_id, database = %database, "Default database selected"),
                Err(e) => tracing::warn!(
                    session_id = %session_id,
                    database = %database,
                    error = %e,
                    "Could not select default database; continuing without it"
                ),
            }
        }

        tracing::info!(session_id = %session_id, "Connected to database server");
        self.active = Some(ActiveSession {
            id: session_id,
            conn,
            endpoint: endpoint.clone(),
            connected_at: Utc::now(),
        });
        Ok(())
    }

    /// Close the connection. Never fails and is safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        tracing::info!(session_id = %active.id, "Closing database connection");
        match tokio::time::timeout(CLOSE_TIMEOUT, active.conn.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(session_id = %active.id, error = %e, "Close failed; ignoring"),
            Err(_) => tracing::warn!(session_id = %active.id, "Close timed out; dropping socket"),
        }
    }

    /// The live connection, if any.
    pub fn connection(&mut self) -> Option<&mut MySqlConnection> {
        self.active.as_mut().map(|a| &mut a.conn)
    }

    /// Whether a connection object is held, without touching the network.
    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    /// Endpoint of the live connection.
    pub fn endpoint(&self) -> Option<&ServerEndpoint> {
        self.active.as_ref().map(|a| &a.endpoint)
    }

    /// When the live connection was established.
    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.active.as_ref().map(|a| a.connected_at)
    }

    /// Liveness check bounded by the validation timeout.
    pub async fn is_connected(&mut self) -> bool {
        let validation_timeout = self.options.validation_timeout();
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        match tokio::time::timeout(validation_timeout, active.conn.ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::debug!(session_id = %active.id, error = %e, "Ping failed");
                false
            }
            Err(_) => {
                tracing::debug!(session_id = %active.id, "Ping timed out");
                false
            }
        }
    }

    /// Run `SELECT 1`. `Ok(false)` when there is no connection.
    pub async fn test_connection(&mut self) -> Result<bool, PocketError> {
        if !self.is_open() {
            return Ok(false);
        }
        self.fetch("SELECT 1").await?;
        Ok(true)
    }

    /// Raw TCP reachability check, so an unreachable host is reported as such
    /// rather than as an engine login failure.
    async fn probe(host: &str, port: u16, probe_timeout: Duration) -> Result<(), PocketError> {
        match tokio::time::timeout(probe_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                let class = match e.kind() {
                    std::io::ErrorKind::ConnectionRefused => ErrorClass::ConnectionRefused,
                    std::io::ErrorKind::TimedOut => ErrorClass::Timeout,
                    _ => crate::classify::classify_message(&e.to_string()),
                };
                Err(PocketError::Connection {
                    message: format!("Server unreachable at {host}:{port}: {e}"),
                    class: if class == ErrorClass::Unclassified { ErrorClass::UnknownHost } else { class },
                    source: Some(Box::new(e)),
                })
            }
            Err(_) => Err(PocketError::connection_with_class(
                format!(
                    "Server unreachable at {host}:{port}: no answer within {}s",
                    probe_timeout.as_secs()
                ),
                ErrorClass::Timeout,
            )),
        }
    }

    fn connect_options(endpoint: &ServerEndpoint) -> MySqlConnectOptions {
        let ssl_mode = match endpoint.ssl_mode {
            SslMode::Disabled => MySqlSslMode::Disabled,
            SslMode::Preferred => MySqlSslMode::Preferred,
            SslMode::Required => MySqlSslMode::Required,
        };

        MySqlConnectOptions::new()
            .host(&endpoint.host)
            .port(endpoint.port)
            .username(&endpoint.username)
            .password(&endpoint.password)
            .ssl_mode(ssl_mode)
            .charset(CONNECTION_CHARSET)
            .disable_statement_logging()
    }

    fn live(&mut self) -> Result<&mut ActiveSession, PocketError> {
        self.active.as_mut().ok_or(PocketError::NotConnected)
    }
}

/// Bound a driver call by the read timeout.
async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, PocketError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(PocketError::from),
        Err(_) => Err(PocketError::connection_with_class(
            format!("Statement exceeded the {}s read timeout", limit.as_secs()),
            ErrorClass::Timeout,
        )),
    }
}

/// Read every cell of a row as text; `None` is an engine NULL.
fn read_row(row: &MySqlRow) -> Result<Vec<Option<String>>, PocketError> {
    (0..row.len())
        .map(|index| -> Result<Option<String>, PocketError> {
            // Unchecked: every MySQL type has a textual byte form
            let bytes: Option<Vec<u8>> = row.try_get_unchecked(index)?;
            Ok(bytes.map(|b| String::from_utf8_lossy(&b).into_owned()))
        })
        .collect()
}

#[async_trait]
impl StatementExecutor for SqlSession {
    async fn fetch(&mut self, sql: &str) -> Result<RawResultSet, PocketError> {
        let read_timeout = self.options.read_timeout();
        let active = self.live()?;
        let start = Instant::now();

        let rows = with_timeout(read_timeout, Executor::fetch_all(&mut active.conn, sql)).await?;

        let columns: Vec<String> = match rows.first() {
            Some(first) => first.columns().iter().map(|c| c.name().to_string()).collect(),
            // No rows to read names from; ask the server to describe the statement
            None => match with_timeout(read_timeout, Executor::describe(&mut active.conn, sql)).await {
                Ok(described) => described.columns().iter().map(|c| c.name().to_string()).collect(),
                Err(e) => {
                    tracing::debug!(session_id = %active.id, error = %e, "Column discovery for empty result failed");
                    Vec::new()
                }
            },
        };

        let rows = rows.iter().map(read_row).collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            session_id = %active.id,
            execution_time_ms = start.elapsed().as_millis() as u64,
            row_count = rows.len(),
            "Fetch completed"
        );
        Ok(RawResultSet::new(columns, rows))
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, PocketError> {
        let read_timeout = self.options.read_timeout();
        let active = self.live()?;
        let start = Instant::now();

        let result = with_timeout(read_timeout, Executor::execute(&mut active.conn, sql)).await?;

        tracing::debug!(
            session_id = %active.id,
            execution_time_ms = start.elapsed().as_millis() as u64,
            rows_affected = result.rows_affected(),
            "Statement completed"
        );
        Ok(result.rows_affected())
    }

    async fn execute_bound(&mut self, statement: &BoundStatement) -> Result<u64, PocketError> {
        let read_timeout = self.options.read_timeout();
        let active = self.live()?;

        let mut query = sqlx::query(&statement.sql);
        for param in &statement.params {
            query = query.bind(param.as_deref());
        }

        let result = with_timeout(read_timeout, query.execute(&mut active.conn)).await?;
        tracing::debug!(
            session_id = %active.id,
            params = statement.params.len(),
            rows_affected = result.rows_affected(),
            "Bound statement completed"
        );
        Ok(result.rows_affected())
    }
}

impl std::fmt::Debug for SqlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlSession")
            .field("options", &self.options)
            .field("endpoint", &self.endpoint())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let mut session = SqlSession::new(SessionOptions::default());
        let endpoint = ServerEndpoint::new("127.0.0.1", "root", "pw").with_port(closed_port());

        let err = session.connect(&endpoint).await.unwrap_err();
        assert!(matches!(err, PocketError::Connection { .. }));
        assert!(err.to_string().contains("unreachable"));
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let mut session = SqlSession::new(SessionOptions::default());
        session.disconnect().await;
        session.disconnect().await;
        assert!(!session.is_connected().await);
        assert!(session.connection().is_none());
    }

    #[tokio::test]
    async fn test_statements_need_connection() {
        let mut session = SqlSession::new(SessionOptions::default());
        assert!(matches!(session.fetch("SELECT 1").await, Err(PocketError::NotConnected)));
        assert!(matches!(session.execute("DELETE FROM t").await, Err(PocketError::NotConnected)));
        assert!(!session.test_connection().await.unwrap());
    }

    #[test]
    fn test_connect_options_pin_utf8mb4() {
        let endpoint = ServerEndpoint::new("db.internal", "root", "pw").with_port(3307);
        let opts = SqlSession::connect_options(&endpoint);
        assert_eq!(opts.get_charset(), "utf8mb4");
        assert_eq!(opts.get_host(), "db.internal");
        assert_eq!(opts.get_port(), 3307);
    }

    #[tokio::test]
    async fn test_invalid_endpoint_rejected() {
        let mut session = SqlSession::new(SessionOptions::default());
        let err = session.connect(&ServerEndpoint::new("", "root", "pw")).await.unwrap_err();
        assert!(matches!(err, PocketError::Validation { .. }));
    }
}
