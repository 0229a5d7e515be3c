//! Session and application state.
//!
//! [`SessionManager`] owns the one tunnel and the one SQL session and applies
//! the teardown ordering between them. [`PocketState`] wraps it together with
//! configuration and a tokio runtime for callers that are not async.

use crate::config::{self, CoreConfig};
use crate::error::PocketError;
use crate::models::{ColumnSpec, QueryOutcome, QueryTarget, ServerEndpoint, SessionOptions, TabularSnapshot, TunnelSpec};
use crate::services::{
    QueryRouter, ResultPager, RowKey, SchemaService, SecureTunnel, SqlSession, StatementExecutor, TableEditor,
    TunnelProvider,
};
use crate::sql::{FieldMap, SqlCommandBuilder};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

struct SessionCore<T> {
    tunnel: T,
    session: SqlSession,
}

/// Owns the live tunnel and session.
///
/// Clones share the same underlying connection. Operations are serialized on
/// it; a pagination claim is tracked separately so a second load-more is
/// refused immediately instead of queueing behind the first.
pub struct SessionManager<T: TunnelProvider = SecureTunnel> {
    core: Arc<Mutex<SessionCore<T>>>,
    pager: Arc<parking_lot::Mutex<Option<ResultPager>>>,
    options: SessionOptions,
}

impl<T: TunnelProvider> Clone for SessionManager<T> {
    fn clone(&self) -> Self {
        Self { core: self.core.clone(), pager: self.pager.clone(), options: self.options.clone() }
    }
}

/// Releases a claimed page if `load_more` is dropped before the page lands.
struct PendingPage<'a> {
    slot: &'a parking_lot::Mutex<Option<ResultPager>>,
    pager_id: Uuid,
    settled: bool,
}

impl Drop for PendingPage<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(pager) = self.slot.lock().as_mut().filter(|p| p.id() == self.pager_id) {
            pager.abandon();
        }
    }
}

impl SessionManager<SecureTunnel> {
    /// Create a disconnected manager with an SSH tunnel provider.
    pub fn new(options: SessionOptions) -> Self {
        let tunnel = SecureTunnel::new(&options);
        Self::with_tunnel(options, tunnel)
    }
}

impl<T: TunnelProvider> SessionManager<T> {
    /// Create a disconnected manager with a custom tunnel provider.
    pub fn with_tunnel(options: SessionOptions, tunnel: T) -> Self {
        let session = SqlSession::new(options.clone());
        Self {
            core: Arc::new(Mutex::new(SessionCore { tunnel, session })),
            pager: Arc::new(parking_lot::Mutex::new(None)),
            options,
        }
    }

    /// Options in effect.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    // ========== Connection Lifecycle ==========

    /// Connect to `endpoint`, optionally through an SSH tunnel.
    ///
    /// The previous session is closed before the previous tunnel, and both
    /// before anything new is opened. If the SQL connect fails after a tunnel
    /// came up, the tunnel is closed before the error is returned.
    pub async fn connect(&self, endpoint: &ServerEndpoint, tunnel: Option<&TunnelSpec>) -> Result<(), PocketError> {
        let mut core = self.core.lock().await;
        self.pager.lock().take();

        core.session.disconnect().await;
        core.tunnel.close().await;

        let effective = match tunnel {
            Some(spec) => {
                let local_port = core.tunnel.open(spec).await?;
                tracing::debug!(local_port, "Routing connection through tunnel");
                endpoint.via_local_port(local_port)
            }
            None => endpoint.clone(),
        };

        if let Err(e) = core.session.connect(&effective).await {
            if core.tunnel.is_active() {
                tracing::warn!(error = %e, "Connect failed; closing tunnel");
                core.tunnel.close().await;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Close the session, then the tunnel. Never fails.
    pub async fn disconnect(&self) {
        let mut core = self.core.lock().await;
        self.pager.lock().take();
        core.session.disconnect().await;
        core.tunnel.close().await;
    }

    /// Liveness check of the SQL session.
    pub async fn is_connected(&self) -> bool {
        self.core.lock().await.session.is_connected().await
    }

    /// Run `SELECT 1` on the live session.
    pub async fn test_connection(&self) -> Result<bool, PocketError> {
        self.core.lock().await.session.test_connection().await
    }

    /// Endpoint of the live session (the local end when tunnelled).
    pub async fn endpoint(&self) -> Option<ServerEndpoint> {
        self.core.lock().await.session.endpoint().cloned()
    }

    /// Local port of the open tunnel.
    pub async fn tunnel_port(&self) -> Option<u16> {
        self.core.lock().await.tunnel.local_port()
    }

    // ========== Queries ==========

    /// Run user SQL and return the last statement's outcome.
    ///
    /// When the last statement is a SELECT only its first page is fetched;
    /// [`Self::load_more`] appends the rest.
    pub async fn run_query(&self, raw: &str, target: QueryTarget) -> Result<QueryOutcome, PocketError> {
        let mut pager = ResultPager::for_query(raw, target.clone(), self.options.page_size);
        let request = pager.as_mut().and_then(|p| p.begin());

        let mut core = self.core.lock().await;
        // Any in-flight page of the previous query is discarded on arrival
        self.pager.lock().take();

        let outcome = match request {
            Some(page) => QueryRouter::execute_page(&mut core.session, raw, &target, page).await,
            None => QueryRouter::execute(&mut core.session, raw, &target).await,
        };

        match (outcome, pager) {
            (Ok(QueryOutcome::Rows(first)), Some(mut pager)) => {
                let snapshot = pager.finish(Ok(first))?;
                *self.pager.lock() = Some(pager);
                Ok(QueryOutcome::Rows(snapshot))
            }
            (outcome, _) => outcome,
        }
    }

    /// First page of every row of a table, with primary key discovery.
    pub async fn browse_table(&self, database: &str, table: &str) -> Result<TabularSnapshot, PocketError> {
        let sql = SqlCommandBuilder::select_all(database, table);
        match self.run_query(&sql, QueryTarget::table(database, table)).await? {
            QueryOutcome::Rows(snapshot) => Ok(snapshot),
            QueryOutcome::Affected(_) => Err(PocketError::unknown("Browse did not return rows")),
        }
    }

    /// Append the next page of the current query.
    ///
    /// Returns `Ok(None)` without touching the server when no query is
    /// paginating, a page is already loading, or every row is loaded.
    pub async fn load_more(&self) -> Result<Option<TabularSnapshot>, PocketError> {
        let (pager_id, sql, target) = {
            let mut guard = self.pager.lock();
            let Some(pager) = guard.as_mut() else {
                return Ok(None);
            };
            let Some(request) = pager.begin() else {
                tracing::debug!(pager_id = %pager.id(), "Load more ignored");
                return Ok(None);
            };
            (pager.id(), pager.page_sql(request), pager.target().clone())
        };

        let mut pending = PendingPage { slot: &self.pager, pager_id, settled: false };
        let page = {
            let mut core = self.core.lock().await;
            ResultPager::fetch_page(&mut core.session, &sql, &target).await
        };
        pending.settled = true;

        let mut guard = self.pager.lock();
        match guard.as_mut() {
            Some(pager) if pager.id() == pager_id => pager.finish(page).map(Some),
            _ => {
                tracing::debug!(pager_id = %pager_id, "Discarding page of a superseded query");
                Ok(None)
            }
        }
    }

    /// Whether the current query may have more rows.
    pub fn has_more(&self) -> bool {
        self.pager.lock().as_ref().is_some_and(|p| p.state().has_more())
    }

    // ========== Structure ==========

    /// List databases.
    pub async fn list_databases(&self) -> Result<Vec<String>, PocketError> {
        SchemaService::list_databases(&mut self.core.lock().await.session).await
    }

    /// List tables of a database, sorted.
    pub async fn list_tables(&self, database: &str) -> Result<Vec<String>, PocketError> {
        SchemaService::list_tables(&mut self.core.lock().await.session, database).await
    }

    /// Column structure of a table.
    pub async fn describe_table(&self, database: &str, table: &str) -> Result<Vec<ColumnSpec>, PocketError> {
        SchemaService::describe_table(&mut self.core.lock().await.session, database, table).await
    }

    /// CREATE TABLE text of a table.
    pub async fn show_create_table(&self, database: &str, table: &str) -> Result<String, PocketError> {
        SchemaService::show_create_table(&mut self.core.lock().await.session, database, table).await
    }

    /// Collations the server supports.
    pub async fn list_collations(&self) -> Result<Vec<String>, PocketError> {
        SchemaService::list_collations(&mut self.core.lock().await.session).await
    }

    /// Select the default database of the session.
    pub async fn use_database(&self, database: &str) -> Result<(), PocketError> {
        self.run_statement(SqlCommandBuilder::use_database(database)).await.map(|_| ())
    }

    /// Create a table.
    pub async fn create_table(
        &self,
        database: &str,
        table: &str,
        columns: &[ColumnSpec],
        collation: Option<&str>,
    ) -> Result<(), PocketError> {
        let sql = SqlCommandBuilder::create_table(database, table, columns, collation)?;
        self.run_statement(sql).await.map(|_| ())
    }

    /// Drop a table.
    pub async fn drop_table(&self, database: &str, table: &str) -> Result<(), PocketError> {
        self.run_statement(SqlCommandBuilder::drop_table(database, table)).await.map(|_| ())
    }

    /// Remove every row of a table.
    pub async fn truncate_table(&self, database: &str, table: &str) -> Result<(), PocketError> {
        self.run_statement(SqlCommandBuilder::truncate_table(database, table)).await.map(|_| ())
    }

    /// Add a column.
    pub async fn add_column(
        &self,
        database: &str,
        table: &str,
        column: &ColumnSpec,
        collation: Option<&str>,
    ) -> Result<(), PocketError> {
        let sql = SqlCommandBuilder::add_column(database, table, column, collation)?;
        self.run_statement(sql).await.map(|_| ())
    }

    /// Change a column's definition.
    pub async fn modify_column(
        &self,
        database: &str,
        table: &str,
        column: &ColumnSpec,
        collation: Option<&str>,
    ) -> Result<(), PocketError> {
        let sql = SqlCommandBuilder::modify_column(database, table, column, collation)?;
        self.run_statement(sql).await.map(|_| ())
    }

    /// Drop a column.
    pub async fn drop_column(&self, database: &str, table: &str, column: &str) -> Result<(), PocketError> {
        self.run_statement(SqlCommandBuilder::drop_column(database, table, column)).await.map(|_| ())
    }

    /// Create a database.
    pub async fn create_database(&self, name: &str, collation: Option<&str>) -> Result<(), PocketError> {
        let sql = SqlCommandBuilder::create_database(name, collation)?;
        self.run_statement(sql).await.map(|_| ())
    }

    /// Drop a database.
    pub async fn drop_database(&self, name: &str) -> Result<(), PocketError> {
        self.run_statement(SqlCommandBuilder::drop_database(name)).await.map(|_| ())
    }

    async fn run_statement(&self, sql: String) -> Result<u64, PocketError> {
        let mut core = self.core.lock().await;
        core.session.execute(&sql).await
    }

    // ========== Row Editing ==========

    /// Insert one row.
    pub async fn insert_row(&self, database: &str, table: &str, fields: &FieldMap) -> Result<u64, PocketError> {
        TableEditor::insert_row(&mut self.core.lock().await.session, database, table, fields).await
    }

    /// Update the row identified by `key`.
    pub async fn update_row(
        &self,
        database: &str,
        table: &str,
        key: &RowKey,
        fields: &FieldMap,
    ) -> Result<u64, PocketError> {
        TableEditor::update_row(&mut self.core.lock().await.session, database, table, key, fields).await
    }

    /// Delete the row identified by `key`.
    pub async fn delete_row(&self, database: &str, table: &str, key: &RowKey) -> Result<u64, PocketError> {
        TableEditor::delete_row(&mut self.core.lock().await.session, database, table, key).await
    }

    /// Update row `row` of a browsed snapshot.
    ///
    /// Fails with [`PocketError::MissingPrimaryKey`] when the snapshot has no
    /// discovered key.
    pub async fn update_snapshot_row(
        &self,
        snapshot: &TabularSnapshot,
        row: usize,
        fields: &FieldMap,
    ) -> Result<u64, PocketError> {
        let key = RowKey::from_snapshot(snapshot, row)?;
        let (database, table) = snapshot_source(snapshot)?;
        self.update_row(database, table, &key, fields).await
    }

    /// Delete row `row` of a browsed snapshot.
    pub async fn delete_snapshot_row(&self, snapshot: &TabularSnapshot, row: usize) -> Result<u64, PocketError> {
        let key = RowKey::from_snapshot(snapshot, row)?;
        let (database, table) = snapshot_source(snapshot)?;
        self.delete_row(database, table, &key).await
    }
}

fn snapshot_source(snapshot: &TabularSnapshot) -> Result<(&str, &str), PocketError> {
    match (snapshot.database(), snapshot.table()) {
        (Some(database), Some(table)) => Ok((database, table)),
        _ => Err(PocketError::validation("Rows are not tied to a single table")),
    }
}

/// Application state: configuration, the session manager and a runtime.
pub struct PocketState {
    config: CoreConfig,
    data_dir: PathBuf,
    sessions: SessionManager,
    tokio_runtime: tokio::runtime::Runtime,
}

impl PocketState {
    /// Create state from the default data directory.
    pub fn new() -> Result<Self, PocketError> {
        Self::with_data_dir(config::default_data_dir())
    }

    /// Create state from a custom data directory, loading its config file.
    pub fn with_data_dir(data_dir: PathBuf) -> Result<Self, PocketError> {
        config::init_data_dir(&data_dir)?;
        let core_config = CoreConfig::load_from_dir(&data_dir)?;
        Self::with_config(data_dir, core_config)
    }

    /// Create state from an already loaded config.
    pub fn with_config(data_dir: PathBuf, core_config: CoreConfig) -> Result<Self, PocketError> {
        let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| PocketError::unknown(format!("Failed to create tokio runtime: {e}")))?;

        let sessions = SessionManager::new(core_config.options.clone());
        tracing::info!(data_dir = %data_dir.display(), "PocketState initialized");

        Ok(Self { config: core_config, data_dir, sessions, tokio_runtime })
    }

    /// Loaded configuration.
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The session manager. Clone it to move it into spawned tasks.
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Get a handle to the tokio runtime.
    pub fn runtime(&self) -> &tokio::runtime::Runtime {
        &self.tokio_runtime
    }

    /// Spawn a future on the runtime.
    pub fn spawn<F, T>(&self, future: F) -> tokio::task::JoinHandle<T>
    where
        F: std::future::Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.tokio_runtime.spawn(future)
    }

    /// Block on a future using the runtime. Never call from async code.
    pub fn block_on<F, T>(&self, future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        self.tokio_runtime.block_on(future)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_with_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let state = PocketState::with_data_dir(dir.path().to_path_buf()).unwrap();
        assert_eq!(state.config().options.page_size, 50);
        assert_eq!(state.data_dir(), dir.path());
        assert!(!state.block_on(state.sessions().is_connected()));
    }

    #[test]
    fn test_spawned_operation_runs() {
        let dir = tempfile::tempdir().unwrap();
        let state = PocketState::with_data_dir(dir.path().to_path_buf()).unwrap();
        let sessions = state.sessions().clone();

        let handle = state.spawn(async move { sessions.run_query("SELECT 1", QueryTarget::default()).await });
        let result = state.block_on(handle).unwrap();
        assert!(matches!(result, Err(PocketError::NotConnected)));
    }

    #[tokio::test]
    async fn test_operations_need_connection() {
        let manager = SessionManager::new(SessionOptions::default());
        assert!(matches!(manager.list_databases().await, Err(PocketError::NotConnected)));
        assert!(matches!(manager.drop_table("a", "b").await, Err(PocketError::NotConnected)));
        assert!(matches!(manager.load_more().await, Ok(None)));
        assert!(!manager.has_more());
        manager.disconnect().await;
    }

    #[tokio::test]
    async fn test_dropped_load_more_releases_claim() {
        let manager = SessionManager::new(SessionOptions::default());
        *manager.pager.lock() = ResultPager::for_query("SELECT * FROM t", QueryTarget::default(), 10);

        // Hold the session so the page fetch cannot start
        let core = manager.core.lock().await;
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(50), manager.load_more()).await;
        assert!(timed_out.is_err());
        drop(core);

        {
            let guard = manager.pager.lock();
            let pager = guard.as_ref().unwrap();
            assert!(!pager.state().is_loading());
            assert_eq!(pager.state().offset(), 0);
        }
        assert!(manager.has_more());
        // The claim is free again: the next attempt reaches the session
        assert!(matches!(manager.load_more().await, Err(PocketError::NotConnected)));
    }

    #[tokio::test]
    async fn test_blank_sql_rejected_before_connection_check() {
        let manager = SessionManager::new(SessionOptions::default());
        let err = manager.run_query("  ;  ", QueryTarget::default()).await.unwrap_err();
        assert!(matches!(err, PocketError::NoValidStatement));
    }

    #[tokio::test]
    async fn test_snapshot_edit_without_key_refused() {
        let manager = SessionManager::new(SessionOptions::default());
        let snapshot = TabularSnapshot::new(
            vec!["a".into()],
            vec![vec!["1".into()]],
            QueryTarget::table("shop", "log"),
            None,
        );
        let err = manager.delete_snapshot_row(&snapshot, 0).await.unwrap_err();
        assert!(matches!(err, PocketError::MissingPrimaryKey { .. }));
    }
}
