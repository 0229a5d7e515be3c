//! Core session layer for the SQLPocket MySQL client.
//!
//! This crate provides everything below the UI:
//!
//! - **classify**: Error pattern tables and user-facing messages
//! - **config**: Configuration file and data directory
//! - **error**: Error taxonomy
//! - **logging**: Structured logging setup
//! - **models**: Endpoints, tunnels, snapshots and pagination state
//! - **services**: Tunnel, session, routing, materialization, schema, editing
//! - **sql**: Statement building, splitting and pagination rewriting
//! - **state**: Session manager and application state

pub mod classify;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod sql;
pub mod state;

#[cfg(test)]
mod test_support;

pub use classify::ErrorClass;
pub use config::CoreConfig;
pub use error::{ErrorInfo, ErrorKind, PocketError, TunnelStage};
pub use models::{
    ColumnSpec, ConnectionProfile, PageRequest, PageState, QueryOutcome, QueryTarget, RawResultSet,
    ServerEndpoint, SessionOptions, SslMode, TabularSnapshot, TunnelAuth, TunnelSpec, NULL_SENTINEL,
};
pub use services::{
    QueryRouter, ResultMaterializer, ResultPager, RowKey, SchemaService, SecureTunnel, SqlSession, StatementExecutor,
    TableEditor, TunnelProvider,
};
pub use sql::{PaginationRewriter, SqlCommandBuilder};
pub use state::{PocketState, SessionManager};
