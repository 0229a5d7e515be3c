//! Services that talk to the SQL server.
//!
//! - `executor` - the StatementExecutor seam
//! - `tunnel` - SSH local port forwarding
//! - `session` - the live MySQL connection
//! - `router` - batch splitting and per-statement routing
//! - `materializer` - snapshot building and primary key discovery
//! - `pager` - incremental SELECT loading
//! - `schema` - introspection
//! - `editor` - row-level inserts, updates and deletes

pub mod editor;
pub mod executor;
pub mod materializer;
pub mod pager;
pub mod router;
pub mod schema;
pub mod session;
pub mod tunnel;

pub use editor::{RowKey, TableEditor};
pub use executor::StatementExecutor;
pub use materializer::ResultMaterializer;
pub use pager::ResultPager;
pub use router::QueryRouter;
pub use schema::SchemaService;
pub use session::SqlSession;
pub use tunnel::{SecureTunnel, TunnelProvider};
