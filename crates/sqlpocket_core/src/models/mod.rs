//! Data models for the SQLPocket session layer.
//!
//! - `connection` - ConnectionProfile, ServerEndpoint, TunnelSpec, TunnelAuth, SslMode, SessionOptions
//! - `column` - ColumnSpec
//! - `snapshot` - TabularSnapshot, QueryOutcome, RawResultSet, QueryTarget
//! - `pagination` - PageState, PageRequest

pub mod column;
pub mod connection;
pub mod pagination;
pub mod snapshot;

pub use column::ColumnSpec;
pub use connection::{ConnectionProfile, ServerEndpoint, SessionOptions, SslMode, TunnelAuth, TunnelSpec};
pub use pagination::{PageRequest, PageState};
pub use snapshot::{QueryOutcome, QueryTarget, RawResultSet, TabularSnapshot, NULL_SENTINEL};
