//! Pure SQL text handling.
//!
//! - `builder` - DDL/DML/introspection statement builders
//! - `pagination` - LIMIT/OFFSET injection
//! - `statements` - batch splitting and statement classification

pub mod builder;
pub mod pagination;
pub mod statements;

pub use builder::{BoundStatement, FieldMap, SqlCommandBuilder};
pub use pagination::PaginationRewriter;
pub use statements::{classify_statement, is_pageable, split_statements, StatementKind};
