//! In-memory doubles for the executor and tunnel seams.

use crate::error::{PocketError, TunnelStage};
use crate::models::{RawResultSet, TunnelSpec};
use crate::services::{StatementExecutor, TunnelProvider};
use crate::sql::BoundStatement;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// A scripted reply to one statement.
#[derive(Debug)]
pub enum Reply {
    Rows(RawResultSet),
    Affected(u64),
    Fail(PocketError),
}

/// Replies to statements by prefix; records every statement it sees.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Vec<(String, VecDeque<Reply>)>,
    pub log: Vec<String>,
    pub bound: Vec<BoundStatement>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next statement starting with `prefix`.
    pub fn on(mut self, prefix: &str, reply: Reply) -> Self {
        match self.rules.iter_mut().find(|(p, _)| p == prefix) {
            Some((_, replies)) => replies.push_back(reply),
            None => self.rules.push((prefix.to_string(), VecDeque::from([reply]))),
        }
        self
    }

    fn reply(&mut self, sql: &str) -> Reply {
        self.log.push(sql.to_string());
        self.rules
            .iter_mut()
            .filter(|(prefix, replies)| !replies.is_empty() && sql.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .and_then(|(_, replies)| replies.pop_front())
            .unwrap_or_else(|| Reply::Fail(PocketError::database(format!("unscripted: {sql}"), Some(1064))))
    }
}

#[async_trait]
impl StatementExecutor for ScriptedExecutor {
    async fn fetch(&mut self, sql: &str) -> Result<RawResultSet, PocketError> {
        match self.reply(sql) {
            Reply::Rows(rows) => Ok(rows),
            Reply::Affected(_) => Ok(RawResultSet::default()),
            Reply::Fail(e) => Err(e),
        }
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, PocketError> {
        match self.reply(sql) {
            Reply::Affected(n) => Ok(n),
            Reply::Rows(rows) => Ok(rows.rows.len() as u64),
            Reply::Fail(e) => Err(e),
        }
    }

    async fn execute_bound(&mut self, statement: &BoundStatement) -> Result<u64, PocketError> {
        self.bound.push(statement.clone());
        self.execute(&statement.sql).await
    }
}

/// Executor whose statements never complete.
pub struct StalledExecutor;

#[async_trait]
impl StatementExecutor for StalledExecutor {
    async fn fetch(&mut self, _sql: &str) -> Result<RawResultSet, PocketError> {
        std::future::pending().await
    }

    async fn execute(&mut self, _sql: &str) -> Result<u64, PocketError> {
        std::future::pending().await
    }

    async fn execute_bound(&mut self, _statement: &BoundStatement) -> Result<u64, PocketError> {
        std::future::pending().await
    }
}

/// Build a text result set from string slices; `None` cells are NULL.
pub fn rows(columns: &[&str], data: &[&[Option<&str>]]) -> RawResultSet {
    RawResultSet::new(
        columns.iter().map(|c| c.to_string()).collect(),
        data.iter().map(|r| r.iter().map(|c| c.map(String::from)).collect()).collect(),
    )
}

/// What happened to a [`FakeTunnel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelEvent {
    Open(u16),
    Close,
}

/// Shared view of a [`FakeTunnel`]'s history.
#[derive(Debug, Default)]
pub struct TunnelLog {
    pub events: Vec<TunnelEvent>,
    pub live: u32,
    pub max_live: u32,
}

/// Tunnel double that hands out a fixed local port.
///
/// `open` does not close a previous tunnel itself, so the caller's teardown
/// ordering is what keeps `max_live` at one.
pub struct FakeTunnel {
    port: u16,
    fail_with: Option<TunnelStage>,
    active: bool,
    pub log: Arc<Mutex<TunnelLog>>,
}

impl FakeTunnel {
    pub fn new(port: u16) -> Self {
        Self { port, fail_with: None, active: false, log: Arc::default() }
    }

    pub fn failing(stage: TunnelStage) -> Self {
        Self { fail_with: Some(stage), ..Self::new(0) }
    }
}

#[async_trait]
impl TunnelProvider for FakeTunnel {
    async fn open(&mut self, _spec: &TunnelSpec) -> Result<u16, PocketError> {
        if let Some(stage) = self.fail_with {
            return Err(PocketError::tunnel(stage, "scripted failure"));
        }
        let mut log = self.log.lock();
        log.events.push(TunnelEvent::Open(self.port));
        log.live += 1;
        log.max_live = log.max_live.max(log.live);
        self.active = true;
        Ok(self.port)
    }

    async fn close(&mut self) {
        let mut log = self.log.lock();
        log.events.push(TunnelEvent::Close);
        if self.active {
            log.live -= 1;
        }
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn local_port(&self) -> Option<u16> {
        self.active.then_some(self.port)
    }
}

/// A local port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}
