//! One-shot notices shown to a user on their next page view
//!
//! Redis data model:
//! - `notice:{user_id}` → JSON notice, expiring after `NOTICE_TTL_SECS`

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tagpage_common::{Error, Result};
use tokio::sync::Mutex;

/// How long an unread notice is kept
pub const NOTICE_TTL_SECS: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub message: String,
    pub kind: NoticeKind,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: NoticeKind::Success,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: NoticeKind::Error,
        }
    }
}

/// Per-user notice slot; a new notice replaces an unread one
#[async_trait]
pub trait NoticeStore: Send + Sync {
    async fn push(&self, user_id: u64, notice: Notice) -> Result<()>;

    /// Remove and return the pending notice
    async fn take(&self, user_id: u64) -> Result<Option<Notice>>;
}

/// Redis-backed notices
pub struct RedisNoticeStore {
    conn: ConnectionManager,
}

impl RedisNoticeStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl NoticeStore for RedisNoticeStore {
    async fn push(&self, user_id: u64, notice: Notice) -> Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(&notice)?;

        let _: () = redis::cmd("SET")
            .arg(format!("notice:{}", user_id))
            .arg(json)
            .arg("EX")
            .arg(NOTICE_TTL_SECS)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        Ok(())
    }

    async fn take(&self, user_id: u64) -> Result<Option<Notice>> {
        let mut conn = self.conn.clone();

        let json: Option<String> = redis::cmd("GETDEL")
            .arg(format!("notice:{}", user_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;

        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }
}

/// In-process notices for tests and local runs
#[derive(Default)]
pub struct MemoryNoticeStore {
    notices: Mutex<HashMap<u64, Notice>>,
}

impl MemoryNoticeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look at the pending notice without consuming it
    pub async fn peek(&self, user_id: u64) -> Option<Notice> {
        self.notices.lock().await.get(&user_id).cloned()
    }
}

#[async_trait]
impl NoticeStore for MemoryNoticeStore {
    async fn push(&self, user_id: u64, notice: Notice) -> Result<()> {
        self.notices.lock().await.insert(user_id, notice);
        Ok(())
    }

    async fn take(&self, user_id: u64) -> Result<Option<Notice>> {
        Ok(self.notices.lock().await.remove(&user_id))
    }
}
