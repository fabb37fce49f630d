//! Storage for published registration pages
//!
//! Redis data model:
//! - `page:seq` → page id counter
//! - `page:{id}` → JSON document of the page
//! - `page:serial:{serial}` → id of the newest page for a serial

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tagpage_common::{Error, Result};
use tokio::sync::Mutex;
use tracing::info;

/// Page template used when serving QR-code visits
pub const QR_TEMPLATE: &str = "qr-code-scan";

/// Visibility of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Published,
}

/// Metadata attached to generated pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub template: String,

    /// Created by this service rather than by a person
    pub generated: bool,

    /// Not editable from visual page editors
    pub locked: bool,

    /// User the registration was made for
    pub registered_user_id: u64,

    pub serial_number: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<u64>,
}

/// Page about to be stored
#[derive(Debug, Clone)]
pub struct NewPage {
    pub title: String,
    pub body: String,
    pub owner_user_id: u64,
    pub metadata: PageMetadata,
}

/// A stored, publicly visible page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPage {
    pub id: u64,
    pub title: String,
    pub body: String,
    pub owner_user_id: u64,
    pub status: PageStatus,
    pub metadata: PageMetadata,
    pub created_at: DateTime<Utc>,
}

impl PublishedPage {
    fn from_new(id: u64, page: NewPage) -> Self {
        Self {
            id,
            title: page.title,
            body: page.body,
            owner_user_id: page.owner_user_id,
            status: PageStatus::Published,
            metadata: page.metadata,
            created_at: Utc::now(),
        }
    }
}

/// Content page storage
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Store and publish a new page
    async fn create(&self, page: NewPage) -> Result<PublishedPage>;

    async fn get(&self, page_id: u64) -> Result<Option<PublishedPage>>;

    /// Newest page published for a serial number
    async fn latest_for_serial(&self, serial: &str) -> Result<Option<PublishedPage>>;
}

/// Redis-backed page storage
pub struct RedisPageStore {
    conn: ConnectionManager,
}

impl RedisPageStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn redis_err(err: redis::RedisError) -> Error {
    Error::Redis(err.to_string())
}

#[async_trait]
impl PageStore for RedisPageStore {
    async fn create(&self, page: NewPage) -> Result<PublishedPage> {
        let mut conn = self.conn.clone();

        let id: u64 = conn.incr("page:seq", 1).await.map_err(redis_err)?;
        let page = PublishedPage::from_new(id, page);
        let json = serde_json::to_string(&page)?;

        let _: () = redis::pipe()
            .atomic()
            .set(format!("page:{}", id), json)
            .ignore()
            .set(format!("page:serial:{}", page.metadata.serial_number), id)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;

        info!("Published page {} for serial {}", id, page.title);
        Ok(page)
    }

    async fn get(&self, page_id: u64) -> Result<Option<PublishedPage>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn
            .get(format!("page:{}", page_id))
            .await
            .map_err(redis_err)?;

        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn latest_for_serial(&self, serial: &str) -> Result<Option<PublishedPage>> {
        let mut conn = self.conn.clone();
        let page_id: Option<u64> = conn
            .get(format!("page:serial:{}", serial))
            .await
            .map_err(redis_err)?;

        match page_id {
            Some(id) => self.get(id).await,
            None => Ok(None),
        }
    }
}

/// In-process page storage for tests and local runs
#[derive(Default)]
pub struct MemoryPageStore {
    inner: Mutex<MemoryPages>,
}

#[derive(Default)]
struct MemoryPages {
    seq: u64,
    pages: HashMap<u64, PublishedPage>,
    by_serial: HashMap<String, u64>,
}

impl MemoryPageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pages stored so far
    pub async fn count(&self) -> usize {
        self.inner.lock().await.pages.len()
    }
}

#[async_trait]
impl PageStore for MemoryPageStore {
    async fn create(&self, page: NewPage) -> Result<PublishedPage> {
        let mut inner = self.inner.lock().await;
        inner.seq += 1;
        let page = PublishedPage::from_new(inner.seq, page);
        inner
            .by_serial
            .insert(page.metadata.serial_number.clone(), page.id);
        inner.pages.insert(page.id, page.clone());
        Ok(page)
    }

    async fn get(&self, page_id: u64) -> Result<Option<PublishedPage>> {
        Ok(self.inner.lock().await.pages.get(&page_id).cloned())
    }

    async fn latest_for_serial(&self, serial: &str) -> Result<Option<PublishedPage>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .by_serial
            .get(serial)
            .and_then(|id| inner.pages.get(id))
            .cloned())
    }
}
