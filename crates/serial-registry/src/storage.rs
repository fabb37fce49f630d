//! Storage for the serial registry
//!
//! Redis layout:
//! - `serials:seq` → insertion counter
//! - `serial:{serial_number}` → hash with `id`, `serial_number`, `item_no`, `used`, `created_at`
//! - `serials:unused:{item_no}` → sorted set of unused serials, scored by `id`
//! - `serials:products` → set of product ids that own at least one serial
//!
//! Every operation that reads and then writes runs as a single Lua script,
//! so concurrent callers can never claim the same serial twice.

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tagpage_common::{Error, Result};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::{ClaimOutcome, SerialRecord};

const SEQ_KEY: &str = "serials:seq";
const PRODUCTS_KEY: &str = "serials:products";

/// Prefix of record hashes; only record keys live under it
const SERIAL_PREFIX: &str = "serial:";

fn serial_key(serial: &str) -> String {
    format!("{}{}", SERIAL_PREFIX, serial)
}

fn unused_key(product_id: u64) -> String {
    format!("serials:unused:{}", product_id)
}

fn redis_err(err: redis::RedisError) -> Error {
    Error::Redis(err.to_string())
}

/// Registry of serial numbers
#[async_trait]
pub trait SerialStore: Send + Sync {
    /// Look up a serial by value
    async fn find_by_serial(&self, serial: &str) -> Result<Option<SerialRecord>>;

    /// Oldest unused serial of a product, without claiming it
    async fn find_next_unused(&self, product_id: u64) -> Result<Option<SerialRecord>>;

    /// Insert a new serial; `DuplicateSerial` if it already exists
    async fn insert(&self, serial: &str, product_id: u64, used: bool) -> Result<SerialRecord>;

    /// Mark a serial used; a no-op when it already is
    async fn mark_used(&self, serial: &str) -> Result<()>;

    /// Atomically take the oldest unused serial of a product
    async fn claim_next_unused(&self, product_id: u64) -> Result<Option<SerialRecord>>;

    /// Atomically claim a serial by value, creating it (used) when unknown
    async fn claim(&self, serial: &str, product_id: u64) -> Result<ClaimOutcome>;

    /// Product ids that own at least one serial, ascending
    async fn list_products(&self) -> Result<Vec<u64>>;

    /// Verify the backend is reachable
    async fn health_check(&self) -> Result<()>;
}

const INSERT_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
local id = redis.call('INCR', KEYS[2])
redis.call('HSET', KEYS[1], 'id', id, 'serial_number', ARGV[1], 'item_no', ARGV[2], 'used', ARGV[3], 'created_at', ARGV[4])
if ARGV[3] == '0' then
  redis.call('ZADD', KEYS[3], id, ARGV[1])
end
redis.call('SADD', KEYS[4], ARGV[2])
return id
"#;

const MARK_USED_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return -1
end
if redis.call('HGET', KEYS[1], 'used') == '1' then
  return 0
end
redis.call('HSET', KEYS[1], 'used', '1')
local item_no = redis.call('HGET', KEYS[1], 'item_no')
redis.call('ZREM', 'serials:unused:' .. item_no, ARGV[1])
return 1
"#;

const CLAIM_NEXT_SCRIPT: &str = r#"
local popped = redis.call('ZPOPMIN', KEYS[1])
if #popped == 0 then
  return false
end
redis.call('HSET', ARGV[1] .. popped[1], 'used', '1')
return popped[1]
"#;

const CLAIM_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  if redis.call('HGET', KEYS[1], 'used') == '1' then
    return 'already_used'
  end
  redis.call('HSET', KEYS[1], 'used', '1')
  local item_no = redis.call('HGET', KEYS[1], 'item_no')
  redis.call('ZREM', 'serials:unused:' .. item_no, ARGV[1])
  return 'claimed'
end
local id = redis.call('INCR', KEYS[2])
redis.call('HSET', KEYS[1], 'id', id, 'serial_number', ARGV[1], 'item_no', ARGV[2], 'used', '1', 'created_at', ARGV[3])
redis.call('SADD', KEYS[3], ARGV[2])
return 'created'
"#;

/// Redis-backed serial registry
pub struct RedisSerialStore {
    conn: ConnectionManager,
    insert_script: Script,
    mark_used_script: Script,
    claim_next_script: Script,
    claim_script: Script,
}

impl RedisSerialStore {
    /// Create a new storage instance
    pub async fn new(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        info!("Connected to Redis at {}", redis_url);

        Ok(Self::with_connection(conn))
    }

    /// Create a storage instance on an existing connection
    pub fn with_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            insert_script: Script::new(INSERT_SCRIPT),
            mark_used_script: Script::new(MARK_USED_SCRIPT),
            claim_next_script: Script::new(CLAIM_NEXT_SCRIPT),
            claim_script: Script::new(CLAIM_SCRIPT),
        }
    }

    fn parse_record(fields: &HashMap<String, String>) -> Result<SerialRecord> {
        let field = |name: &str| {
            fields
                .get(name)
                .ok_or_else(|| Error::Redis(format!("serial record is missing field {}", name)))
        };

        let parse_u64 = |name: &str| -> Result<u64> {
            field(name)?
                .parse()
                .map_err(|_| Error::Redis(format!("serial record has invalid {}", name)))
        };

        Ok(SerialRecord {
            id: parse_u64("id")?,
            serial_number: field("serial_number")?.clone(),
            item_no: parse_u64("item_no")?,
            used: field("used")? == "1",
            created_at: fields
                .get("created_at")
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now),
        })
    }

    async fn fetch(&self, serial: &str) -> Result<SerialRecord> {
        self.find_by_serial(serial)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Serial number {}", serial)))
    }
}

#[async_trait]
impl SerialStore for RedisSerialStore {
    async fn find_by_serial(&self, serial: &str) -> Result<Option<SerialRecord>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> =
            conn.hgetall(serial_key(serial)).await.map_err(redis_err)?;

        if fields.is_empty() {
            return Ok(None);
        }

        Self::parse_record(&fields).map(Some)
    }

    async fn find_next_unused(&self, product_id: u64) -> Result<Option<SerialRecord>> {
        let mut conn = self.conn.clone();
        let oldest: Vec<String> = conn
            .zrange(unused_key(product_id), 0, 0)
            .await
            .map_err(redis_err)?;

        match oldest.first() {
            Some(serial) => self.find_by_serial(serial).await,
            None => Ok(None),
        }
    }

    async fn insert(&self, serial: &str, product_id: u64, used: bool) -> Result<SerialRecord> {
        let mut conn = self.conn.clone();
        let created_at = Utc::now();

        let id: u64 = self
            .insert_script
            .key(serial_key(serial))
            .key(SEQ_KEY)
            .key(unused_key(product_id))
            .key(PRODUCTS_KEY)
            .arg(serial)
            .arg(product_id)
            .arg(if used { "1" } else { "0" })
            .arg(created_at.to_rfc3339())
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err)?;

        if id == 0 {
            debug!("Serial {} already exists", serial);
            return Err(Error::DuplicateSerial(serial.to_string()));
        }

        info!("Inserted serial {} for product {} (used={})", serial, product_id, used);

        Ok(SerialRecord {
            id,
            serial_number: serial.to_string(),
            item_no: product_id,
            used,
            created_at,
        })
    }

    async fn mark_used(&self, serial: &str) -> Result<()> {
        let mut conn = self.conn.clone();

        let status: i64 = self
            .mark_used_script
            .key(serial_key(serial))
            .arg(serial)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err)?;

        match status {
            -1 => {
                warn!("Cannot mark nonexistent serial as used: {}", serial);
                Err(Error::NotFound(format!("Serial number {}", serial)))
            }
            0 => {
                debug!("Serial {} already marked as used", serial);
                Ok(())
            }
            _ => {
                info!("Marked serial as used: {}", serial);
                Ok(())
            }
        }
    }

    async fn claim_next_unused(&self, product_id: u64) -> Result<Option<SerialRecord>> {
        let mut conn = self.conn.clone();

        let claimed: Option<String> = self
            .claim_next_script
            .key(unused_key(product_id))
            .arg(SERIAL_PREFIX)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err)?;

        match claimed {
            Some(serial) => {
                info!("Allocated serial {} for product {}", serial, product_id);
                self.fetch(&serial).await.map(Some)
            }
            None => {
                debug!("No unused serial left for product {}", product_id);
                Ok(None)
            }
        }
    }

    async fn claim(&self, serial: &str, product_id: u64) -> Result<ClaimOutcome> {
        let mut conn = self.conn.clone();

        let status: String = self
            .claim_script
            .key(serial_key(serial))
            .key(SEQ_KEY)
            .key(PRODUCTS_KEY)
            .arg(serial)
            .arg(product_id)
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err)?;

        let record = self.fetch(serial).await?;

        match status.as_str() {
            "already_used" => Ok(ClaimOutcome::AlreadyUsed(record)),
            "claimed" => {
                info!("Claimed serial {}", serial);
                Ok(ClaimOutcome::Claimed(record))
            }
            "created" => {
                info!("Created claimed serial {} for product {}", serial, product_id);
                Ok(ClaimOutcome::Created(record))
            }
            other => Err(Error::Redis(format!("unexpected claim status: {}", other))),
        }
    }

    async fn list_products(&self) -> Result<Vec<u64>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(PRODUCTS_KEY).await.map_err(redis_err)?;

        let mut products: Vec<u64> = members.iter().filter_map(|m| m.parse().ok()).collect();
        products.sort_unstable();
        Ok(products)
    }

    async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(())
    }
}

/// In-process serial registry, used by tests and single-node development runs
#[derive(Default)]
pub struct MemorySerialStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    seq: u64,
    records: HashMap<String, SerialRecord>,
}

impl MemoryInner {
    fn push(&mut self, serial: &str, product_id: u64, used: bool) -> SerialRecord {
        self.seq += 1;
        let record = SerialRecord::new(self.seq, serial.to_string(), product_id, used);
        self.records.insert(serial.to_string(), record.clone());
        record
    }

    fn oldest_unused(&self, product_id: u64) -> Option<&SerialRecord> {
        self.records
            .values()
            .filter(|r| r.item_no == product_id && !r.used)
            .min_by_key(|r| r.id)
    }
}

impl MemorySerialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SerialStore for MemorySerialStore {
    async fn find_by_serial(&self, serial: &str) -> Result<Option<SerialRecord>> {
        Ok(self.inner.lock().await.records.get(serial).cloned())
    }

    async fn find_next_unused(&self, product_id: u64) -> Result<Option<SerialRecord>> {
        Ok(self.inner.lock().await.oldest_unused(product_id).cloned())
    }

    async fn insert(&self, serial: &str, product_id: u64, used: bool) -> Result<SerialRecord> {
        let mut inner = self.inner.lock().await;
        if inner.records.contains_key(serial) {
            return Err(Error::DuplicateSerial(serial.to_string()));
        }
        Ok(inner.push(serial, product_id, used))
    }

    async fn mark_used(&self, serial: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.records.get_mut(serial) {
            Some(record) => {
                record.used = true;
                Ok(())
            }
            None => Err(Error::NotFound(format!("Serial number {}", serial))),
        }
    }

    async fn claim_next_unused(&self, product_id: u64) -> Result<Option<SerialRecord>> {
        let mut inner = self.inner.lock().await;
        let Some(serial) = inner
            .oldest_unused(product_id)
            .map(|r| r.serial_number.clone())
        else {
            return Ok(None);
        };

        let record = inner
            .records
            .get_mut(&serial)
            .ok_or_else(|| Error::NotFound(format!("Serial number {}", serial)))?;
        record.used = true;
        Ok(Some(record.clone()))
    }

    async fn claim(&self, serial: &str, product_id: u64) -> Result<ClaimOutcome> {
        let mut inner = self.inner.lock().await;
        if let Some(record) = inner.records.get_mut(serial) {
            if record.used {
                return Ok(ClaimOutcome::AlreadyUsed(record.clone()));
            }
            record.used = true;
            return Ok(ClaimOutcome::Claimed(record.clone()));
        }
        Ok(ClaimOutcome::Created(inner.push(serial, product_id, true)))
    }

    async fn list_products(&self) -> Result<Vec<u64>> {
        let inner = self.inner.lock().await;
        let mut products: Vec<u64> = inner.records.values().map(|r| r.item_no).collect();
        products.sort_unstable();
        products.dedup();
        Ok(products)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
