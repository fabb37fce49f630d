//! Data models for the serial registry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One serial number and the product pool it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialRecord {
    /// Insertion sequence, ascending in creation order
    pub id: u64,

    /// The serial number itself
    pub serial_number: String,

    /// Catalog product the serial is assigned to
    pub item_no: u64,

    /// Whether the serial has been allocated or claimed
    pub used: bool,

    /// When the record was inserted
    pub created_at: DateTime<Utc>,
}

impl SerialRecord {
    /// Create a new record
    pub fn new(id: u64, serial_number: String, item_no: u64, used: bool) -> Self {
        Self {
            id,
            serial_number,
            item_no,
            used,
            created_at: Utc::now(),
        }
    }
}

/// Result of claiming a serial number by value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// An existing, unused record was marked used
    Claimed(SerialRecord),

    /// The serial was unknown and has been created already used
    Created(SerialRecord),

    /// The serial exists and was already used; nothing changed
    AlreadyUsed(SerialRecord),
}
