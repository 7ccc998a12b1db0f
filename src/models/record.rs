// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Synced record model.
//!
//! A `SyncedRecord` is one local entity instance of any synchronized kind
//! (customer, invoice, ...). Remote bookkeeping lives in typed columns; the
//! entity's own data lives in `fields` and is interpreted by the entity's
//! adapter.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

/// Local entity row carrying remote-sync bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncedRecord {
    /// Local identifier (also used as document ID together with `entity`)
    pub local_id: String,
    pub user_id: String,
    /// Entity kind key, e.g. "customer"
    pub entity: String,
    /// Remote entity ID (None = never pushed)
    pub remote_id: Option<String>,
    /// Remote optimistic-concurrency token (QuickBooks `SyncToken`)
    pub version_token: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Local modification time
    pub updated_at: DateTime<Utc>,
    /// Entity-specific fields
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl SyncedRecord {
    /// New, never-synced local record.
    pub fn new(
        local_id: impl Into<String>,
        user_id: impl Into<String>,
        entity: impl Into<String>,
        fields: Map<String, Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            local_id: local_id.into(),
            user_id: user_id.into(),
            entity: entity.into(),
            remote_id: None,
            version_token: None,
            last_synced_at: None,
            created_at: now,
            updated_at: now,
            fields,
        }
    }

    /// Build a record from a typed entity value.
    pub fn from_typed<T: Serialize>(
        local_id: impl Into<String>,
        user_id: impl Into<String>,
        entity: impl Into<String>,
        value: &T,
    ) -> Result<Self, AppError> {
        Ok(Self::new(local_id, user_id, entity, to_fields(value)?))
    }

    pub fn is_synced(&self) -> bool {
        self.remote_id.is_some()
    }

    /// Never pushed, or locally modified since the last sync.
    pub fn needs_sync(&self) -> bool {
        match (&self.remote_id, self.last_synced_at) {
            (Some(_), Some(synced)) => self.updated_at > synced,
            _ => true,
        }
    }

    /// Not synced within `max_age` of `now` (never synced counts as stale).
    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        match self.last_synced_at {
            Some(synced) => synced < now - max_age,
            None => true,
        }
    }

    /// Interpret `fields` as a typed entity.
    pub fn typed<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        serde_json::from_value(Value::Object(self.fields.clone())).map_err(|e| {
            AppError::BadRequest(format!(
                "Record {} is not a valid {}: {}",
                self.local_id, self.entity, e
            ))
        })
    }

    /// Replace `fields` with a typed entity and mark the record modified.
    pub fn set_typed<T: Serialize>(&mut self, value: &T) -> Result<(), AppError> {
        self.fields = to_fields(value)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Merge fields mapped from a remote entity. Keys absent from `partial`
    /// keep their local value.
    pub fn apply_remote(&mut self, partial: Map<String, Value>) {
        for (key, value) in partial {
            self.fields.insert(key, value);
        }
    }

    /// Record a successful push or pull.
    pub fn mark_synced(&mut self, remote_id: String, version_token: Option<String>, now: DateTime<Utc>) {
        self.remote_id = Some(remote_id);
        self.version_token = version_token;
        self.last_synced_at = Some(now);
        if self.updated_at > now {
            self.updated_at = now;
        }
    }

    /// Forget the remote side after a remote deletion.
    pub fn clear_remote(&mut self, now: DateTime<Utc>) {
        self.remote_id = None;
        self.version_token = None;
        self.last_synced_at = Some(now);
    }
}

fn to_fields<T: Serialize>(value: &T) -> Result<Map<String, Value>, AppError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::BadRequest(
            "Entity must serialize to an object".to_string(),
        )),
        Err(e) => Err(AppError::Internal(anyhow::anyhow!(
            "Failed to serialize entity: {}",
            e
        ))),
    }
}
