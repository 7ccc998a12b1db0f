// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process storage backend.
//!
//! Used for tests and `QBO_STORAGE=memory`. Data is lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::db::{record_doc_id, CredentialRepository, OAuthStateRepository, RecordRepository};
use crate::error::AppError;
use crate::models::{CredentialRow, OAuthState, SyncedRecord};

/// DashMap-backed implementation of every repository trait.
#[derive(Clone, Default)]
pub struct MemoryDb {
    credentials: Arc<DashMap<String, CredentialRow>>,
    /// Serializes multi-row credential writes (deactivate-then-insert).
    credential_writes: Arc<Mutex<()>>,
    states: Arc<DashMap<String, OAuthState>>,
    records: Arc<DashMap<String, SyncedRecord>>,
    /// Serializes record writes so the remote-id uniqueness check holds.
    record_writes: Arc<Mutex<()>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn active_ids_for(&self, user_id: &str) -> Vec<String> {
        self.credentials
            .iter()
            .filter(|entry| entry.user_id == user_id && entry.active)
            .map(|entry| entry.key().clone())
            .collect()
    }
}

#[async_trait]
impl CredentialRepository for MemoryDb {
    async fn activate_exclusive(&self, row: &CredentialRow) -> Result<(), AppError> {
        let _guard = self.credential_writes.lock().await;

        for id in self.active_ids_for(&row.user_id) {
            if let Some(mut existing) = self.credentials.get_mut(&id) {
                existing.active = false;
                existing.updated_at = row.updated_at;
            }
        }

        let mut row = row.clone();
        row.active = true;
        self.credentials.insert(row.id.clone(), row);
        Ok(())
    }

    async fn latest_active(&self, user_id: &str) -> Result<Option<CredentialRow>, AppError> {
        Ok(self
            .credentials
            .iter()
            .filter(|entry| entry.user_id == user_id && entry.active)
            .max_by_key(|entry| entry.created_at)
            .map(|entry| entry.value().clone()))
    }

    async fn get_credential(&self, id: &str) -> Result<Option<CredentialRow>, AppError> {
        Ok(self.credentials.get(id).map(|entry| entry.value().clone()))
    }

    async fn save_credential(&self, row: &CredentialRow) -> Result<(), AppError> {
        let _guard = self.credential_writes.lock().await;
        self.credentials.insert(row.id.clone(), row.clone());
        Ok(())
    }

    async fn save_if_active(&self, row: &CredentialRow) -> Result<bool, AppError> {
        let _guard = self.credential_writes.lock().await;
        let still_active = self
            .credentials
            .get(&row.id)
            .is_some_and(|existing| existing.active);
        if still_active {
            self.credentials.insert(row.id.clone(), row.clone());
        }
        Ok(still_active)
    }

    async fn deactivate(&self, id: &str) -> Result<(), AppError> {
        let _guard = self.credential_writes.lock().await;
        if let Some(mut existing) = self.credentials.get_mut(id) {
            existing.active = false;
            existing.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn deactivate_all(&self, user_id: &str) -> Result<usize, AppError> {
        let _guard = self.credential_writes.lock().await;
        let ids = self.active_ids_for(user_id);
        let now = Utc::now();
        for id in &ids {
            if let Some(mut existing) = self.credentials.get_mut(id) {
                existing.active = false;
                existing.updated_at = now;
            }
        }
        Ok(ids.len())
    }

    async fn count_active(&self, user_id: &str) -> Result<usize, AppError> {
        Ok(self.active_ids_for(user_id).len())
    }
}

#[async_trait]
impl OAuthStateRepository for MemoryDb {
    async fn insert_state(&self, state: &OAuthState) -> Result<(), AppError> {
        self.states.insert(state.state_hash.clone(), state.clone());
        Ok(())
    }

    async fn delete_states_for_user(&self, user_id: &str) -> Result<usize, AppError> {
        let before = self.states.len();
        self.states.retain(|_, state| state.user_id != user_id);
        Ok(before.saturating_sub(self.states.len()))
    }

    async fn find_state(&self, state_hash: &str) -> Result<Option<OAuthState>, AppError> {
        Ok(self.states.get(state_hash).map(|entry| entry.value().clone()))
    }

    async fn take_state(&self, state_hash: &str) -> Result<Option<OAuthState>, AppError> {
        Ok(self.states.remove(state_hash).map(|(_, state)| state))
    }

    async fn delete_expired_states(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let before = self.states.len();
        self.states.retain(|_, state| state.expires_at >= now);
        Ok(before.saturating_sub(self.states.len()))
    }
}

#[async_trait]
impl RecordRepository for MemoryDb {
    async fn get_record(
        &self,
        entity: &str,
        local_id: &str,
    ) -> Result<Option<SyncedRecord>, AppError> {
        Ok(self
            .records
            .get(&record_doc_id(entity, local_id))
            .map(|entry| entry.value().clone()))
    }

    async fn find_by_remote_id(
        &self,
        user_id: &str,
        entity: &str,
        remote_id: &str,
    ) -> Result<Option<SyncedRecord>, AppError> {
        Ok(self
            .records
            .iter()
            .find(|entry| {
                entry.user_id == user_id
                    && entry.entity == entity
                    && entry.remote_id.as_deref() == Some(remote_id)
            })
            .map(|entry| entry.value().clone()))
    }

    async fn list_records(
        &self,
        user_id: &str,
        entity: &str,
    ) -> Result<Vec<SyncedRecord>, AppError> {
        let mut records: Vec<SyncedRecord> = self
            .records
            .iter()
            .filter(|entry| entry.user_id == user_id && entry.entity == entity)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    async fn save_record(&self, record: &SyncedRecord) -> Result<(), AppError> {
        let _guard = self.record_writes.lock().await;
        let doc_id = record_doc_id(&record.entity, &record.local_id);

        if let Some(remote_id) = record.remote_id.as_deref() {
            let clash = self.records.iter().any(|entry| {
                entry.key() != &doc_id
                    && entry.user_id == record.user_id
                    && entry.entity == record.entity
                    && entry.remote_id.as_deref() == Some(remote_id)
            });
            if clash {
                return Err(AppError::Conflict(format!(
                    "{} with remote id {} already linked to another record",
                    record.entity, remote_id
                )));
            }
        }

        self.records.insert(doc_id, record.clone());
        Ok(())
    }

    async fn delete_record(&self, entity: &str, local_id: &str) -> Result<bool, AppError> {
        Ok(self
            .records
            .remove(&record_doc_id(entity, local_id))
            .is_some())
    }
}
