// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Generic bidirectional entity synchronization.
//!
//! The engine knows nothing about specific entity kinds. Each kind supplies
//! an `EntityAdapter` that maps between local record fields and the remote
//! payload; adapters are looked up by kind in an `AdapterRegistry` built at
//! startup and handed to the engine per call.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::RecordRepository;
use crate::error::{AppError, ErrorPolicy, RemoteServiceError};
use crate::ids::new_row_id;
use crate::models::SyncedRecord;
use crate::services::adapters::{CustomerAdapter, InvoiceAdapter};
use crate::services::gate::{AccessGate, Outcome};
use crate::services::qbo::{AccountingApi, ApiSession, RemoteEntity};

/// A reference from one entity kind to another, resolved on pull.
#[derive(Debug, Clone, Copy)]
pub struct EntityLink {
    /// Field holding the linked entity's remote id
    pub remote_field: &'static str,
    /// Kind of the linked entity
    pub entity: &'static str,
    /// Field to receive the linked entity's local id
    pub local_field: &'static str,
}

/// Per-kind mapping between local fields and the remote representation.
pub trait EntityAdapter: Send + Sync {
    /// Local kind key, e.g. "customer".
    fn entity(&self) -> &'static str;

    /// Remote type name, e.g. "Customer".
    fn remote_type_name(&self) -> &'static str;

    /// Remote payload for create/update. Must not include `Id`/`SyncToken`.
    fn to_remote_payload(&self, record: &SyncedRecord) -> Result<Map<String, Value>, AppError>;

    /// Local fields to merge from a remote entity.
    fn from_remote_payload(&self, remote: &RemoteEntity) -> Result<Map<String, Value>, AppError>;

    fn links(&self) -> &'static [EntityLink] {
        &[]
    }
}

/// Lookup table of adapters keyed by entity kind.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<&'static str, Arc<dyn EntityAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every adapter shipped in this crate.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CustomerAdapter));
        registry.register(Arc::new(InvoiceAdapter));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn EntityAdapter>) {
        self.adapters.insert(adapter.entity(), adapter);
    }

    pub fn get(&self, entity: &str) -> Result<Arc<dyn EntityAdapter>, AppError> {
        self.adapters
            .get(entity)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Unknown entity type: {}", entity)))
    }

    pub fn entities(&self) -> Vec<&'static str> {
        let mut entities: Vec<_> = self.adapters.keys().copied().collect();
        entities.sort_unstable();
        entities
    }
}

/// Outcome of pushing every pending record of one kind.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub pushed: Vec<String>,
    pub failed: Vec<SyncFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncFailure {
    pub local_id: String,
    /// User-facing message (raw provider text only with detailed errors on)
    pub message: String,
}

/// Moves records between local storage and the accounting API.
#[derive(Clone)]
pub struct SyncEngine {
    api: Arc<dyn AccountingApi>,
    records: Arc<dyn RecordRepository>,
    gate: AccessGate,
    policy: ErrorPolicy,
}

impl SyncEngine {
    pub fn new(
        api: Arc<dyn AccountingApi>,
        records: Arc<dyn RecordRepository>,
        gate: AccessGate,
        policy: ErrorPolicy,
    ) -> Self {
        Self {
            api,
            records,
            gate,
            policy,
        }
    }

    pub fn records(&self) -> &Arc<dyn RecordRepository> {
        &self.records
    }

    /// API session for the user, via the access gate.
    async fn session_for(&self, user_id: &str) -> Result<ApiSession, AppError> {
        match self.gate.resolve(user_id).await? {
            Outcome::Usable(credential) => Ok(ApiSession::from(&credential)),
            Outcome::NeedsConnection(reason) => Err(AppError::NotConnected(reason)),
        }
    }

    fn check_kind(adapter: &dyn EntityAdapter, record: &SyncedRecord) -> Result<(), AppError> {
        if record.entity != adapter.entity() {
            return Err(AppError::BadRequest(format!(
                "Record {} is a {}, not a {}",
                record.local_id,
                record.entity,
                adapter.entity()
            )));
        }
        Ok(())
    }

    /// Create or update the remote entity for `record`.
    ///
    /// An existing remote entity is re-read first so the update carries its
    /// latest version token. If it has disappeared remotely, it is created
    /// again.
    pub async fn push(
        &self,
        adapter: &dyn EntityAdapter,
        mut record: SyncedRecord,
    ) -> Result<SyncedRecord, AppError> {
        Self::check_kind(adapter, &record)?;
        let payload = adapter.to_remote_payload(&record)?;
        let session = self.session_for(&record.user_id).await?;
        let type_name = adapter.remote_type_name();

        let remote = match record.remote_id.clone() {
            None => self.api.create_entity(&session, type_name, &payload).await?,
            Some(remote_id) => {
                match self.api.fetch_entity(&session, type_name, &remote_id).await? {
                    Some(current) => {
                        let version = current
                            .version_token
                            .or_else(|| record.version_token.clone())
                            .ok_or_else(|| {
                                RemoteServiceError::new(
                                    None,
                                    None,
                                    format!("{} {} has no SyncToken", type_name, remote_id),
                                )
                            })?;
                        self.api
                            .update_entity(&session, type_name, &remote_id, &payload, &version)
                            .await?
                    }
                    None => {
                        tracing::warn!(
                            entity = adapter.entity(),
                            remote_id = %remote_id,
                            "Remote entity missing, recreating"
                        );
                        self.api.create_entity(&session, type_name, &payload).await?
                    }
                }
            }
        };

        record.mark_synced(remote.id, remote.version_token, Utc::now());
        self.records.save_record(&record).await?;

        tracing::info!(
            user_id = %record.user_id,
            entity = adapter.entity(),
            local_id = %record.local_id,
            remote_id = ?record.remote_id,
            "Record pushed"
        );
        Ok(record)
    }

    /// Pull remote entities of the adapter's kind into local records.
    /// Returns the number of records created or updated.
    pub async fn pull(
        &self,
        adapter: &dyn EntityAdapter,
        user_id: &str,
        remote_id: Option<&str>,
    ) -> Result<usize, AppError> {
        if let Some(id) = remote_id {
            if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
                return Err(AppError::BadRequest(format!("Invalid remote id: {}", id)));
            }
        }
        let session = self.session_for(user_id).await?;
        let filter = remote_id.map(|id| format!("Id = '{}'", id));
        let remotes = self
            .api
            .query_entities(&session, adapter.remote_type_name(), filter.as_deref())
            .await?;

        let mut count = 0;
        for remote in remotes {
            self.apply_remote(adapter, user_id, remote).await?;
            count += 1;
        }

        tracing::info!(user_id, entity = adapter.entity(), count, "Pull complete");
        Ok(count)
    }

    /// Materialize or update one local record from a remote entity.
    async fn apply_remote(
        &self,
        adapter: &dyn EntityAdapter,
        user_id: &str,
        remote: RemoteEntity,
    ) -> Result<SyncedRecord, AppError> {
        let mut record = match self
            .records
            .find_by_remote_id(user_id, adapter.entity(), &remote.id)
            .await?
        {
            Some(existing) => existing,
            None => SyncedRecord::new(new_row_id()?, user_id, adapter.entity(), Map::new()),
        };

        let mut fields = adapter.from_remote_payload(&remote)?;
        for link in adapter.links() {
            let Some(linked_remote) = fields.get(link.remote_field).and_then(Value::as_str) else {
                continue;
            };
            if let Some(linked) = self
                .records
                .find_by_remote_id(user_id, link.entity, linked_remote)
                .await?
            {
                fields.insert(link.local_field.to_string(), Value::String(linked.local_id));
            }
        }

        let now = Utc::now();
        record.apply_remote(fields);
        record.updated_at = now;
        record.mark_synced(remote.id, remote.version_token, now);
        self.records.save_record(&record).await?;
        Ok(record)
    }

    /// Delete the remote entity and forget the link. A record that was never
    /// pushed succeeds without any remote call; an entity already gone
    /// remotely counts as deleted.
    pub async fn remote_delete(
        &self,
        adapter: &dyn EntityAdapter,
        record: &mut SyncedRecord,
    ) -> Result<bool, AppError> {
        Self::check_kind(adapter, record)?;
        let Some(remote_id) = record.remote_id.clone() else {
            return Ok(true);
        };

        let session = self.session_for(&record.user_id).await?;
        let type_name = adapter.remote_type_name();

        match self.api.fetch_entity(&session, type_name, &remote_id).await? {
            Some(current) => {
                let version = current
                    .version_token
                    .or_else(|| record.version_token.clone())
                    .ok_or_else(|| {
                        RemoteServiceError::new(
                            None,
                            None,
                            format!("{} {} has no SyncToken", type_name, remote_id),
                        )
                    })?;
                match self
                    .api
                    .delete_entity(&session, type_name, &remote_id, &version)
                    .await
                {
                    Ok(_) => {}
                    Err(e) if e.is_not_found() => {
                        tracing::info!(
                            entity = adapter.entity(),
                            remote_id = %remote_id,
                            "Remote entity deleted concurrently"
                        );
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            None => {
                tracing::info!(
                    entity = adapter.entity(),
                    remote_id = %remote_id,
                    "Remote entity already gone"
                );
            }
        }

        record.clear_remote(Utc::now());
        self.records.save_record(record).await?;
        Ok(true)
    }

    /// Push every record of the kind that needs sync. Per-record failures are
    /// collected; losing the connection aborts the run.
    pub async fn push_pending(
        &self,
        adapter: &dyn EntityAdapter,
        user_id: &str,
    ) -> Result<SyncReport, AppError> {
        let pending: Vec<SyncedRecord> = self
            .records
            .list_records(user_id, adapter.entity())
            .await?
            .into_iter()
            .filter(SyncedRecord::needs_sync)
            .collect();

        let mut report = SyncReport::default();
        for record in pending {
            let local_id = record.local_id.clone();
            match self.push(adapter, record).await {
                Ok(_) => report.pushed.push(local_id),
                Err(e @ AppError::NotConnected(_)) => return Err(e),
                Err(e) => {
                    self.policy.report("Failed to push record", &e);
                    report.failed.push(SyncFailure {
                        local_id,
                        message: self.policy.public_message(&e, "Sync failed"),
                    });
                }
            }
        }

        tracing::info!(
            user_id,
            entity = adapter.entity(),
            pushed = report.pushed.len(),
            failed = report.failed.len(),
            "Pending records pushed"
        );
        Ok(report)
    }
}
