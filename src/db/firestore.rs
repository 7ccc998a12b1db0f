// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Credentials (encoded OAuth tokens, one active per user)
//! - OAuth states (single-use, keyed by token hash)
//! - Synced records (local entities with remote bookkeeping)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firestore::errors::{BackoffError, FirestoreError};
use firestore::FirestoreWritePrecondition;
use serde::{Deserialize, Serialize};

use crate::db::{
    collections, record_doc_id, CredentialRepository, OAuthStateRepository, RecordRepository,
};
use crate::error::AppError;
use crate::models::{CredentialRow, OAuthState, SyncedRecord};

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Marker document per user, rewritten by every activation.
#[derive(Debug, Serialize, Deserialize)]
struct ActivePointer {
    user_id: String,
    credential_id: String,
    updated_at: DateTime<Utc>,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Active credential rows for a user (unordered).
    async fn active_credentials(&self, user_id: &str) -> Result<Vec<CredentialRow>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::CREDENTIALS)
            .filter(|q| {
                q.for_all([
                    q.field("user_id").eq(user_id),
                    q.field("active").eq(true),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Helper to batch delete documents using transactions.
    async fn batch_delete(&self, doc_ids: &[String], collection: &str) -> Result<(), AppError> {
        let client = self.get_client()?;

        for chunk in doc_ids.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for doc_id in chunk {
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }
}

// ─── Credential Operations ───────────────────────────────────────

#[async_trait]
impl CredentialRepository for FirestoreDb {
    async fn activate_exclusive(&self, row: &CredentialRow) -> Result<(), AppError> {
        let mut row = row.clone();
        row.active = true;

        // Both the active rows and the user's pointer document are read inside
        // the transaction, so two concurrent activations for one user conflict
        // at commit and the loser is retried against the winner's rows.
        self.get_client()?
            .run_transaction(|db, transaction| {
                let row = row.clone();
                Box::pin(async move {
                    let previous: Vec<CredentialRow> = db
                        .fluent()
                        .select()
                        .from(collections::CREDENTIALS)
                        .filter(|q| {
                            q.for_all([
                                q.field("user_id").eq(row.user_id.as_str()),
                                q.field("active").eq(true),
                            ])
                        })
                        .obj()
                        .query()
                        .await?;
                    let _: Option<ActivePointer> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::ACTIVE_CREDENTIALS)
                        .obj()
                        .one(&row.user_id)
                        .await?;

                    for mut old in previous.into_iter().filter(|old| old.id != row.id) {
                        old.active = false;
                        old.updated_at = row.updated_at;
                        db.fluent()
                            .update()
                            .in_col(collections::CREDENTIALS)
                            .document_id(&old.id)
                            .object(&old)
                            .add_to_transaction(transaction)?;
                    }

                    db.fluent()
                        .update()
                        .in_col(collections::CREDENTIALS)
                        .document_id(&row.id)
                        .object(&row)
                        .add_to_transaction(transaction)?;

                    db.fluent()
                        .update()
                        .in_col(collections::ACTIVE_CREDENTIALS)
                        .document_id(&row.user_id)
                        .object(&ActivePointer {
                            user_id: row.user_id.clone(),
                            credential_id: row.id.clone(),
                            updated_at: row.updated_at,
                        })
                        .add_to_transaction(transaction)?;

                    Ok::<(), BackoffError<FirestoreError>>(())
                })
            })
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        tracing::debug!(user_id = %row.user_id, credential_id = %row.id, "Credential activated");
        Ok(())
    }

    async fn latest_active(&self, user_id: &str) -> Result<Option<CredentialRow>, AppError> {
        Ok(self
            .active_credentials(user_id)
            .await?
            .into_iter()
            .max_by_key(|row| row.created_at))
    }

    async fn get_credential(&self, id: &str) -> Result<Option<CredentialRow>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::CREDENTIALS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn save_credential(&self, row: &CredentialRow) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::CREDENTIALS)
            .document_id(&row.id)
            .object(row)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn save_if_active(&self, row: &CredentialRow) -> Result<bool, AppError> {
        // The stored row is read inside the transaction; a deactivation that
        // commits first makes this commit fail and the retry sees it.
        self.get_client()?
            .run_transaction(|db, transaction| {
                let row = row.clone();
                Box::pin(async move {
                    let current: Option<CredentialRow> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::CREDENTIALS)
                        .obj()
                        .one(&row.id)
                        .await?;
                    if !current.is_some_and(|stored| stored.active) {
                        return Ok::<bool, BackoffError<FirestoreError>>(false);
                    }

                    db.fluent()
                        .update()
                        .in_col(collections::CREDENTIALS)
                        .document_id(&row.id)
                        .object(&row)
                        .add_to_transaction(transaction)?;
                    Ok(true)
                })
            })
            .await
            .map_err(|e| AppError::Database(format!("Conditional credential write failed: {}", e)))
    }

    async fn deactivate(&self, id: &str) -> Result<(), AppError> {
        if let Some(mut row) = self.get_credential(id).await? {
            row.active = false;
            row.updated_at = Utc::now();
            self.save_credential(&row).await?;
        }
        Ok(())
    }

    async fn deactivate_all(&self, user_id: &str) -> Result<usize, AppError> {
        let rows = self.active_credentials(user_id).await?;
        let count = rows.len();
        let now = Utc::now();
        for mut row in rows {
            row.active = false;
            row.updated_at = now;
            self.save_credential(&row).await?;
        }
        Ok(count)
    }

    async fn count_active(&self, user_id: &str) -> Result<usize, AppError> {
        Ok(self.active_credentials(user_id).await?.len())
    }
}

// ─── OAuth State Operations ──────────────────────────────────────

#[async_trait]
impl OAuthStateRepository for FirestoreDb {
    async fn insert_state(&self, state: &OAuthState) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::OAUTH_STATES)
            .document_id(&state.state_hash)
            .object(state)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_states_for_user(&self, user_id: &str) -> Result<usize, AppError> {
        let states: Vec<OAuthState> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::OAUTH_STATES)
            .filter(|q| q.for_all([q.field("user_id").eq(user_id)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let ids: Vec<String> = states.into_iter().map(|s| s.state_hash).collect();
        self.batch_delete(&ids, collections::OAUTH_STATES).await?;
        Ok(ids.len())
    }

    async fn find_state(&self, state_hash: &str) -> Result<Option<OAuthState>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::OAUTH_STATES)
            .obj()
            .one(state_hash)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn take_state(&self, state_hash: &str) -> Result<Option<OAuthState>, AppError> {
        let Some(state) = self.find_state(state_hash).await? else {
            return Ok(None);
        };

        // Only one concurrent consumer gets past the existence precondition.
        let deleted = self
            .get_client()?
            .fluent()
            .delete()
            .from(collections::OAUTH_STATES)
            .document_id(state_hash)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .execute()
            .await;

        match deleted {
            Ok(()) => Ok(Some(state)),
            Err(FirestoreError::DataNotFoundError(_)) => {
                tracing::warn!(user_id = %state.user_id, "OAuth state consumed concurrently");
                Ok(None)
            }
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    async fn delete_expired_states(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        // Timestamps are stored as RFC3339 strings with variable precision, so
        // expiry is compared here rather than in the query.
        let states: Vec<OAuthState> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::OAUTH_STATES)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let expired: Vec<String> = states
            .into_iter()
            .filter(|s| s.expires_at < now)
            .map(|s| s.state_hash)
            .collect();

        self.batch_delete(&expired, collections::OAUTH_STATES).await?;
        Ok(expired.len())
    }
}

// ─── Synced Record Operations ────────────────────────────────────

#[async_trait]
impl RecordRepository for FirestoreDb {
    async fn get_record(
        &self,
        entity: &str,
        local_id: &str,
    ) -> Result<Option<SyncedRecord>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::SYNCED_RECORDS)
            .obj()
            .one(&record_doc_id(entity, local_id))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_by_remote_id(
        &self,
        user_id: &str,
        entity: &str,
        remote_id: &str,
    ) -> Result<Option<SyncedRecord>, AppError> {
        let mut found: Vec<SyncedRecord> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::SYNCED_RECORDS)
            .filter(|q| {
                q.for_all([
                    q.field("user_id").eq(user_id),
                    q.field("entity").eq(entity),
                    q.field("remote_id").eq(remote_id),
                ])
            })
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(found.pop())
    }

    async fn list_records(
        &self,
        user_id: &str,
        entity: &str,
    ) -> Result<Vec<SyncedRecord>, AppError> {
        let mut records: Vec<SyncedRecord> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::SYNCED_RECORDS)
            .filter(|q| {
                q.for_all([
                    q.field("user_id").eq(user_id),
                    q.field("entity").eq(entity),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    async fn save_record(&self, record: &SyncedRecord) -> Result<(), AppError> {
        if let Some(remote_id) = record.remote_id.as_deref() {
            if let Some(existing) = self
                .find_by_remote_id(&record.user_id, &record.entity, remote_id)
                .await?
            {
                if existing.local_id != record.local_id {
                    return Err(AppError::Conflict(format!(
                        "{} with remote id {} already linked to another record",
                        record.entity, remote_id
                    )));
                }
            }
        }

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::SYNCED_RECORDS)
            .document_id(record_doc_id(&record.entity, &record.local_id))
            .object(record)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_record(&self, entity: &str, local_id: &str) -> Result<bool, AppError> {
        if self.get_record(entity, local_id).await?.is_none() {
            return Ok(false);
        }

        self.get_client()?
            .fluent()
            .delete()
            .from(collections::SYNCED_RECORDS)
            .document_id(record_doc_id(entity, local_id))
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(true)
    }
}
