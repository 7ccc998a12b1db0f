//! Database layer.
//!
//! Services talk to storage only through the repository traits below.
//! `FirestoreDb` backs production; `MemoryDb` backs local runs and tests.

pub mod firestore;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{CredentialRow, OAuthState, SyncedRecord};

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

/// Collection names as constants.
pub mod collections {
    /// OAuth credentials (keyed by credential id)
    pub const CREDENTIALS: &str = "qbo_credentials";
    /// Per-user pointer to the active credential (keyed by user id)
    pub const ACTIVE_CREDENTIALS: &str = "qbo_active_credentials";
    /// Pending OAuth states (keyed by state hash)
    pub const OAUTH_STATES: &str = "qbo_oauth_states";
    /// Synced entity records (keyed by `{entity}_{local_id}`)
    pub const SYNCED_RECORDS: &str = "qbo_synced_records";
}

/// Storage for OAuth credentials.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Deactivate every active credential of `row.user_id`, then store `row`
    /// as the user's only active credential. Both happen together or not at
    /// all.
    async fn activate_exclusive(&self, row: &CredentialRow) -> Result<(), AppError>;

    /// Most recently created active credential for the user.
    async fn latest_active(&self, user_id: &str) -> Result<Option<CredentialRow>, AppError>;

    async fn get_credential(&self, id: &str) -> Result<Option<CredentialRow>, AppError>;

    /// Full-row write.
    async fn save_credential(&self, row: &CredentialRow) -> Result<(), AppError>;

    /// Full-row write that only lands while the stored row is still active.
    /// Returns `false`, writing nothing, once the row has been deactivated.
    async fn save_if_active(&self, row: &CredentialRow) -> Result<bool, AppError>;

    async fn deactivate(&self, id: &str) -> Result<(), AppError>;

    /// Returns the number of credentials deactivated.
    async fn deactivate_all(&self, user_id: &str) -> Result<usize, AppError>;

    async fn count_active(&self, user_id: &str) -> Result<usize, AppError>;
}

/// Storage for pending OAuth states.
#[async_trait]
pub trait OAuthStateRepository: Send + Sync {
    async fn insert_state(&self, state: &OAuthState) -> Result<(), AppError>;

    async fn delete_states_for_user(&self, user_id: &str) -> Result<usize, AppError>;

    async fn find_state(&self, state_hash: &str) -> Result<Option<OAuthState>, AppError>;

    /// Delete the state and return it. Of several concurrent callers with the
    /// same hash, at most one receives `Some`.
    async fn take_state(&self, state_hash: &str) -> Result<Option<OAuthState>, AppError>;

    /// Delete states with `expires_at < now`. Returns the number deleted.
    async fn delete_expired_states(&self, now: DateTime<Utc>) -> Result<usize, AppError>;
}

/// Storage for synced entity records.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    async fn get_record(&self, entity: &str, local_id: &str)
        -> Result<Option<SyncedRecord>, AppError>;

    async fn find_by_remote_id(
        &self,
        user_id: &str,
        entity: &str,
        remote_id: &str,
    ) -> Result<Option<SyncedRecord>, AppError>;

    async fn list_records(&self, user_id: &str, entity: &str)
        -> Result<Vec<SyncedRecord>, AppError>;

    /// Upsert. Fails with `Conflict` if another record of the same user and
    /// entity already holds `record.remote_id`.
    async fn save_record(&self, record: &SyncedRecord) -> Result<(), AppError>;

    /// Returns whether a record was deleted.
    async fn delete_record(&self, entity: &str, local_id: &str) -> Result<bool, AppError>;
}

/// Document ID for a synced record.
pub fn record_doc_id(entity: &str, local_id: &str) -> String {
    format!("{}_{}", entity, urlencoding::encode(local_id))
}
