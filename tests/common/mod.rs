// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use qbo_connect::config::Config;
use qbo_connect::db::{FirestoreDb, MemoryDb};
use qbo_connect::error::RemoteServiceError;
use qbo_connect::middleware::auth::create_jwt;
use qbo_connect::models::Credential;
use qbo_connect::routes::create_router;
use qbo_connect::services::qbo::AccountMetadata;
use qbo_connect::services::{
    AccessGate, AccountingApi, AdapterRegistry, ApiSession, OAuthStateStore, PlaintextCodec,
    RemoteEntity, SyncEngine, TokenLifecycleManager, TokenPair, TokenStore,
};
use qbo_connect::AppState;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Unique user ID for test isolation.
#[allow(dead_code)]
pub fn unique_user_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("user-{}", nanos)
}

// ═══════════════════════════════════════════════════════════════════════════
// FAKE ACCOUNTING API
// ═══════════════════════════════════════════════════════════════════════════

/// In-memory stand-in for QuickBooks with call counters and failure switches.
#[derive(Default)]
pub struct FakeAccountingApi {
    pub exchange_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub revoke_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub metadata_calls: AtomicUsize,

    pub fail_exchange: AtomicBool,
    pub fail_refresh: AtomicBool,
    pub fail_revoke: AtomicBool,
    pub fail_metadata: AtomicBool,
    /// Refresh hands out a new refresh token too
    pub rotate_refresh_token: AtomicBool,
    /// The entity disappears between the fetch and the delete
    pub vanish_before_delete: AtomicBool,
    /// Reject creates whose DisplayName contains this marker
    pub reject_marker: std::sync::Mutex<Option<String>>,

    /// Remote entities keyed by (type, id)
    pub entities: DashMap<(String, String), RemoteEntity>,
    next_id: AtomicUsize,
}

#[allow(dead_code)]
impl FakeAccountingApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn set(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    /// Seed a remote entity directly, as if created in QuickBooks.
    pub fn insert_remote(&self, type_name: &str, mut fields: Map<String, Value>) -> RemoteEntity {
        let id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 100).to_string();
        fields.insert("Id".to_string(), json!(id));
        fields.insert("SyncToken".to_string(), json!("0"));
        let entity = RemoteEntity::from_object(fields).unwrap();
        self.entities
            .insert((type_name.to_string(), id), entity.clone());
        entity
    }

    pub fn remote(&self, type_name: &str, id: &str) -> Option<RemoteEntity> {
        self.entities
            .get(&(type_name.to_string(), id.to_string()))
            .map(|e| e.clone())
    }

    pub fn remove_remote(&self, type_name: &str, id: &str) {
        self.entities.remove(&(type_name.to_string(), id.to_string()));
    }

    /// Drop the SyncToken from a stored entity.
    pub fn strip_version(&self, type_name: &str, id: &str) {
        if let Some(mut entry) = self
            .entities
            .get_mut(&(type_name.to_string(), id.to_string()))
        {
            entry.version_token = None;
            entry.fields.remove("SyncToken");
        }
    }

    fn not_found() -> RemoteServiceError {
        RemoteServiceError::new(
            Some(400),
            Some(RemoteServiceError::OBJECT_NOT_FOUND.to_string()),
            "Object Not Found",
        )
    }

    fn rejected(err: &str) -> RemoteServiceError {
        RemoteServiceError::new(Some(400), Some("invalid_grant".to_string()), err)
    }
}

#[async_trait]
impl AccountingApi for FakeAccountingApi {
    async fn exchange_code(
        &self,
        code: &str,
        _realm_id: &str,
    ) -> Result<TokenPair, RemoteServiceError> {
        let n = self.exchange_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(Self::rejected("Invalid authorization code"));
        }
        Ok(TokenPair {
            access_token: format!("access-{}-{}", code, n),
            refresh_token: Some(format!("refresh-{}-{}", code, n)),
            access_expires_in: Some(3600),
            refresh_expires_in: Some(8_726_400),
        })
    }

    async fn refresh_token(
        &self,
        refresh_token: &str,
        _realm_id: &str,
    ) -> Result<TokenPair, RemoteServiceError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        // Widen the window for concurrent callers.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(Self::rejected("Token invalid"));
        }
        let rotated = self
            .rotate_refresh_token
            .load(Ordering::SeqCst)
            .then(|| format!("{}-r{}", refresh_token, n));
        Ok(TokenPair {
            access_token: format!("refreshed-access-{}", n),
            refresh_expires_in: rotated.as_ref().map(|_| 8_726_400),
            refresh_token: rotated,
            access_expires_in: Some(3600),
        })
    }

    async fn revoke(&self, _token: &str, _realm_id: &str) -> Result<bool, RemoteServiceError> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_revoke.load(Ordering::SeqCst) {
            return Err(RemoteServiceError::transport("connection reset"));
        }
        Ok(true)
    }

    async fn fetch_entity(
        &self,
        _session: &ApiSession,
        type_name: &str,
        remote_id: &str,
    ) -> Result<Option<RemoteEntity>, RemoteServiceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.remote(type_name, remote_id))
    }

    async fn query_entities(
        &self,
        _session: &ApiSession,
        type_name: &str,
        filter: Option<&str>,
    ) -> Result<Vec<RemoteEntity>, RemoteServiceError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        // Only `Id = '<id>'` filters are understood.
        let wanted = filter.and_then(|f| f.split('\'').nth(1)).map(str::to_string);
        let mut found: Vec<RemoteEntity> = self
            .entities
            .iter()
            .filter(|e| e.key().0 == type_name)
            .filter(|e| wanted.as_deref().map_or(true, |id| e.key().1 == id))
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn create_entity(
        &self,
        _session: &ApiSession,
        type_name: &str,
        payload: &Map<String, Value>,
    ) -> Result<RemoteEntity, RemoteServiceError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = self.reject_marker.lock().unwrap().as_deref() {
            let name = payload
                .get("DisplayName")
                .and_then(Value::as_str)
                .unwrap_or("");
            if name.contains(marker) {
                return Err(RemoteServiceError::new(
                    Some(400),
                    Some("6240".to_string()),
                    "Duplicate Name Exists Error",
                ));
            }
        }
        Ok(self.insert_remote(type_name, payload.clone()))
    }

    async fn update_entity(
        &self,
        _session: &ApiSession,
        type_name: &str,
        remote_id: &str,
        payload: &Map<String, Value>,
        version_token: &str,
    ) -> Result<RemoteEntity, RemoteServiceError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let key = (type_name.to_string(), remote_id.to_string());
        let mut entry = self.entities.get_mut(&key).ok_or_else(Self::not_found)?;

        let current = entry.version_token.clone().unwrap_or_default();
        if current != version_token {
            return Err(RemoteServiceError::new(
                Some(400),
                Some("5010".to_string()),
                "Stale Object Error",
            ));
        }

        let next = (current.parse::<u64>().unwrap_or(0) + 1).to_string();
        let mut fields = entry.fields.clone();
        for (k, v) in payload {
            fields.insert(k.clone(), v.clone());
        }
        fields.insert("SyncToken".to_string(), json!(next));
        *entry = RemoteEntity::from_object(fields).unwrap();
        Ok(entry.clone())
    }

    async fn delete_entity(
        &self,
        _session: &ApiSession,
        type_name: &str,
        remote_id: &str,
        _version_token: &str,
    ) -> Result<bool, RemoteServiceError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let key = (type_name.to_string(), remote_id.to_string());
        if self.vanish_before_delete.load(Ordering::SeqCst) {
            self.entities.remove(&key);
        }
        match self.entities.remove(&key) {
            Some(_) => Ok(true),
            None => Err(Self::not_found()),
        }
    }

    async fn fetch_account_metadata(
        &self,
        _session: &ApiSession,
    ) -> Result<AccountMetadata, RemoteServiceError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_metadata.load(Ordering::SeqCst) {
            return Err(RemoteServiceError::new(Some(503), None, "Service unavailable"));
        }
        Ok(AccountMetadata {
            company_name: Some("Sandbox Company_US_1".to_string()),
            email: Some("owner@example.com".to_string()),
            country: Some("US".to_string()),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TEST APP
// ═══════════════════════════════════════════════════════════════════════════

#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub api: Arc<FakeAccountingApi>,
    pub db: Arc<MemoryDb>,
}

/// Create a test app with in-memory storage and a fake QuickBooks.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with(config: Config) -> TestApp {
    let config = Arc::new(config);
    let db = Arc::new(MemoryDb::new());
    let api = FakeAccountingApi::new();

    let manager = TokenLifecycleManager::new(
        config.clone(),
        TokenStore::new(db.clone(), Arc::new(PlaintextCodec)),
        OAuthStateStore::new(db.clone(), config.oauth_state_ttl_minutes),
        api.clone(),
    );
    let gate = AccessGate::new(manager.clone());
    let sync = SyncEngine::new(api.clone(), db.clone(), gate.clone(), config.error_policy());

    let state = Arc::new(AppState {
        config,
        manager,
        gate,
        sync,
        registry: AdapterRegistry::with_defaults(),
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        api,
        db,
    }
}

/// Store an active credential whose tokens expire after the given offsets
/// from now (negative = already expired).
#[allow(dead_code)]
pub async fn seed_credential(
    state: &AppState,
    user_id: &str,
    access_expires_in: Duration,
    refresh_expires_in: Duration,
) -> Credential {
    let now = Utc::now();
    let credential = Credential {
        id: format!("cred-{}-{}", user_id, now.timestamp_nanos_opt().unwrap_or(0)),
        user_id: user_id.to_string(),
        realm_id: "9130350000000000".to_string(),
        access_token: "seed-access".to_string(),
        refresh_token: "seed-refresh".to_string(),
        access_expires_at: now + access_expires_in,
        refresh_expires_at: now + refresh_expires_in,
        active: true,
        company_name: Some("Sandbox Company_US_1".to_string()),
        company_email: None,
        created_at: now,
        updated_at: now,
    };
    state
        .manager
        .tokens()
        .create_active(&credential)
        .await
        .expect("Failed to seed credential");
    credential
}

/// `Authorization` header value for a session of `user_id`.
#[allow(dead_code)]
pub fn bearer(state: &AppState, user_id: &str) -> String {
    let jwt = create_jwt(user_id, &state.config.jwt_signing_key).expect("JWT creation failed");
    format!("Bearer {}", jwt)
}
