// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! QBO-Connect API Server
//!
//! Connects application users to QuickBooks Online and synchronizes their
//! customers and invoices.

use qbo_connect::{
    config::{Config, StorageBackend},
    db::{CredentialRepository, FirestoreDb, MemoryDb, OAuthStateRepository, RecordRepository},
    services::{
        AccessGate, AdapterRegistry, KmsService, OAuthStateStore, PlaintextCodec, QboClient,
        SecretCodec, SyncEngine, TokenLifecycleManager, TokenStore,
    },
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Arc::new(Config::from_env()?);
    tracing::info!(
        port = config.port,
        environment = ?config.environment,
        storage = ?config.storage,
        "Starting QBO-Connect API"
    );

    // Storage backend
    let (credentials, states, records): (
        Arc<dyn CredentialRepository>,
        Arc<dyn OAuthStateRepository>,
        Arc<dyn RecordRepository>,
    ) = match config.storage {
        StorageBackend::Firestore => {
            let db = Arc::new(FirestoreDb::new(&config.gcp_project_id).await?);
            (db.clone(), db.clone(), db)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            let db = Arc::new(MemoryDb::new());
            (db.clone(), db.clone(), db)
        }
    };

    // Token encryption at rest
    let codec: Arc<dyn SecretCodec> = if config.token_encryption {
        let kms = KmsService::new(
            &config.gcp_project_id,
            &config.gcp_region,
            &config.kms_key_name,
        )
        .await?;
        tracing::info!(key = %kms.key_path(), "KMS service initialized");
        Arc::new(kms)
    } else {
        tracing::warn!("Token encryption disabled; tokens stored in plaintext");
        Arc::new(PlaintextCodec)
    };

    let api = Arc::new(QboClient::new(&config)?);

    let manager = TokenLifecycleManager::new(
        config.clone(),
        TokenStore::new(credentials, codec),
        OAuthStateStore::new(states, config.oauth_state_ttl_minutes),
        api.clone(),
    );
    let gate = AccessGate::new(manager.clone());
    let sync = SyncEngine::new(api, records, gate.clone(), config.error_policy());
    let registry = AdapterRegistry::with_defaults();
    tracing::info!(entities = ?registry.entities(), "Sync adapters registered");

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        manager,
        gate,
        sync,
        registry,
    });

    // Build router
    let app = qbo_connect::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("qbo_connect=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
