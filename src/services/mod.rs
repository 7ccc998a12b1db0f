// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod adapters;
pub mod codec;
pub mod gate;
pub mod kms;
pub mod oauth_state;
pub mod qbo;
pub mod sync;
pub mod token_store;
pub mod tokens;

pub use adapters::{CustomerAdapter, InvoiceAdapter};
pub use codec::{PlaintextCodec, SecretCodec};
pub use gate::{AccessGate, Outcome};
pub use kms::KmsService;
pub use oauth_state::OAuthStateStore;
pub use qbo::{AccountingApi, ApiSession, QboClient, RemoteEntity, TokenPair};
pub use sync::{AdapterRegistry, EntityAdapter, SyncEngine, SyncReport};
pub use token_store::TokenStore;
pub use tokens::{CallbackOutcome, CallbackParams, TokenLifecycleManager};
