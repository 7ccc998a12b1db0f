// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod credential;
pub mod customer;
pub mod invoice;
pub mod oauth_state;
pub mod reason;
pub mod record;

pub use credential::{ConnectionStatus, Credential, CredentialRow};
pub use customer::{Address, Customer};
pub use invoice::{Invoice, InvoiceLine, InvoiceStatus};
pub use oauth_state::{hash_state_token, OAuthState};
pub use reason::{CallbackFailure, NeedsConnection};
pub use record::SyncedRecord;
