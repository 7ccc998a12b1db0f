// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth credential model.
//!
//! `Credential` is the in-memory form with plaintext secrets. What actually
//! lands in storage is a `CredentialRow`, whose secrets have been passed
//! through the configured `SecretCodec`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stored OAuth token pair plus expiry bookkeeping for one user/realm
/// connection.
#[derive(Clone, PartialEq)]
pub struct Credential {
    /// Row identifier (also used as document ID)
    pub id: String,
    pub user_id: String,
    /// QuickBooks company (realm) ID
    pub realm_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub active: bool,
    /// Display name of the connected company, when known
    pub company_name: Option<String>,
    pub company_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Expired at exactly `access_expires_at` and after.
    pub fn is_access_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.access_expires_at
    }

    pub fn is_refresh_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.refresh_expires_at
    }

    pub fn is_access_expired(&self) -> bool {
        self.is_access_expired_at(Utc::now())
    }

    pub fn is_refresh_expired(&self) -> bool {
        self.is_refresh_expired_at(Utc::now())
    }

    /// Active with a usable access token.
    pub fn is_valid(&self) -> bool {
        self.active && !self.is_access_expired()
    }

    /// Active with a usable refresh token.
    pub fn can_be_refreshed(&self) -> bool {
        self.active && !self.is_refresh_expired()
    }

    /// Convert to the persisted shape with already-encoded secrets.
    pub fn to_row(&self, access_token_encoded: String, refresh_token_encoded: String) -> CredentialRow {
        CredentialRow {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            realm_id: self.realm_id.clone(),
            access_token_encoded,
            refresh_token_encoded,
            access_expires_at: self.access_expires_at,
            refresh_expires_at: self.refresh_expires_at,
            active: self.active,
            company_name: self.company_name.clone(),
            company_email: self.company_email.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("realm_id", &self.realm_id)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .field("active", &self.active)
            .field("company_name", &self.company_name)
            .finish()
    }
}

/// Credential as persisted (secrets encoded by the secret codec).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRow {
    pub id: String,
    pub user_id: String,
    pub realm_id: String,
    pub access_token_encoded: String,
    pub refresh_token_encoded: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub active: bool,
    pub company_name: Option<String>,
    pub company_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRow {
    /// Rebuild the in-memory credential from decoded secrets.
    pub fn into_credential(self, access_token: String, refresh_token: String) -> Credential {
        Credential {
            id: self.id,
            user_id: self.user_id,
            realm_id: self.realm_id,
            access_token,
            refresh_token,
            access_expires_at: self.access_expires_at,
            refresh_expires_at: self.refresh_expires_at,
            active: self.active,
            company_name: self.company_name,
            company_email: self.company_email,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Connection summary for the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub company_name: Option<String>,
    pub realm_id: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub needs_refresh: bool,
}

impl From<&Credential> for ConnectionStatus {
    fn from(credential: &Credential) -> Self {
        Self {
            connected: true,
            company_name: credential.company_name.clone(),
            realm_id: Some(credential.realm_id.clone()),
            access_token_expires_at: Some(credential.access_expires_at),
            refresh_token_expires_at: Some(credential.refresh_expires_at),
            needs_refresh: credential.is_access_expired(),
        }
    }
}
