//! OAuth state (anti-CSRF / anti-replay handshake token).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Persisted OAuth state. Only the SHA-256 digest of the token is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthState {
    /// Hex SHA-256 of the state token (also used as document ID)
    pub state_hash: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl OAuthState {
    /// A state is live strictly before `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Digest used as the lookup key for a raw state token.
pub fn hash_state_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
