// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Single-use OAuth state tokens.
//!
//! The raw token only ever travels in the authorization URL and back in the
//! callback. Storage sees its SHA-256 digest.

use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::db::OAuthStateRepository;
use crate::error::AppError;
use crate::ids::{random_token, STATE_TOKEN_BYTES};
use crate::models::{hash_state_token, OAuthState};

#[derive(Clone)]
pub struct OAuthStateStore {
    repo: Arc<dyn OAuthStateRepository>,
    ttl: Duration,
}

impl OAuthStateStore {
    pub fn new(repo: Arc<dyn OAuthStateRepository>, ttl_minutes: i64) -> Self {
        Self {
            repo,
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Discard the user's previous states and issue a fresh one. Returns the
    /// raw token.
    pub async fn create_for_user(&self, user_id: &str) -> Result<String, AppError> {
        let discarded = self.repo.delete_states_for_user(user_id).await?;
        if discarded > 0 {
            tracing::debug!(user_id, discarded, "Discarded previous OAuth states");
        }

        let token = random_token(STATE_TOKEN_BYTES)?;
        let now = Utc::now();
        let state = OAuthState {
            state_hash: hash_state_token(&token),
            user_id: user_id.to_string(),
            expires_at: now + self.ttl,
            created_at: now,
        };
        self.repo.insert_state(&state).await?;

        Ok(token)
    }

    /// Look up a live state. Expired states are never returned, collected or
    /// not.
    pub async fn find_valid(&self, token: &str) -> Result<Option<OAuthState>, AppError> {
        let state = self.repo.find_state(&hash_state_token(token)).await?;
        Ok(state.filter(|s| !s.is_expired_at(Utc::now())))
    }

    /// Atomically consume a live state. Of concurrent callers with the same
    /// token, only one succeeds; the rest get `InvalidState`.
    pub async fn consume(&self, token: &str) -> Result<OAuthState, AppError> {
        let state = self
            .repo
            .take_state(&hash_state_token(token))
            .await?
            .ok_or(AppError::InvalidState)?;

        if state.is_expired_at(Utc::now()) {
            tracing::warn!(user_id = %state.user_id, "Expired OAuth state presented");
            return Err(AppError::InvalidState);
        }

        Ok(state)
    }

    /// Delete expired states. Returns the number removed.
    pub async fn cleanup(&self) -> Result<usize, AppError> {
        let removed = self.repo.delete_expired_states(Utc::now()).await?;
        if removed > 0 {
            tracing::debug!(removed, "Cleaned up expired OAuth states");
        }
        Ok(removed)
    }
}
