// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Request-time access gate.
//!
//! Resolves a usable credential for a user, refreshing on demand, or says
//! why the user has to reconnect.

use crate::error::AppError;
use crate::models::{Credential, NeedsConnection};
use crate::services::tokens::TokenLifecycleManager;

/// Result of `AccessGate::resolve`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Usable(Credential),
    NeedsConnection(NeedsConnection),
}

#[derive(Clone)]
pub struct AccessGate {
    manager: TokenLifecycleManager,
}

impl AccessGate {
    pub fn new(manager: TokenLifecycleManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &TokenLifecycleManager {
        &self.manager
    }

    /// Resolve a usable credential for `user_id`.
    ///
    /// Runs under the user's refresh lock. The credential is re-read after
    /// the lock is taken, so a request that waited on another's refresh sees
    /// the refreshed row instead of refreshing again.
    pub async fn resolve(&self, user_id: &str) -> Result<Outcome, AppError> {
        let lock = self.manager.user_lock(user_id);
        let _guard = lock.lock().await;

        let Some(credential) = self.manager.tokens().latest_active(user_id).await? else {
            return Ok(Outcome::NeedsConnection(NeedsConnection::NoToken));
        };

        if !credential.active {
            return Ok(Outcome::NeedsConnection(NeedsConnection::TokenInactive));
        }

        if credential.is_refresh_expired() {
            self.manager.tokens().deactivate(&credential.id).await?;
            tracing::info!(user_id, "Refresh token expired, reconnection required");
            return Ok(Outcome::NeedsConnection(
                NeedsConnection::RefreshTokenExpired,
            ));
        }

        if credential.is_access_expired() {
            if !self.manager.auto_refresh() {
                return Ok(Outcome::NeedsConnection(NeedsConnection::RefreshFailed));
            }

            return match self.manager.refresh(&credential).await {
                Ok(refreshed) => Ok(Outcome::Usable(refreshed)),
                Err(AppError::NotConnected(reason)) => Ok(Outcome::NeedsConnection(reason)),
                Err(e) => {
                    self.manager
                        .error_policy()
                        .report("Failed to refresh QuickBooks access token", &e);
                    Ok(Outcome::NeedsConnection(NeedsConnection::RefreshFailed))
                }
            };
        }

        Ok(Outcome::Usable(credential))
    }
}
