// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credential persistence with at-rest secret encoding.

use std::sync::Arc;

use crate::db::CredentialRepository;
use crate::error::AppError;
use crate::models::{Credential, CredentialRow};
use crate::services::codec::SecretCodec;

/// Persists and queries credentials per user. Every secret passes through
/// the injected codec on the way in and out.
#[derive(Clone)]
pub struct TokenStore {
    repo: Arc<dyn CredentialRepository>,
    codec: Arc<dyn SecretCodec>,
}

impl TokenStore {
    pub fn new(repo: Arc<dyn CredentialRepository>, codec: Arc<dyn SecretCodec>) -> Self {
        Self { repo, codec }
    }

    async fn encode(&self, credential: &Credential) -> Result<CredentialRow, AppError> {
        let access = self.codec.encode(&credential.access_token).await?;
        let refresh = self.codec.encode(&credential.refresh_token).await?;
        Ok(credential.to_row(access, refresh))
    }

    async fn decode(&self, row: CredentialRow) -> Result<Credential, AppError> {
        let access = self.codec.decode(&row.access_token_encoded).await?;
        let refresh = self.codec.decode(&row.refresh_token_encoded).await?;
        Ok(row.into_credential(access, refresh))
    }

    /// Store `credential` as the user's only active credential.
    pub async fn create_active(&self, credential: &Credential) -> Result<(), AppError> {
        let row = self.encode(credential).await?;
        self.repo.activate_exclusive(&row).await?;
        tracing::info!(
            user_id = %credential.user_id,
            realm_id = %credential.realm_id,
            "Stored new active credential"
        );
        Ok(())
    }

    /// Most recent active credential for the user.
    pub async fn latest_active(&self, user_id: &str) -> Result<Option<Credential>, AppError> {
        match self.repo.latest_active(user_id).await? {
            Some(row) => Ok(Some(self.decode(row).await?)),
            None => Ok(None),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Credential>, AppError> {
        match self.repo.get_credential(id).await? {
            Some(row) => Ok(Some(self.decode(row).await?)),
            None => Ok(None),
        }
    }

    /// Write an existing credential unless it has been deactivated since it
    /// was read. Returns whether the write landed.
    pub async fn save_if_active(&self, credential: &Credential) -> Result<bool, AppError> {
        let row = self.encode(credential).await?;
        self.repo.save_if_active(&row).await
    }

    pub async fn deactivate(&self, credential_id: &str) -> Result<(), AppError> {
        self.repo.deactivate(credential_id).await?;
        tracing::info!(credential_id, "Credential deactivated");
        Ok(())
    }

    pub async fn deactivate_all(&self, user_id: &str) -> Result<usize, AppError> {
        let count = self.repo.deactivate_all(user_id).await?;
        if count > 0 {
            tracing::info!(user_id, count, "Deactivated user credentials");
        }
        Ok(count)
    }

    pub async fn count_active(&self, user_id: &str) -> Result<usize, AppError> {
        self.repo.count_active(user_id).await
    }
}
