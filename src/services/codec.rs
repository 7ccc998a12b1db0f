// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! At-rest encoding of OAuth secrets.
//!
//! Token storage calls exactly one codec, chosen at startup from the
//! `token_encryption` flag.

use async_trait::async_trait;

use crate::error::AppError;

#[async_trait]
pub trait SecretCodec: Send + Sync {
    /// Plaintext secret to its stored form.
    async fn encode(&self, plain: &str) -> Result<String, AppError>;

    /// Stored form back to the plaintext secret.
    async fn decode(&self, stored: &str) -> Result<String, AppError>;
}

/// Stores secrets as-is (`token_encryption = false`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextCodec;

#[async_trait]
impl SecretCodec for PlaintextCodec {
    async fn encode(&self, plain: &str) -> Result<String, AppError> {
        Ok(plain.to_string())
    }

    async fn decode(&self, stored: &str) -> Result<String, AppError> {
        Ok(stored.to_string())
    }
}
