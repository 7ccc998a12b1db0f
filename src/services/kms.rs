// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloud KMS codec for encrypting/decrypting OAuth tokens at rest.
//!
//! Uses direct KMS encryption (not envelope encryption). Tokens are short, and
//! each encode/decode is one KMS call.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::AppError;
use crate::services::codec::SecretCodec;

/// KMS encryption service.
#[derive(Clone)]
pub struct KmsService {
    /// Full resource path to the KMS key
    /// Format: projects/{project}/locations/{location}/keyRings/{ring}/cryptoKeys/{key}
    key_path: String,

    /// GCP KMS client
    client: Option<std::sync::Arc<google_cloud_kms::client::Client>>,
}

impl KmsService {
    /// KMS Key Ring Name
    const KEY_RING_NAME: &str = "qbo-connect";

    /// Create a new KMS service.
    /// Connects to GCP KMS.
    pub async fn new(project_id: &str, location: &str, key_name: &str) -> Result<Self, AppError> {
        let key_path = format!(
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
            project_id,
            location,
            Self::KEY_RING_NAME,
            key_name
        );

        let config = google_cloud_kms::client::ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to create KMS auth config: {}", e))
            })?;

        let client = google_cloud_kms::client::Client::new(config)
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to create KMS client: {}", e))
            })?;

        Ok(Self {
            key_path,
            client: Some(std::sync::Arc::new(client)),
        })
    }

    /// Create a mock KMS service for testing (offline mode).
    /// Only available in debug/test builds.
    #[cfg(debug_assertions)]
    pub fn new_mock() -> Self {
        Self {
            key_path: "projects/mock/locations/mock/keyRings/mock/cryptoKeys/mock".to_string(),
            client: None,
        }
    }

    pub fn key_path(&self) -> &str {
        &self.key_path
    }

    /// Encrypt plaintext data using KMS.
    /// Returns base64-encoded ciphertext.
    pub async fn encrypt(&self, plaintext: &str) -> Result<String, AppError> {
        use google_cloud_googleapis::cloud::kms::v1::EncryptRequest;

        // Mock mode (Debug builds only)
        #[cfg(debug_assertions)]
        {
            if self.client.is_none() {
                return Ok(BASE64.encode(plaintext));
            }
        }

        // In release builds a missing client is an error, never a passthrough.
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("KMS client not connected")))?;

        let req = EncryptRequest {
            name: self.key_path.clone(),
            plaintext: plaintext.as_bytes().to_vec(),
            ..Default::default()
        };

        let response = client
            .encrypt(req, None)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("KMS encrypt failed: {}", e)))?;

        Ok(BASE64.encode(response.ciphertext))
    }

    /// Decrypt ciphertext using KMS.
    /// Expects base64-encoded ciphertext.
    pub async fn decrypt(&self, ciphertext_b64: &str) -> Result<String, AppError> {
        use google_cloud_googleapis::cloud::kms::v1::DecryptRequest;

        #[cfg(debug_assertions)]
        {
            if self.client.is_none() {
                let bytes = BASE64.decode(ciphertext_b64).map_err(|e| {
                    AppError::Internal(anyhow::anyhow!("Base64 decode failed (mock): {}", e))
                })?;
                return String::from_utf8(bytes).map_err(|e| {
                    AppError::Internal(anyhow::anyhow!("UTF-8 decode failed (mock): {}", e))
                });
            }
        }

        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("KMS client not connected")))?;

        let ciphertext = BASE64.decode(ciphertext_b64).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Base64 decode failed: {}", e))
        })?;

        let req = DecryptRequest {
            name: self.key_path.clone(),
            ciphertext,
            ..Default::default()
        };

        let response = client
            .decrypt(req, None)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("KMS decrypt failed: {}", e)))?;

        String::from_utf8(response.plaintext)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("UTF-8 decode failed: {}", e)))
    }
}

#[async_trait]
impl SecretCodec for KmsService {
    async fn encode(&self, plain: &str) -> Result<String, AppError> {
        self.encrypt(plain).await
    }

    async fn decode(&self, stored: &str) -> Result<String, AppError> {
        self.decrypt(stored).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_codec_roundtrip_hides_plaintext() {
        let kms = KmsService::new_mock();

        let stored = kms.encode("refresh-token-value").await.unwrap();
        assert_ne!(stored, "refresh-token-value");
        assert_eq!(kms.decode(&stored).await.unwrap(), "refresh-token-value");
    }

    #[tokio::test]
    async fn test_mock_decode_rejects_garbage() {
        let kms = KmsService::new_mock();
        assert!(kms.decode("not base64 !!").await.is_err());
    }
}
