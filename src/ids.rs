// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Random identifiers and secrets.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::AppError;

/// Entropy of an OAuth state token (256 bits).
pub const STATE_TOKEN_BYTES: usize = 32;

/// Entropy of a row identifier.
pub const ROW_ID_BYTES: usize = 16;

fn random_bytes(len: usize) -> Result<Vec<u8>, AppError> {
    let mut buf = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG failure")))?;
    Ok(buf)
}

/// URL-safe random token, suitable for embedding in a query string.
pub fn random_token(len: usize) -> Result<String, AppError> {
    Ok(URL_SAFE_NO_PAD.encode(random_bytes(len)?))
}

/// Lowercase hex row identifier.
pub fn new_row_id() -> Result<String, AppError> {
    Ok(hex::encode(random_bytes(ROW_ID_BYTES)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique_and_url_safe() {
        let a = random_token(STATE_TOKEN_BYTES).unwrap();
        let b = random_token(STATE_TOKEN_BYTES).unwrap();

        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_row_id_is_hex() {
        let id = new_row_id().unwrap();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
