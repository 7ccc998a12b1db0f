// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT session tests.
//!
//! Tokens minted by `create_jwt` must decode with the claims layout the
//! middleware expects, so a change on either side fails here first.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use qbo_connect::middleware::auth::{create_jwt, verify_jwt, Claims};
use std::time::{SystemTime, UNIX_EPOCH};

const KEY: &[u8] = b"test_signing_key_32_bytes_long!!";

fn now_secs() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize
}

#[test]
fn test_jwt_claims_layout() {
    let token = create_jwt("user-7f3a", KEY).unwrap();

    let token_data = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(KEY),
        &Validation::new(Algorithm::HS256),
    )
    .expect("Failed to decode JWT - check Claims struct compatibility");

    assert_eq!(token_data.claims.sub, "user-7f3a");
    assert!(token_data.claims.exp > token_data.claims.iat);
}

#[test]
fn test_jwt_expiration_is_future() {
    let token = create_jwt("u1", KEY).unwrap();

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false; // We'll check manually
    let token_data = decode::<Claims>(&token, &DecodingKey::from_secret(KEY), &validation).unwrap();

    // Token should expire about a week out
    assert!(token_data.claims.exp > now_secs() + 86400 * 6);
    assert!(token_data.claims.exp <= now_secs() + 86400 * 7 + 5);
}

#[test]
fn test_expired_jwt_is_rejected() {
    let now = now_secs();
    let claims = Claims {
        sub: "u1".to_string(),
        iat: now - 7200,
        exp: now - 3600,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(KEY),
    )
    .unwrap();

    assert_eq!(verify_jwt(&token, KEY), None);
}

#[test]
fn test_empty_subject_is_rejected() {
    let now = now_secs();
    let claims = Claims {
        sub: String::new(),
        iat: now,
        exp: now + 3600,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(KEY),
    )
    .unwrap();

    assert_eq!(verify_jwt(&token, KEY), None);
}
