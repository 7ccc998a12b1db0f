// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Token lifecycle tests: authorization, callback, refresh, revocation.

use chrono::Duration;
use qbo_connect::config::Config;
use qbo_connect::error::AppError;
use qbo_connect::models::{CallbackFailure, Credential};
use qbo_connect::services::{CallbackOutcome, CallbackParams};

mod common;
use common::{create_test_app, create_test_app_with, seed_credential, FakeAccountingApi};

fn now_plus(d: Duration) -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now() + d
}

fn credential_at(access: Duration, refresh: Duration) -> Credential {
    let now = chrono::Utc::now();
    Credential {
        id: "c".to_string(),
        user_id: "u".to_string(),
        realm_id: "r".to_string(),
        access_token: "a".to_string(),
        refresh_token: "r".to_string(),
        access_expires_at: now + access,
        refresh_expires_at: now + refresh,
        active: true,
        company_name: None,
        company_email: None,
        created_at: now,
        updated_at: now,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// EXPIRY
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_access_expiry_is_boundary_exact() {
    let credential = credential_at(Duration::hours(1), Duration::days(30));
    let at = credential.access_expires_at;

    assert!(!credential.is_access_expired_at(at - Duration::milliseconds(1)));
    assert!(credential.is_access_expired_at(at));
    assert!(credential.is_access_expired_at(at + Duration::milliseconds(1)));
}

#[test]
fn test_manager_expiry_checks() {
    let app = create_test_app();
    let expired = credential_at(Duration::seconds(-1), Duration::seconds(-1));
    let fresh = credential_at(Duration::hours(1), Duration::days(1));

    assert!(app.state.manager.is_access_expired(&expired));
    assert!(app.state.manager.is_refresh_expired(&expired));
    assert!(!app.state.manager.is_access_expired(&fresh));
    assert!(!app.state.manager.is_refresh_expired(&fresh));
}

// ═══════════════════════════════════════════════════════════════════════════
// AUTHORIZATION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_authorization_url_has_client_params() {
    let app = create_test_app();
    let url = app.state.manager.build_authorization_url();

    assert!(url.starts_with("https://appcenter.intuit.com/connect/oauth2?"));
    assert!(url.contains("client_id=test_client_id"));
    assert!(url.contains("response_type=code"));
    assert!(url.contains("scope=com.intuit.quickbooks.accounting"));
    assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fquickbooks%2Fcallback"));
    assert!(!url.contains("state="));
    assert_eq!(url, app.state.manager.build_authorization_url());
}

#[tokio::test]
async fn test_begin_authorization_embeds_state() {
    let app = create_test_app();
    let request = app.state.manager.begin_authorization("u1").await.unwrap();

    assert!(request
        .url
        .ends_with(&format!("&state={}", urlencoding::encode(&request.state))));
    assert!(request.state.len() >= 43);
}

#[tokio::test]
async fn test_begin_authorization_twice_keeps_only_latest_state() {
    let app = create_test_app();
    let manager = &app.state.manager;

    let first = manager.begin_authorization("u1").await.unwrap();
    let second = manager.begin_authorization("u1").await.unwrap();
    assert_ne!(first.state, second.state);

    let err = manager
        .complete_authorization(Some("code"), Some("realm"), &first.state)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState));

    manager
        .complete_authorization(Some("code"), Some("realm"), &second.state)
        .await
        .expect("Latest state should be valid");
}

#[tokio::test]
async fn test_begin_authorization_when_connected() {
    let app = create_test_app();
    seed_credential(&app.state, "u1", Duration::hours(1), Duration::days(30)).await;

    let err = app.state.manager.begin_authorization("u1").await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyConnected));

    // An expired access token does not count as connected.
    seed_credential(&app.state, "u2", Duration::seconds(-5), Duration::days(30)).await;
    assert!(app.state.manager.begin_authorization("u2").await.is_ok());
}

// ═══════════════════════════════════════════════════════════════════════════
// CODE EXCHANGE
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_complete_authorization_stores_active_credential() {
    let app = create_test_app();
    let manager = &app.state.manager;
    let request = manager.begin_authorization("u1").await.unwrap();

    let credential = manager
        .complete_authorization(Some("abc"), Some("4620816365"), &request.state)
        .await
        .unwrap();

    assert_eq!(credential.user_id, "u1");
    assert_eq!(credential.realm_id, "4620816365");
    assert!(credential.active);
    assert_eq!(credential.company_name.as_deref(), Some("Sandbox Company_US_1"));
    assert!(credential.access_expires_at > now_plus(Duration::minutes(59)));
    assert!(credential.refresh_expires_at > now_plus(Duration::days(100)));

    let stored = manager.tokens().latest_active("u1").await.unwrap().unwrap();
    assert_eq!(stored.id, credential.id);
    assert_eq!(stored.access_token, credential.access_token);
}

#[tokio::test]
async fn test_state_cannot_be_consumed_twice() {
    let app = create_test_app();
    let manager = &app.state.manager;
    let request = manager.begin_authorization("u1").await.unwrap();

    manager
        .complete_authorization(Some("abc"), Some("realm"), &request.state)
        .await
        .unwrap();
    let err = manager
        .complete_authorization(Some("abc"), Some("realm"), &request.state)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidState));
    assert_eq!(FakeAccountingApi::count(&app.api.exchange_calls), 1);
}

#[tokio::test]
async fn test_concurrent_callbacks_only_one_wins() {
    let app = create_test_app();
    let manager = app.state.manager.clone();
    let request = manager.begin_authorization("u1").await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            let state = request.state.clone();
            tokio::spawn(async move {
                manager
                    .complete_authorization(Some("abc"), Some("realm"), &state)
                    .await
            })
        })
        .collect();

    let mut ok = 0;
    let mut invalid = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(AppError::InvalidState) => invalid += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(ok, 1);
    assert_eq!(invalid, 7);
    assert_eq!(manager.tokens().count_active("u1").await.unwrap(), 1);
}

#[tokio::test]
async fn test_missing_parameters_still_consume_state() {
    let app = create_test_app();
    let manager = &app.state.manager;
    let request = manager.begin_authorization("u1").await.unwrap();

    let err = manager
        .complete_authorization(None, Some("realm"), &request.state)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingParameters("code")));

    let err = manager
        .complete_authorization(Some("abc"), Some("realm"), &request.state)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState));
    assert_eq!(FakeAccountingApi::count(&app.api.exchange_calls), 0);
}

#[tokio::test]
async fn test_missing_realm_is_reported() {
    let app = create_test_app();
    let manager = &app.state.manager;
    let request = manager.begin_authorization("u1").await.unwrap();

    let err = manager
        .complete_authorization(Some("abc"), Some(""), &request.state)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingParameters("realmId")));
}

#[tokio::test]
async fn test_metadata_failure_is_not_fatal() {
    let app = create_test_app();
    FakeAccountingApi::set(&app.api.fail_metadata, true);
    let manager = &app.state.manager;
    let request = manager.begin_authorization("u1").await.unwrap();

    let credential = manager
        .complete_authorization(Some("abc"), Some("realm"), &request.state)
        .await
        .expect("Metadata failure must not fail the connection");
    assert!(credential.company_name.is_none());

    // Retried on the next status check.
    FakeAccountingApi::set(&app.api.fail_metadata, false);
    let status = manager.connection_status("u1").await.unwrap();
    assert!(status.connected);
    assert_eq!(status.company_name.as_deref(), Some("Sandbox Company_US_1"));

    let stored = manager.tokens().latest_active("u1").await.unwrap().unwrap();
    assert_eq!(stored.company_name.as_deref(), Some("Sandbox Company_US_1"));
}

#[tokio::test]
async fn test_reconnect_leaves_exactly_one_active() {
    let app = create_test_app();
    let manager = &app.state.manager;
    seed_credential(&app.state, "u1", Duration::seconds(-1), Duration::days(30)).await;
    seed_credential(&app.state, "u1", Duration::seconds(-1), Duration::days(30)).await;
    assert_eq!(manager.tokens().count_active("u1").await.unwrap(), 1);

    let request = manager.begin_authorization("u1").await.unwrap();
    manager
        .complete_authorization(Some("abc"), Some("realm"), &request.state)
        .await
        .unwrap();

    assert_eq!(manager.tokens().count_active("u1").await.unwrap(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// REFRESH
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_refresh_updates_access_token_only() {
    let app = create_test_app();
    let seeded =
        seed_credential(&app.state, "u1", Duration::seconds(-10), Duration::days(30)).await;

    let refreshed = app.state.manager.refresh(&seeded).await.unwrap();

    assert_ne!(refreshed.access_token, seeded.access_token);
    assert!(refreshed.access_expires_at > seeded.access_expires_at);
    assert_eq!(refreshed.refresh_token, seeded.refresh_token);
    assert_eq!(refreshed.refresh_expires_at, seeded.refresh_expires_at);

    let stored = app.state.manager.tokens().get(&seeded.id).await.unwrap().unwrap();
    assert_eq!(stored.access_token, refreshed.access_token);
}

#[tokio::test]
async fn test_refresh_rotates_refresh_token_when_issued() {
    let app = create_test_app();
    FakeAccountingApi::set(&app.api.rotate_refresh_token, true);
    let seeded = seed_credential(&app.state, "u1", Duration::seconds(-10), Duration::days(2)).await;

    let refreshed = app.state.manager.refresh(&seeded).await.unwrap();

    assert_ne!(refreshed.refresh_token, seeded.refresh_token);
    assert!(refreshed.refresh_expires_at > seeded.refresh_expires_at);
}

#[tokio::test]
async fn test_refresh_with_expired_refresh_token() {
    let app = create_test_app();
    let seeded =
        seed_credential(&app.state, "u1", Duration::seconds(-10), Duration::seconds(-1)).await;

    let err = app.state.manager.refresh(&seeded).await.unwrap_err();

    assert!(matches!(err, AppError::RefreshTokenExpired));
    assert_eq!(FakeAccountingApi::count(&app.api.refresh_calls), 0);
}

#[tokio::test]
async fn test_refresh_rejection_deactivates_credential() {
    let app = create_test_app();
    FakeAccountingApi::set(&app.api.fail_refresh, true);
    let seeded =
        seed_credential(&app.state, "u1", Duration::seconds(-10), Duration::days(30)).await;

    let err = app.state.manager.refresh(&seeded).await.unwrap_err();

    assert!(matches!(err, AppError::Remote(_)));
    let stored = app.state.manager.tokens().get(&seeded.id).await.unwrap().unwrap();
    assert!(!stored.active);
}

#[tokio::test]
async fn test_refresh_for_user_errors() {
    let app = create_test_app();
    let manager = &app.state.manager;

    let err = manager.refresh_for_user("nobody").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    seed_credential(&app.state, "u1", Duration::seconds(-10), Duration::seconds(-1)).await;
    let err = manager.refresh_for_user("u1").await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

// ═══════════════════════════════════════════════════════════════════════════
// REVOKE / DISCONNECT
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_disconnect_deactivates_even_if_revoke_fails() {
    let app = create_test_app();
    FakeAccountingApi::set(&app.api.fail_revoke, true);
    let seeded = seed_credential(&app.state, "u1", Duration::hours(1), Duration::days(30)).await;

    assert!(!app.state.manager.revoke(&seeded).await);
    assert!(app.state.manager.disconnect("u1").await.unwrap());

    assert_eq!(FakeAccountingApi::count(&app.api.revoke_calls), 2);
    assert_eq!(app.state.manager.tokens().count_active("u1").await.unwrap(), 0);
    assert!(!app.state.manager.connection_status("u1").await.unwrap().connected);
}

#[tokio::test]
async fn test_disconnect_without_connection() {
    let app = create_test_app();
    assert!(!app.state.manager.disconnect("u1").await.unwrap());
    assert_eq!(FakeAccountingApi::count(&app.api.revoke_calls), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// CALLBACK ENTRY
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_callback_provider_error_skips_exchange() {
    let app = create_test_app();
    let request = app.state.manager.begin_authorization("u1").await.unwrap();

    let outcome = app
        .state
        .manager
        .handle_callback(CallbackParams {
            code: Some("abc".to_string()),
            realm_id: Some("realm".to_string()),
            state: Some(request.state),
            error: Some("access_denied".to_string()),
            error_description: Some("User denied".to_string()),
        })
        .await;

    match outcome {
        CallbackOutcome::Failed {
            reason,
            detail,
            redirect_to,
        } => {
            assert_eq!(reason, CallbackFailure::ProviderDenied);
            assert!(detail.is_none(), "Provider text is hidden by default");
            assert!(redirect_to.ends_with("?reason=provider_denied"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(FakeAccountingApi::count(&app.api.exchange_calls), 0);
}

#[tokio::test]
async fn test_callback_detailed_errors_when_enabled() {
    let config = Config {
        show_detailed_errors: true,
        ..Config::test_default()
    };
    let app = create_test_app_with(config);
    FakeAccountingApi::set(&app.api.fail_exchange, true);
    let request = app.state.manager.begin_authorization("u1").await.unwrap();

    let outcome = app
        .state
        .manager
        .handle_callback(CallbackParams {
            code: Some("bad".to_string()),
            realm_id: Some("realm".to_string()),
            state: Some(request.state),
            ..Default::default()
        })
        .await;

    match outcome {
        CallbackOutcome::Failed { reason, detail, .. } => {
            assert_eq!(reason, CallbackFailure::RemoteServiceError);
            assert!(detail.unwrap().contains("Invalid authorization code"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_callback_success_message_names_company() {
    let app = create_test_app();
    let request = app.state.manager.begin_authorization("u1").await.unwrap();

    let outcome = app
        .state
        .manager
        .handle_callback(CallbackParams {
            code: Some("abc".to_string()),
            realm_id: Some("realm".to_string()),
            state: Some(request.state),
            ..Default::default()
        })
        .await;

    match outcome {
        CallbackOutcome::Connected {
            user_id,
            redirect_to,
            message,
            ..
        } => {
            assert_eq!(user_id, "u1");
            assert_eq!(redirect_to, app.state.config.success_url);
            assert!(message.contains("Sandbox Company_US_1"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_callback_without_state() {
    let app = create_test_app();
    let outcome = app
        .state
        .manager
        .handle_callback(CallbackParams {
            code: Some("abc".to_string()),
            realm_id: Some("realm".to_string()),
            ..Default::default()
        })
        .await;

    assert!(matches!(
        outcome,
        CallbackOutcome::Failed {
            reason: CallbackFailure::MissingParameters,
            ..
        }
    ));
}
