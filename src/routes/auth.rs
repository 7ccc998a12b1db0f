// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! QuickBooks OAuth connection routes.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::middleware::auth::{require_auth, AuthUser};
use crate::routes::messages;
use crate::services::{CallbackOutcome, CallbackParams};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;

pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // The callback carries its own proof of identity in the state token.
    let public = Router::new().route("/quickbooks/callback", get(callback));

    let protected = Router::new()
        .route("/quickbooks/connect", get(connect))
        .route("/quickbooks/disconnect", post(disconnect))
        .route("/quickbooks/status", get(status))
        .route("/quickbooks/refresh-token", post(refresh_token))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    public.merge(protected)
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"))
}

/// Append `key=value` to `url`, URL-encoding the value.
fn with_query(url: &str, key: &str, value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", url, separator, key, urlencoding::encode(value))
}

// ─── Connect ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ConnectResponse {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

/// Start the OAuth flow. Already-connected users are sent straight on.
async fn connect(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
) -> Result<Response> {
    match state.manager.begin_authorization(&user.user_id).await {
        Ok(request) => {
            tracing::info!(user_id = %user.user_id, "Starting QuickBooks OAuth flow");
            if wants_json(&headers) {
                return Ok(Json(ConnectResponse {
                    connected: false,
                    authorization_url: Some(request.url),
                    message: None,
                })
                .into_response());
            }
            Ok(Redirect::temporary(&request.url).into_response())
        }
        Err(AppError::AlreadyConnected) => {
            if wants_json(&headers) {
                return Ok(Json(ConnectResponse {
                    connected: true,
                    authorization_url: None,
                    message: Some(messages::ALREADY_CONNECTED),
                })
                .into_response());
            }
            let target = with_query(
                &state.config.success_url,
                "message",
                messages::ALREADY_CONNECTED,
            );
            Ok(Redirect::to(&target).into_response())
        }
        Err(e) => Err(e),
    }
}

// ─── Callback ────────────────────────────────────────────────

async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    match state.manager.handle_callback(params).await {
        CallbackOutcome::Connected {
            user_id,
            realm_id,
            redirect_to,
            message,
            ..
        } => {
            tracing::info!(%user_id, %realm_id, "QuickBooks connected");
            Redirect::to(&with_query(&redirect_to, "message", &message))
        }
        CallbackOutcome::Failed {
            reason,
            detail,
            redirect_to,
        } => {
            let message = detail.unwrap_or_else(|| messages::callback_failure(reason).to_string());
            Redirect::to(&with_query(&redirect_to, "message", &message))
        }
    }
}

// ─── Disconnect ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct DisconnectResponse {
    pub success: bool,
    pub message: &'static str,
}

async fn disconnect(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DisconnectResponse>> {
    state.manager.disconnect(&user.user_id).await?;
    Ok(Json(DisconnectResponse {
        success: true,
        message: messages::DISCONNECTED,
    }))
}

// ─── Status ──────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub connected: bool,
    pub company_name: Option<String>,
    pub realm_id: Option<String>,
    pub access_token_expires_at: Option<String>,
    pub refresh_token_expires_at: Option<String>,
    pub needs_refresh: bool,
}

async fn status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<StatusResponse>> {
    let status = state.manager.connection_status(&user.user_id).await?;
    Ok(Json(StatusResponse {
        connected: status.connected,
        company_name: status.company_name,
        realm_id: status.realm_id,
        access_token_expires_at: status.access_token_expires_at.map(format_utc_rfc3339),
        refresh_token_expires_at: status.refresh_token_expires_at.map(format_utc_rfc3339),
        needs_refresh: status.needs_refresh,
    }))
}

// ─── Refresh ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub message: &'static str,
    pub access_token_expires_at: String,
}

async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<RefreshResponse>> {
    let credential = state.manager.refresh_for_user(&user.user_id).await?;
    Ok(Json(RefreshResponse {
        success: true,
        message: messages::REFRESHED,
        access_token_expires_at: format_utc_rfc3339(credential.access_expires_at),
    }))
}
