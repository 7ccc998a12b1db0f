// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Connection gate middleware.
//!
//! Runs after `require_auth`. Handlers behind it can take the usable
//! `Credential` as an extension.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::middleware::auth::AuthUser;
use crate::routes::messages;
use crate::services::Outcome;
use crate::AppState;

/// Body of a 401 sent when the user must (re)connect QuickBooks.
#[derive(Debug, Serialize)]
pub struct ConnectionRequired {
    pub error: String,
    pub reason: &'static str,
    pub redirect_url: String,
}

/// Reason reported when the gate itself fails.
pub const MIDDLEWARE_ERROR: &str = "middleware_error";

pub async fn require_connection(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    mut request: Request,
    next: Next,
) -> Response {
    let reason = match state.gate.resolve(&user.user_id).await {
        Ok(Outcome::Usable(credential)) => {
            request.extensions_mut().insert(credential);
            return next.run(request).await;
        }
        Ok(Outcome::NeedsConnection(reason)) => reason.as_str(),
        Err(e) => {
            state
                .config
                .error_policy()
                .report("QuickBooks connection check failed", &e);
            MIDDLEWARE_ERROR
        }
    };

    tracing::info!(user_id = %user.user_id, reason, "QuickBooks connection required");

    let body = ConnectionRequired {
        error: messages::connection_required(reason).to_string(),
        reason,
        redirect_url: state.config.connect_url.clone(),
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
