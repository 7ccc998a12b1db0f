// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP route handlers.

pub mod auth;
pub mod messages;
pub mod sync;

use crate::middleware::{require_auth, require_connection};
use crate::AppState;
use axum::http::{header, Method};
use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub build_id: String,
}

/// Health check response
async fn health_check() -> Json<HealthResponse> {
    let build_id = option_env!("BUILD_ID").unwrap_or("unknown").to_string();
    Json(HealthResponse {
        status: "ok".to_string(),
        build_id,
    })
}

/// `scheme://host[:port]` of an absolute URL.
fn origin_of(url: &str) -> &str {
    match url.find("://") {
        Some(idx) => {
            let rest = &url[idx + 3..];
            match rest.find('/') {
                Some(end) => &url[..idx + 3 + end],
                None => url,
            }
        }
        None => url,
    }
}

/// Build the complete router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS layer - allow the frontend that hosts the success page, plus localhost (for dev)
    let frontend_origin = origin_of(&state.config.success_url).to_string();
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::AllowOrigin::predicate(
            move |origin: &axum::http::HeaderValue, _request_parts: &axum::http::request::Parts| {
                let origin_str = origin.to_str().unwrap_or("");
                origin_str == frontend_origin
                    || origin_str.starts_with("http://localhost")
                    || origin_str.starts_with("http://127.0.0.1")
            },
        ))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    // Sync routes need a session and a usable QuickBooks connection.
    // The last route_layer added runs first: auth, then the connection gate.
    let sync_routes = sync::routes()
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_connection,
        ))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health_check))
        .merge(auth::routes(state.clone()))
        .merge(sync_routes)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_of() {
        assert_eq!(
            origin_of("http://localhost:5173/dashboard"),
            "http://localhost:5173"
        );
        assert_eq!(origin_of("https://app.example.com"), "https://app.example.com");
        assert_eq!(origin_of("/relative/path"), "/relative/path");
    }
}
