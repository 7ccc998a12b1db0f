// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth token lifecycle: authorization, code exchange, refresh, revocation.
//!
//! A credential moves through
//! `PENDING (state issued) -> ACTIVE -> ACTIVE (access expired) -> ACTIVE (refreshed) -> ... -> INACTIVE`.
//! `INACTIVE` is terminal for a row; reconnecting creates a new one.

use chrono::Utc;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::{AppError, ErrorPolicy, RemoteServiceError};
use crate::ids::new_row_id;
use crate::models::{CallbackFailure, ConnectionStatus, Credential, NeedsConnection};
use crate::services::oauth_state::OAuthStateStore;
use crate::services::qbo::{AccountingApi, ApiSession, AUTHORIZE_URL};
use crate::services::token_store::TokenStore;
use crate::time_utils::expires_after;

/// Per-user mutex to serialize token refresh operations.
pub type RefreshLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Authorization URL together with the state token embedded in it.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Query parameters delivered to the OAuth callback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, rename = "realmId")]
    pub realm_id: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Result of handling an OAuth callback.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    Connected {
        user_id: String,
        realm_id: String,
        company_name: Option<String>,
        redirect_to: String,
        message: String,
    },
    Failed {
        reason: CallbackFailure,
        /// Provider or internal error text, only when detailed errors are on
        detail: Option<String>,
        redirect_to: String,
    },
}

/// Orchestrates the OAuth flow and keeps stored credentials fresh.
#[derive(Clone)]
pub struct TokenLifecycleManager {
    config: Arc<Config>,
    tokens: TokenStore,
    states: OAuthStateStore,
    api: Arc<dyn AccountingApi>,
    refresh_locks: RefreshLocks,
}

impl TokenLifecycleManager {
    pub fn new(
        config: Arc<Config>,
        tokens: TokenStore,
        states: OAuthStateStore,
        api: Arc<dyn AccountingApi>,
    ) -> Self {
        Self {
            config,
            tokens,
            states,
            api,
            refresh_locks: Arc::new(DashMap::new()),
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.config.error_policy()
    }

    pub fn auto_refresh(&self) -> bool {
        self.config.auto_refresh
    }

    /// Mutex serializing credential changes for `user_id`: refresh,
    /// reconnect and disconnect.
    pub fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ─── Authorization ───────────────────────────────────────────────────────

    /// Consent URL for the configured client. No state parameter.
    pub fn build_authorization_url(&self) -> String {
        format!(
            "{}?client_id={}&response_type=code&scope={}&redirect_uri={}",
            AUTHORIZE_URL,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.scope),
            urlencoding::encode(&self.config.redirect_uri),
        )
    }

    /// Issue a fresh state for the user and return the consent URL carrying
    /// it. Previous states for the user stop being valid.
    pub async fn begin_authorization(&self, user_id: &str) -> Result<AuthorizationRequest, AppError> {
        if let Some(existing) = self.tokens.latest_active(user_id).await? {
            if existing.is_valid() {
                tracing::info!(user_id, realm_id = %existing.realm_id, "Already connected");
                return Err(AppError::AlreadyConnected);
            }
        }

        let state = self.states.create_for_user(user_id).await?;
        let url = format!(
            "{}&state={}",
            self.build_authorization_url(),
            urlencoding::encode(&state)
        );

        tracing::info!(user_id, "Starting QuickBooks authorization");
        Ok(AuthorizationRequest { url, state })
    }

    /// Validate and consume the state, exchange the code, and store the new
    /// active credential.
    ///
    /// The state is consumed as soon as it is found, so a replayed callback
    /// fails with `InvalidState` even if this attempt fails later.
    pub async fn complete_authorization(
        &self,
        code: Option<&str>,
        realm_id: Option<&str>,
        state_token: &str,
    ) -> Result<Credential, AppError> {
        let state = self.states.consume(state_token).await?;
        let user_id = state.user_id;

        if let Err(e) = self.states.cleanup().await {
            tracing::warn!(error = %e, "OAuth state cleanup failed");
        }

        let code = code
            .filter(|c| !c.is_empty())
            .ok_or(AppError::MissingParameters("code"))?;
        let realm_id = realm_id
            .filter(|r| !r.is_empty())
            .ok_or(AppError::MissingParameters("realmId"))?;

        let pair = self.api.exchange_code(code, realm_id).await?;
        let refresh_token = pair.refresh_token.clone().ok_or_else(|| {
            RemoteServiceError::new(None, None, "Token response missing refresh_token")
        })?;

        let now = Utc::now();
        let mut credential = Credential {
            id: new_row_id()?,
            user_id: user_id.clone(),
            realm_id: realm_id.to_string(),
            access_token: pair.access_token,
            refresh_token,
            access_expires_at: expires_after(
                now,
                pair.access_expires_in,
                self.config.access_token_lifetime_secs,
            ),
            refresh_expires_at: expires_after(
                now,
                pair.refresh_expires_in,
                self.config.refresh_token_lifetime_secs,
            ),
            active: true,
            company_name: None,
            company_email: None,
            created_at: now,
            updated_at: now,
        };

        // Company info is optional.
        match self
            .api
            .fetch_account_metadata(&ApiSession::from(&credential))
            .await
        {
            Ok(meta) => {
                credential.company_name = meta.company_name;
                credential.company_email = meta.email;
            }
            Err(e) => self
                .error_policy()
                .report("Failed to retrieve company info", &AppError::Remote(e)),
        }

        {
            // Wait out any in-flight refresh so it cannot land after the swap.
            let lock = self.user_lock(&user_id);
            let _guard = lock.lock().await;
            self.tokens.create_active(&credential).await?;
        }

        tracing::info!(
            user_id = %credential.user_id,
            realm_id = %credential.realm_id,
            company = ?credential.company_name,
            "QuickBooks connection established"
        );
        Ok(credential)
    }

    // ─── Refresh / Revoke ────────────────────────────────────────────────────

    /// Exchange the refresh token for a new access token and persist it.
    ///
    /// A remote rejection deactivates the credential before the error is
    /// returned. If the credential was deactivated while the exchange was in
    /// flight, the new tokens are discarded and `NotConnected(TokenInactive)`
    /// is returned.
    pub async fn refresh(&self, credential: &Credential) -> Result<Credential, AppError> {
        if credential.is_refresh_expired() {
            return Err(AppError::RefreshTokenExpired);
        }

        tracing::info!(
            user_id = %credential.user_id,
            realm_id = %credential.realm_id,
            "Refreshing QuickBooks access token"
        );

        let pair = match self
            .api
            .refresh_token(&credential.refresh_token, &credential.realm_id)
            .await
        {
            Ok(pair) => pair,
            Err(e) => {
                if let Err(db_err) = self.tokens.deactivate(&credential.id).await {
                    tracing::error!(error = %db_err, "Failed to deactivate credential after refresh failure");
                }
                return Err(AppError::Remote(e));
            }
        };

        let now = Utc::now();
        let mut updated = credential.clone();
        updated.access_token = pair.access_token;
        updated.access_expires_at = expires_after(
            now,
            pair.access_expires_in,
            self.config.access_token_lifetime_secs,
        );
        if let Some(new_refresh) = pair.refresh_token {
            updated.refresh_token = new_refresh;
            updated.refresh_expires_at = expires_after(
                now,
                pair.refresh_expires_in,
                self.config.refresh_token_lifetime_secs,
            );
        }
        updated.updated_at = now;

        if !self.tokens.save_if_active(&updated).await? {
            tracing::warn!(
                user_id = %updated.user_id,
                credential_id = %updated.id,
                "Credential deactivated during refresh, discarding new tokens"
            );
            return Err(AppError::NotConnected(NeedsConnection::TokenInactive));
        }
        tracing::info!(user_id = %updated.user_id, "Access token refreshed");
        Ok(updated)
    }

    /// Best-effort remote revocation. Failure is reported, never raised.
    pub async fn revoke(&self, credential: &Credential) -> bool {
        match self
            .api
            .revoke(&credential.refresh_token, &credential.realm_id)
            .await
        {
            Ok(revoked) => revoked,
            Err(e) => {
                self.error_policy()
                    .report("Failed to revoke tokens", &AppError::Remote(e));
                false
            }
        }
    }

    pub fn is_access_expired(&self, credential: &Credential) -> bool {
        credential.is_access_expired()
    }

    pub fn is_refresh_expired(&self, credential: &Credential) -> bool {
        credential.is_refresh_expired()
    }

    // ─── User-level operations ───────────────────────────────────────────────

    /// Revoke remotely (best effort), then deactivate locally regardless.
    /// Returns whether there was a connection to drop.
    pub async fn disconnect(&self, user_id: &str) -> Result<bool, AppError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let Some(credential) = self.tokens.latest_active(user_id).await? else {
            return Ok(false);
        };

        let revoked = self.revoke(&credential).await;
        self.tokens.deactivate(&credential.id).await?;

        tracing::info!(user_id, revoked, "QuickBooks disconnected");
        Ok(true)
    }

    /// Explicit refresh of the user's active credential.
    pub async fn refresh_for_user(&self, user_id: &str) -> Result<Credential, AppError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let credential = self
            .tokens
            .latest_active(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No active QuickBooks token found".to_string()))?;

        if !credential.can_be_refreshed() {
            return Err(AppError::BadRequest(
                "Token cannot be refreshed".to_string(),
            ));
        }

        self.refresh(&credential).await
    }

    /// Connection summary. Missing company metadata is fetched again here.
    pub async fn connection_status(&self, user_id: &str) -> Result<ConnectionStatus, AppError> {
        let Some(mut credential) = self.tokens.latest_active(user_id).await? else {
            return Ok(ConnectionStatus::default());
        };

        if credential.company_name.is_none() && credential.is_valid() {
            match self
                .api
                .fetch_account_metadata(&ApiSession::from(&credential))
                .await
            {
                Ok(meta) if meta.company_name.is_some() => {
                    credential.company_name = meta.company_name;
                    credential.company_email = meta.email;
                    credential.updated_at = Utc::now();
                    match self.tokens.save_if_active(&credential).await {
                        Ok(true) => {}
                        Ok(false) => {
                            tracing::debug!(user_id, "Credential deactivated, company info dropped")
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, user_id, "Failed to store company info")
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => self
                    .error_policy()
                    .report("Failed to backfill company info", &AppError::Remote(e)),
            }
        }

        Ok(ConnectionStatus::from(&credential))
    }

    // ─── Callback entry ──────────────────────────────────────────────────────

    /// Map a raw callback to an outcome. Never fails; every error becomes a
    /// `Failed` outcome with a reason code.
    pub async fn handle_callback(&self, params: CallbackParams) -> CallbackOutcome {
        let policy = self.error_policy();

        if let Some(error) = params.error.as_deref() {
            let description = params
                .error_description
                .as_deref()
                .unwrap_or("Unknown OAuth error");
            tracing::warn!(error, description, "OAuth error from QuickBooks");
            let detail = policy
                .show_detailed_errors
                .then(|| format!("{}: {}", error, description));
            return self.failed(CallbackFailure::ProviderDenied, detail);
        }

        let Some(state) = params.state.as_deref().filter(|s| !s.is_empty()) else {
            let err = AppError::MissingParameters("state");
            policy.report("OAuth callback without state", &err);
            return self.failed(CallbackFailure::MissingParameters, None);
        };

        match self
            .complete_authorization(params.code.as_deref(), params.realm_id.as_deref(), state)
            .await
        {
            Ok(credential) => {
                let message = match credential.company_name.as_deref() {
                    Some(name) => format!("Successfully connected to QuickBooks ({})!", name),
                    None => "Successfully connected to QuickBooks!".to_string(),
                };
                CallbackOutcome::Connected {
                    user_id: credential.user_id,
                    realm_id: credential.realm_id,
                    company_name: credential.company_name,
                    redirect_to: self.config.success_url.clone(),
                    message,
                }
            }
            Err(err) => {
                policy.report("Error during QuickBooks OAuth callback", &err);
                let reason = match &err {
                    AppError::InvalidState => CallbackFailure::InvalidState,
                    AppError::MissingParameters(_) => CallbackFailure::MissingParameters,
                    AppError::Remote(_) => CallbackFailure::RemoteServiceError,
                    _ => CallbackFailure::Internal,
                };
                let detail = policy.show_detailed_errors.then(|| err.to_string());
                self.failed(reason, detail)
            }
        }
    }

    fn failed(&self, reason: CallbackFailure, detail: Option<String>) -> CallbackOutcome {
        let separator = if self.config.error_url.contains('?') { '&' } else { '?' };
        CallbackOutcome::Failed {
            reason,
            detail,
            redirect_to: format!("{}{}reason={}", self.config.error_url, separator, reason),
        }
    }
}
