// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Closed sets of reason codes. Display text is chosen by the HTTP layer.

use serde::Serialize;
use std::fmt;

/// Why a user must (re)connect before using the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NeedsConnection {
    NoToken,
    TokenInactive,
    RefreshTokenExpired,
    RefreshFailed,
}

impl NeedsConnection {
    pub fn as_str(&self) -> &'static str {
        match self {
            NeedsConnection::NoToken => "no_token",
            NeedsConnection::TokenInactive => "token_inactive",
            NeedsConnection::RefreshTokenExpired => "refresh_token_expired",
            NeedsConnection::RefreshFailed => "refresh_failed",
        }
    }
}

impl fmt::Display for NeedsConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an OAuth callback did not produce a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackFailure {
    /// The provider redirected back with an `error` parameter
    ProviderDenied,
    MissingParameters,
    InvalidState,
    RemoteServiceError,
    Internal,
}

impl CallbackFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackFailure::ProviderDenied => "provider_denied",
            CallbackFailure::MissingParameters => "missing_parameters",
            CallbackFailure::InvalidState => "invalid_state",
            CallbackFailure::RemoteServiceError => "remote_service_error",
            CallbackFailure::Internal => "internal",
        }
    }
}

impl fmt::Display for CallbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
