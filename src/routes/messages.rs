// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User-facing text for reason codes.

use crate::models::CallbackFailure;

pub const ALREADY_CONNECTED: &str = "You are already connected to QuickBooks.";
pub const DISCONNECTED: &str = "Successfully disconnected from QuickBooks";
pub const REFRESHED: &str = "Token refreshed successfully";

/// Text for a `NeedsConnection` reason code (or the gate's own failure).
pub fn connection_required(reason: &str) -> &'static str {
    match reason {
        "no_token" => "You are not authorized to access QuickBooks data.",
        "token_inactive" => "Invalid QuickBooks token. Please reconnect to your QuickBooks account.",
        "refresh_token_expired" | "refresh_failed" => {
            "Your QuickBooks connection has expired. Please reconnect to continue."
        }
        "middleware_error" => "Failed to connect to QuickBooks. Please try again later.",
        _ => "QuickBooks authentication required.",
    }
}

pub fn callback_failure(reason: CallbackFailure) -> &'static str {
    match reason {
        CallbackFailure::ProviderDenied => "QuickBooks authorization was denied.",
        CallbackFailure::MissingParameters => {
            "The QuickBooks response was incomplete. Please start the connection again."
        }
        CallbackFailure::InvalidState => {
            "The connection request expired or was already used. Please start again."
        }
        CallbackFailure::RemoteServiceError => {
            "An error occurred while communicating with QuickBooks. Please try again."
        }
        CallbackFailure::Internal => "Failed to connect to QuickBooks. Please try again later.",
    }
}
