// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting and expiry arithmetic.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Expiry instant for a lifetime in seconds. Prefers the provider-supplied
/// lifetime, falling back to the configured one.
pub fn expires_after(now: DateTime<Utc>, provided_secs: Option<i64>, fallback_secs: i64) -> DateTime<Utc> {
    let secs = provided_secs.filter(|s| *s > 0).unwrap_or(fallback_secs);
    now + Duration::seconds(secs)
}
