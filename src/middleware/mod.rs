// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (session authentication, QuickBooks connection gate).

pub mod auth;
pub mod connection;

pub use auth::require_auth;
pub use connection::require_connection;
