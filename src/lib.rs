// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! QBO-Connect: QuickBooks Online OAuth lifecycle and entity sync
//!
//! This crate keeps per-user QuickBooks credentials fresh (authorization,
//! code exchange, on-demand refresh, revocation) and moves local records
//! to and from the QuickBooks accounting API through per-entity adapters.

pub mod config;
pub mod db;
pub mod error;
pub mod ids;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use services::{AccessGate, AdapterRegistry, SyncEngine, TokenLifecycleManager};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Arc<Config>,
    pub manager: TokenLifecycleManager,
    pub gate: AccessGate,
    pub sync: SyncEngine,
    pub registry: AdapterRegistry,
}
