//! # Integrations API Library
//!
//! This library provides the core functionality for the Integrations API
//! service: the OAuth integration lifecycle (state tokens, callback
//! orchestration, credential refresh, health probes) plus the HTTP surface
//! and supporting configuration.

pub mod audit;
pub mod auth;
pub mod callback;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod health_probe;
pub mod lifecycle;
pub mod models;
pub mod providers;
pub mod repositories;
pub mod seeds;
pub mod server;
pub mod state_token;
pub mod telemetry;
pub mod token_refresh;
pub use migration;
