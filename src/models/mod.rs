//! # Data Models
//!
//! This module contains all the data models used throughout the Integrations API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod integration;
pub mod provider;

pub use integration::Entity as Integration;
pub use provider::Entity as Provider;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "integrations".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
