//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM operations
//! for database entities, providing a clean API for data access with tenant-aware methods.

pub mod integration;
pub mod provider;

pub use integration::IntegrationRepository;
pub use provider::ProviderRepository;
