//! Provider adapters
//!
//! This module provides the OAuth provider integration layer including:
//! - The `ProviderAdapter` trait defining the interface all adapters implement
//! - A catalog-driven standard adapter for plain authorization-code providers
//! - Dedicated adapters for providers with protocol quirks
//! - The adapter registry for lookup by slug

pub mod adapter;
pub mod google_drive;
pub mod registry;
pub mod standard;

pub use adapter::{AdapterError, ProbeOutcome, ProviderAdapter};
pub use google_drive::{GOOGLE_DRIVE_SLUG, GoogleDriveAdapter};
pub use registry::{AdapterRegistry, build_http_client};
pub use standard::StandardAdapter;
