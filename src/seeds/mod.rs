//! Database seeding functionality
//!
//! Populates the provider catalog at startup so a fresh database can issue
//! authorization URLs without manual setup.

pub mod provider;

pub use provider::seed_providers;
