//! Database migrations for the Integrations API.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_07_06_100000_create_providers;
mod m2026_07_06_100100_create_integrations;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_07_06_100000_create_providers::Migration),
            Box::new(m2026_07_06_100100_create_integrations::Migration),
        ]
    }
}
