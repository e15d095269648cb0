//! Migration to create the integrations table.
//!
//! An integration is one tenant's delegated access to one provider. The
//! credential column only ever holds the sealed (AEAD-encrypted) token set,
//! and the version column backs the compare-and-set write every state
//! transition goes through.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Integrations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Integrations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Integrations::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Integrations::ProviderSlug).text().not_null())
                    .col(
                        ColumnDef::new(Integrations::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Integrations::CredentialCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Integrations::TokenExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Integrations::ScopesGranted)
                            .json_binary()
                            .null(),
                    )
                    .col(ColumnDef::new(Integrations::HealthStatus).text().null())
                    .col(
                        ColumnDef::new(Integrations::HealthCheckedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Integrations::HealthError).text().null())
                    .col(
                        ColumnDef::new(Integrations::ConnectedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Integrations::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Integrations::CreatedBy).uuid().null())
                    .col(
                        ColumnDef::new(Integrations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Integrations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_integrations_provider_slug")
                            .from(Integrations::Table, Integrations::ProviderSlug)
                            .to(Providers::Table, Providers::Slug)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One integration per tenant/provider pair
        manager
            .create_index(
                Index::create()
                    .name("idx_integrations_tenant_provider")
                    .table(Integrations::Table)
                    .col(Integrations::TenantId)
                    .col(Integrations::ProviderSlug)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Tenant isolation queries
        manager
            .create_index(
                Index::create()
                    .name("idx_integrations_tenant_id")
                    .table(Integrations::Table)
                    .col(Integrations::TenantId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop indexes first
        manager
            .drop_index(
                Index::drop()
                    .name("idx_integrations_tenant_provider")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_integrations_tenant_id").to_owned())
            .await?;

        // Then drop table
        manager
            .drop_table(Table::drop().table(Integrations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Integrations {
    Table,
    Id,
    TenantId,
    ProviderSlug,
    Status,
    CredentialCiphertext,
    TokenExpiresAt,
    ScopesGranted,
    HealthStatus,
    HealthCheckedAt,
    HealthError,
    ConnectedAt,
    Version,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Providers {
    Table,
    Slug,
}
