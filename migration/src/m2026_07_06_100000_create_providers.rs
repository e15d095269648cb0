//! Migration to create the providers table.
//!
//! The providers table is the catalog of OAuth2 cloud providers this service
//! can connect to: endpoint URLs, client credentials, scopes, and the extra
//! authorize-URL parameters a provider expects.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Providers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Providers::Slug)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Providers::DisplayName).text().not_null())
                    .col(ColumnDef::new(Providers::AuthUrl).text().not_null())
                    .col(ColumnDef::new(Providers::TokenUrl).text().not_null())
                    .col(
                        ColumnDef::new(Providers::Scopes)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Providers::ClientId).text().not_null())
                    .col(ColumnDef::new(Providers::ClientSecret).text().not_null())
                    .col(
                        ColumnDef::new(Providers::GrantType)
                            .text()
                            .not_null()
                            .default("authorization_code"),
                    )
                    .col(
                        ColumnDef::new(Providers::TokenMethod)
                            .text()
                            .not_null()
                            .default("post"),
                    )
                    .col(ColumnDef::new(Providers::ProbeUrl).text().not_null())
                    .col(ColumnDef::new(Providers::ExtraParams).json_binary().null())
                    .col(
                        ColumnDef::new(Providers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Providers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Providers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Providers {
    Table,
    Slug,
    DisplayName,
    AuthUrl,
    TokenUrl,
    Scopes,
    ClientId,
    ClientSecret,
    GrantType,
    TokenMethod,
    ProbeUrl,
    ExtraParams,
    CreatedAt,
    UpdatedAt,
}
