//! Provider entity model
//!
//! This module contains the SeaORM entity model for the providers table: the
//! catalog of OAuth2 cloud providers, their endpoints, client credentials,
//! and per-provider authorize-URL parameters. Read-only to the lifecycle
//! core; rows are seeded at startup.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

/// Provider entity describing one connectable cloud provider
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "providers")]
pub struct Model {
    /// Unique slug identifier for the provider (primary key)
    #[sea_orm(primary_key)]
    pub slug: String,

    /// Display name of the provider
    pub display_name: String,

    /// Authorization endpoint the user is redirected to
    pub auth_url: String,

    /// Token endpoint for code exchange and refresh
    pub token_url: String,

    /// OAuth scopes requested at authorization (JSON array of strings)
    #[sea_orm(column_type = "JsonBinary")]
    pub scopes: JsonValue,

    /// OAuth client identifier issued by the provider
    pub client_id: String,

    /// OAuth client secret issued by the provider
    pub client_secret: String,

    /// Grant type used at the token endpoint
    pub grant_type: String,

    /// HTTP method for token requests (post|get)
    pub token_method: String,

    /// Lightweight endpoint used to confirm a credential still works
    pub probe_url: String,

    /// Additional authorize-URL query parameters (JSON string map)
    #[sea_orm(column_type = "JsonBinary")]
    pub extra_params: Option<JsonValue>,

    /// Timestamp when the provider was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the provider was last updated
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Scopes as a string list, tolerating malformed rows.
    pub fn scope_list(&self) -> Vec<String> {
        self.scopes
            .as_array()
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
