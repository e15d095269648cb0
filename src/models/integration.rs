//! Integration entity model
//!
//! This module contains the SeaORM entity model for the integrations table:
//! one tenant's delegated access to one provider. The credential column only
//! ever holds a sealed blob, and the version column drives the
//! compare-and-set write used by every state transition.

use super::provider::Entity as Provider;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::lifecycle::{HealthStatus, IntegrationStatus};

/// Integration entity representing a tenant's delegated provider access
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "integrations")]
pub struct Model {
    /// Unique identifier for the integration (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Tenant that owns this integration
    pub tenant_id: Uuid,

    /// Slug of the connected provider
    pub provider_slug: String,

    /// Lifecycle status (pending|active|expired|revoked|error)
    pub status: String,

    /// Sealed OAuth token set; never plaintext
    pub credential_ciphertext: Option<Vec<u8>>,

    /// When the stored access token expires, if the provider reported one
    pub token_expires_at: Option<DateTimeWithTimeZone>,

    /// Scopes granted at the most recent successful exchange (JSON array)
    #[sea_orm(column_type = "JsonBinary")]
    pub scopes_granted: Option<JsonValue>,

    /// Latest health assessment (healthy|expired|unauthorized|error)
    pub health_status: Option<String>,

    /// When the health fields were last written
    pub health_checked_at: Option<DateTimeWithTimeZone>,

    /// Short summary of the most recent health or refresh failure
    pub health_error: Option<String>,

    /// When the credential was last sealed by a successful exchange
    pub connected_at: Option<DateTimeWithTimeZone>,

    /// Optimistic concurrency counter; every transition write bumps it
    pub version: i64,

    /// User who initiated the connection
    pub created_by: Option<Uuid>,

    /// Timestamp when the integration was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the integration was last updated
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Typed view of the status column. Unknown text maps to `Error` rather
    /// than panicking on a hand-edited row.
    pub fn lifecycle_status(&self) -> IntegrationStatus {
        IntegrationStatus::parse(&self.status).unwrap_or(IntegrationStatus::Error)
    }

    /// Typed view of the health column.
    pub fn health(&self) -> Option<HealthStatus> {
        self.health_status.as_deref().and_then(HealthStatus::parse)
    }

    /// Whether the stored access token has already passed its expiry.
    pub fn token_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.token_expires_at
            .map(|expires_at| expires_at.with_timezone(&chrono::Utc) <= now)
            .unwrap_or(false)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Provider",
        from = "Column::ProviderSlug",
        to = "super::provider::Column::Slug"
    )]
    Provider,
}

impl Related<Provider> for Entity {
    fn to() -> RelationDef {
        Relation::Provider.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
