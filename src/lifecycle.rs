//! Integration lifecycle state machine
//!
//! Pure status logic for integrations: the status and health enums stored on
//! the row (persisted as lowercase text) and the transition rules consulted
//! before a row changes status.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle status of an integration.
///
/// `Pending` rows have never completed a callback. `Active` rows hold a
/// sealed credential. `Expired` and `Error` rows can return to `Active`
/// through a successful refresh or re-link. `Revoked` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    Pending,
    Active,
    Expired,
    Revoked,
    Error,
}

impl IntegrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationStatus::Pending => "pending",
            IntegrationStatus::Active => "active",
            IntegrationStatus::Expired => "expired",
            IntegrationStatus::Revoked => "revoked",
            IntegrationStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(IntegrationStatus::Pending),
            "active" => Some(IntegrationStatus::Active),
            "expired" => Some(IntegrationStatus::Expired),
            "revoked" => Some(IntegrationStatus::Revoked),
            "error" => Some(IntegrationStatus::Error),
            _ => None,
        }
    }

    /// A terminal row never changes status again through this core.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IntegrationStatus::Revoked)
    }

    /// Whether an inbound callback may (re-)link this integration.
    ///
    /// An already-active row keeps its credential; a second link for it is
    /// treated as a replay or duplicate upstream, never as a re-seal.
    pub fn accepts_callback(&self) -> bool {
        *self != IntegrationStatus::Active && can_transition(*self, IntegrationStatus::Active)
    }
}

/// Result of the most recent liveness assessment of a stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Expired,
    Unauthorized,
    Error,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Expired => "expired",
            HealthStatus::Unauthorized => "unauthorized",
            HealthStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "healthy" => Some(HealthStatus::Healthy),
            "expired" => Some(HealthStatus::Expired),
            "unauthorized" => Some(HealthStatus::Unauthorized),
            "error" => Some(HealthStatus::Error),
            _ => None,
        }
    }
}

/// Returns whether `from -> to` is a legal lifecycle transition.
///
/// Writing the same status again (a credential re-seal on an already-active
/// row, a repeated error) counts as legal. `Revoked` accepts nothing.
pub fn can_transition(from: IntegrationStatus, to: IntegrationStatus) -> bool {
    use IntegrationStatus::*;

    if from == to {
        return !from.is_terminal();
    }

    match (from, to) {
        (Pending, Active) => true,
        (Pending, Error) => true,
        (Active, Expired) | (Active, Revoked) | (Active, Error) => true,
        (Expired, Active) | (Expired, Revoked) | (Expired, Error) => true,
        (Error, Active) | (Error, Revoked) | (Error, Expired) => true,
        (Revoked, _) => false,
        _ => false,
    }
}
