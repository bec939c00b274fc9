//! SQLx row types for the cdp-postgres adapter.
//!
//! Each row struct derives `sqlx::FromRow` and provides `impl From<Row>
//! for <core type>`. This keeps `sqlx` out of `cdp-core`: row shape lives
//! here, pure domain types live in `cdp-core::types`, and the `From`
//! impls are the only thing that bridges them.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use cdp_core::types::{
    AliasKind, Event, FlagDefinition, SegmentDefinition, SegmentExportRow, TraitDefinition,
    UserSegment, UserSummary, UserTrait,
};
use cdp_types::Value;

/// Parse an `AliasKind` from its Postgres wire string (the `aliases.kind`
/// column; no Postgres enum type, just a `text` column constrained by a
/// `CHECK`).
pub fn parse_alias_kind(s: &str) -> AliasKind {
    match s {
        "device_id" => AliasKind::DeviceId,
        "external_id" => AliasKind::ExternalId,
        "email_hash" => AliasKind::EmailHash,
        other => panic!("unknown alias kind in database: {other}"),
    }
}

/// Encode an `AliasKind` to its Postgres wire string.
pub fn encode_alias_kind(kind: AliasKind) -> &'static str {
    match kind {
        AliasKind::DeviceId => "device_id",
        AliasKind::ExternalId => "external_id",
        AliasKind::EmailHash => "email_hash",
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PgEventRow {
    pub id: i64,
    pub user_id: Uuid,
    pub ts: DateTime<Utc>,
    pub name: String,
    pub props: Option<serde_json::Value>,
}

impl From<PgEventRow> for Event {
    fn from(row: PgEventRow) -> Self {
        Event {
            id: row.id,
            user_id: row.user_id,
            ts: row.ts,
            name: row.name,
            props: row.props.and_then(|v| match v {
                serde_json::Value::Object(map) => Some(map.into_iter().collect()),
                _ => None,
            }),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PgTraitDefinitionRow {
    pub key: String,
    pub expression: String,
    pub updated_at: DateTime<Utc>,
}

impl From<PgTraitDefinitionRow> for TraitDefinition {
    fn from(row: PgTraitDefinitionRow) -> Self {
        TraitDefinition {
            key: row.key,
            expression: row.expression,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PgSegmentDefinitionRow {
    pub key: String,
    pub rule: String,
    pub updated_at: DateTime<Utc>,
}

impl From<PgSegmentDefinitionRow> for SegmentDefinition {
    fn from(row: PgSegmentDefinitionRow) -> Self {
        SegmentDefinition {
            key: row.key,
            rule: row.rule,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PgFlagDefinitionRow {
    pub key: String,
    pub rule: String,
}

impl From<PgFlagDefinitionRow> for FlagDefinition {
    fn from(row: PgFlagDefinitionRow) -> Self {
        FlagDefinition {
            key: row.key,
            rule: row.rule,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PgUserTraitRow {
    pub user_id: Uuid,
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl From<PgUserTraitRow> for UserTrait {
    fn from(row: PgUserTraitRow) -> Self {
        UserTrait {
            user_id: row.user_id,
            key: row.key,
            value: Value::from(row.value),
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PgUserSegmentRow {
    pub user_id: Uuid,
    pub key: String,
    pub in_segment: bool,
    pub since: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<PgUserSegmentRow> for UserSegment {
    fn from(row: PgUserSegmentRow) -> Self {
        UserSegment {
            user_id: row.user_id,
            key: row.key,
            in_segment: row.in_segment,
            since: row.since,
            updated_at: row.updated_at,
        }
    }
}

/// Row shape shared by `search_users` and the segment export query: a user
/// joined against its (at most one per kind) aliases via correlated
/// subqueries.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PgUserSummaryRow {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub device_id: Option<String>,
    pub external_id: Option<String>,
    pub email_hash: Option<String>,
}

impl From<PgUserSummaryRow> for UserSummary {
    fn from(row: PgUserSummaryRow) -> Self {
        UserSummary {
            id: row.id,
            created_at: row.created_at,
            device_id: row.device_id,
            external_id: row.external_id,
            email_hash: row.email_hash,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PgSegmentExportRow {
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub in_segment: bool,
    pub since: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub device_id: Option<String>,
    pub external_id: Option<String>,
    pub email_hash: Option<String>,
}

impl From<PgSegmentExportRow> for SegmentExportRow {
    fn from(row: PgSegmentExportRow) -> Self {
        SegmentExportRow {
            user_id: row.user_id,
            created_at: row.created_at,
            in_segment: row.in_segment,
            since: row.since,
            updated_at: row.updated_at,
            device_id: row.device_id,
            external_id: row.external_id,
            email_hash: row.email_hash,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PgAdminMetricsRow {
    pub user_count: i64,
    pub event_count: i64,
    pub trait_definition_count: i64,
    pub segment_definition_count: i64,
    pub flag_definition_count: i64,
}
