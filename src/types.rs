//! Domain types (§3): User, Alias, Event, the three definition kinds, and
//! the two derived-state rows (UserTrait, UserSegment).

use std::collections::BTreeMap;

use cdp_types::{Props, Timestamp, UserId, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AliasKind {
    DeviceId,
    ExternalId,
    EmailHash,
}

impl AliasKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AliasKind::DeviceId => "deviceId",
            AliasKind::ExternalId => "externalId",
            AliasKind::EmailHash => "emailHash",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alias {
    pub kind: AliasKind,
    pub value: String,
    pub user_id: UserId,
}

/// The three alias kinds a `track`/`identify` call may supply, tried in
/// this order by the identity resolver (§4.2).
#[derive(Debug, Clone, Default)]
pub struct AliasSet {
    pub device_id: Option<String>,
    pub external_id: Option<String>,
    pub email_hash: Option<String>,
}

impl AliasSet {
    pub fn is_empty(&self) -> bool {
        self.device_id.is_none() && self.external_id.is_none() && self.email_hash.is_none()
    }

    /// (kind, value) pairs in resolution order, skipping unset aliases.
    pub fn ordered(&self) -> Vec<(AliasKind, &str)> {
        let mut out = Vec::with_capacity(3);
        if let Some(v) = &self.device_id {
            out.push((AliasKind::DeviceId, v.as_str()));
        }
        if let Some(v) = &self.external_id {
            out.push((AliasKind::ExternalId, v.as_str()));
        }
        if let Some(v) = &self.email_hash {
            out.push((AliasKind::EmailHash, v.as_str()));
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub id: i64,
    pub user_id: UserId,
    pub ts: Timestamp,
    pub name: String,
    pub props: Option<Props>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub user_id: UserId,
    pub ts: Timestamp,
    pub name: String,
    pub props: Option<Props>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraitDefinition {
    pub key: String,
    pub expression: String,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentDefinition {
    pub key: String,
    pub rule: String,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagDefinition {
    pub key: String,
    pub rule: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTrait {
    pub user_id: UserId,
    pub key: String,
    pub value: Value,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSegment {
    pub user_id: UserId,
    pub key: String,
    pub in_segment: bool,
    /// Non-null iff `in_segment` is true (§3 UserSegment invariant).
    pub since: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl UserSegment {
    pub fn invariant_holds(&self) -> bool {
        self.since.is_some() == self.in_segment
    }
}

/// One row of `GET /v1/admin/users/search` (§6): a user plus whichever
/// aliases it has linked, without the full trait/segment detail of
/// [`UserDetail`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub created_at: Timestamp,
    pub device_id: Option<String>,
    pub external_id: Option<String>,
    pub email_hash: Option<String>,
}

/// The full record backing `GET /v1/admin/users/:id` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    pub user: User,
    pub aliases: Vec<Alias>,
    pub traits: BTreeMap<String, UserTrait>,
    pub segments: BTreeMap<String, UserSegment>,
}

/// Aggregate counts backing `GET /v1/admin/metrics` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminMetrics {
    pub user_count: i64,
    pub event_count: i64,
    pub trait_definition_count: i64,
    pub segment_definition_count: i64,
    pub flag_definition_count: i64,
}

/// One CSV row of `GET /v1/export/segment/:key` (§6), in the exact column
/// order of the header `user_id,created_at,in_segment,since,updated_at,
/// device_id,external_id,email_hash`. Field names stay snake_case in Rust
/// and in the CSV header; this type is never serialized to JSON directly.
#[derive(Debug, Clone)]
pub struct SegmentExportRow {
    pub user_id: UserId,
    pub created_at: Timestamp,
    pub in_segment: bool,
    pub since: Option<Timestamp>,
    pub updated_at: Timestamp,
    pub device_id: Option<String>,
    pub external_id: Option<String>,
    pub email_hash: Option<String>,
}

/// Key format required by TraitDefinition/SegmentDefinition/FlagDefinition
/// keys (§3): `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
