//! Postgres implementations of every `cdp-core` port trait.
//!
//! Each adapter is a newtype wrapping `PgPool`. All SQL is runtime-checked
//! (`sqlx::query`/`query_as`, never the `sqlx::query!` macros), so this
//! crate never needs a live database at compile time.

use std::collections::BTreeMap;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use cdp_core::error::Result;
use cdp_core::ports::{
    AdminQueryStore, AliasLinkOutcome, EventStore, FlagDefStore, IdentityStore, SegmentDefStore,
    TraitDefStore, UserSegmentStore, UserTraitStore,
};
use cdp_core::traits::days_ago;
use cdp_core::types::{
    AdminMetrics, Alias, AliasKind, Event, FlagDefinition, NewEvent, SegmentDefinition,
    SegmentExportRow, TraitDefinition, User, UserDetail, UserSegment, UserSummary, UserTrait,
};
use cdp_types::{EventMetric, Timestamp, UserId, Value};

use crate::sqlx_types::{
    encode_alias_kind, parse_alias_kind, PgAdminMetricsRow, PgEventRow, PgFlagDefinitionRow,
    PgSegmentDefinitionRow, PgSegmentExportRow, PgTraitDefinitionRow, PgUserSegmentRow,
    PgUserSummaryRow, PgUserTraitRow,
};

// ── PgIdentityStore ───────────────────────────────────────────

pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_user_by_alias(&self, kind: AliasKind, value: &str) -> Result<Option<UserId>> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT user_id FROM aliases WHERE kind = $1 AND value = $2")
                .bind(encode_alias_kind(kind))
                .bind(value)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| anyhow!(e))?;
        Ok(row.map(|(id,)| id))
    }

    async fn create_user(&self, now: Timestamp) -> Result<UserId> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, created_at) VALUES ($1, $2)")
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(id)
    }

    async fn link_alias(
        &self,
        kind: AliasKind,
        value: &str,
        user_id: UserId,
    ) -> Result<AliasLinkOutcome> {
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO aliases (kind, value, user_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (kind, value) DO NOTHING
            RETURNING user_id
            "#,
        )
        .bind(encode_alias_kind(kind))
        .bind(value)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        if inserted.is_some() {
            return Ok(AliasLinkOutcome::Linked);
        }

        let (owner,): (Uuid,) =
            sqlx::query_as("SELECT user_id FROM aliases WHERE kind = $1 AND value = $2")
                .bind(encode_alias_kind(kind))
                .bind(value)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| anyhow!(e))?;

        if owner == user_id {
            Ok(AliasLinkOutcome::AlreadyLinkedToThisUser)
        } else {
            Ok(AliasLinkOutcome::ConflictWithOtherUser(owner))
        }
    }
}

// ── PgEventStore ──────────────────────────────────────────────

pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PgEventMetricRow {
    name: String,
    count_7d: i64,
    count_14d: i64,
    count_30d: i64,
    unique_days_7d: i64,
    unique_days_14d: i64,
    unique_days_30d: i64,
    first_seen: chrono::DateTime<chrono::Utc>,
    last_seen: chrono::DateTime<chrono::Utc>,
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append(&self, event: NewEvent) -> Result<Event> {
        let props = event
            .props
            .map(|p| serde_json::Value::Object(p.into_iter().collect()));
        let row: PgEventRow = sqlx::query_as(
            r#"
            INSERT INTO events (user_id, ts, name, props)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, ts, name, props
            "#,
        )
        .bind(event.user_id)
        .bind(event.ts)
        .bind(&event.name)
        .bind(props)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.into())
    }

    async fn event_metrics(
        &self,
        user_id: UserId,
        now: Timestamp,
    ) -> Result<BTreeMap<String, EventMetric>> {
        let rows: Vec<PgEventMetricRow> = sqlx::query_as(
            r#"
            SELECT
                name,
                count(*) FILTER (WHERE ts >= $2 - INTERVAL '7 days' AND ts <= $2) AS count_7d,
                count(*) FILTER (WHERE ts >= $2 - INTERVAL '14 days' AND ts <= $2) AS count_14d,
                count(*) FILTER (WHERE ts >= $2 - INTERVAL '30 days' AND ts <= $2) AS count_30d,
                count(DISTINCT date_trunc('day', ts))
                    FILTER (WHERE ts >= $2 - INTERVAL '7 days' AND ts <= $2) AS unique_days_7d,
                count(DISTINCT date_trunc('day', ts))
                    FILTER (WHERE ts >= $2 - INTERVAL '14 days' AND ts <= $2) AS unique_days_14d,
                count(DISTINCT date_trunc('day', ts))
                    FILTER (WHERE ts >= $2 - INTERVAL '30 days' AND ts <= $2) AS unique_days_30d,
                min(ts) AS first_seen,
                max(ts) AS last_seen
            FROM events
            WHERE user_id = $1
            GROUP BY name
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.name,
                    EventMetric {
                        count_7d: r.count_7d,
                        count_14d: r.count_14d,
                        count_30d: r.count_30d,
                        unique_days_7d: r.unique_days_7d,
                        unique_days_14d: r.unique_days_14d,
                        unique_days_30d: r.unique_days_30d,
                        first_seen_days_ago: days_ago(now, r.first_seen),
                        last_seen_days_ago: days_ago(now, r.last_seen),
                    },
                )
            })
            .collect())
    }

    async fn user_span(&self, user_id: UserId) -> Result<Option<(Timestamp, Timestamp)>> {
        let row: (
            Option<chrono::DateTime<chrono::Utc>>,
            Option<chrono::DateTime<chrono::Utc>>,
        ) = sqlx::query_as("SELECT min(ts), max(ts) FROM events WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(row.0.zip(row.1))
    }
}

// ── PgTraitDefStore ───────────────────────────────────────────

pub struct PgTraitDefStore {
    pool: PgPool,
}

impl PgTraitDefStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TraitDefStore for PgTraitDefStore {
    async fn list(&self) -> Result<Vec<TraitDefinition>> {
        let rows: Vec<PgTraitDefinitionRow> = sqlx::query_as(
            "SELECT key, expression, updated_at FROM trait_definitions ORDER BY key",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get(&self, key: &str) -> Result<Option<TraitDefinition>> {
        let row: Option<PgTraitDefinitionRow> = sqlx::query_as(
            "SELECT key, expression, updated_at FROM trait_definitions WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.map(Into::into))
    }

    async fn upsert(&self, key: &str, expression: &str, now: Timestamp) -> Result<TraitDefinition> {
        let row: PgTraitDefinitionRow = sqlx::query_as(
            r#"
            INSERT INTO trait_definitions (key, expression, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET expression = EXCLUDED.expression, updated_at = EXCLUDED.updated_at
            RETURNING key, expression, updated_at
            "#,
        )
        .bind(key)
        .bind(expression)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.into())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM trait_definitions WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(result.rows_affected() > 0)
    }
}

// ── PgSegmentDefStore ─────────────────────────────────────────

pub struct PgSegmentDefStore {
    pool: PgPool,
}

impl PgSegmentDefStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SegmentDefStore for PgSegmentDefStore {
    async fn list(&self) -> Result<Vec<SegmentDefinition>> {
        let rows: Vec<PgSegmentDefinitionRow> =
            sqlx::query_as("SELECT key, rule, updated_at FROM segment_definitions ORDER BY key")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get(&self, key: &str) -> Result<Option<SegmentDefinition>> {
        let row: Option<PgSegmentDefinitionRow> =
            sqlx::query_as("SELECT key, rule, updated_at FROM segment_definitions WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| anyhow!(e))?;
        Ok(row.map(Into::into))
    }

    async fn upsert(&self, key: &str, rule: &str, now: Timestamp) -> Result<SegmentDefinition> {
        let row: PgSegmentDefinitionRow = sqlx::query_as(
            r#"
            INSERT INTO segment_definitions (key, rule, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET rule = EXCLUDED.rule, updated_at = EXCLUDED.updated_at
            RETURNING key, rule, updated_at
            "#,
        )
        .bind(key)
        .bind(rule)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.into())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM segment_definitions WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(result.rows_affected() > 0)
    }
}

// ── PgFlagDefStore ────────────────────────────────────────────

pub struct PgFlagDefStore {
    pool: PgPool,
}

impl PgFlagDefStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FlagDefStore for PgFlagDefStore {
    async fn list(&self) -> Result<Vec<FlagDefinition>> {
        let rows: Vec<PgFlagDefinitionRow> =
            sqlx::query_as("SELECT key, rule FROM flag_definitions ORDER BY key")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get(&self, key: &str) -> Result<Option<FlagDefinition>> {
        let row: Option<PgFlagDefinitionRow> =
            sqlx::query_as("SELECT key, rule FROM flag_definitions WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| anyhow!(e))?;
        Ok(row.map(Into::into))
    }

    async fn upsert(&self, key: &str, rule: &str) -> Result<FlagDefinition> {
        let row: PgFlagDefinitionRow = sqlx::query_as(
            r#"
            INSERT INTO flag_definitions (key, rule)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET rule = EXCLUDED.rule
            RETURNING key, rule
            "#,
        )
        .bind(key)
        .bind(rule)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.into())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM flag_definitions WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(result.rows_affected() > 0)
    }
}

// ── PgUserTraitStore ──────────────────────────────────────────

pub struct PgUserTraitStore {
    pool: PgPool,
}

impl PgUserTraitStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserTraitStore for PgUserTraitStore {
    async fn get_all(&self, user_id: UserId) -> Result<BTreeMap<String, UserTrait>> {
        let rows: Vec<PgUserTraitRow> = sqlx::query_as(
            "SELECT user_id, key, value, updated_at FROM user_traits WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(|r| (r.key.clone(), r.into())).collect())
    }

    async fn upsert_all(
        &self,
        user_id: UserId,
        values: Vec<(String, Value)>,
        now: Timestamp,
    ) -> Result<Vec<UserTrait>> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        let mut out = Vec::with_capacity(values.len());
        for (key, value) in values {
            let json: serde_json::Value = value.clone().into();
            sqlx::query(
                r#"
                INSERT INTO user_traits (user_id, key, value, updated_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (user_id, key) DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(user_id)
            .bind(&key)
            .bind(json)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;
            out.push(UserTrait {
                user_id,
                key,
                value,
                updated_at: now,
            });
        }
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(out)
    }

    async fn delete_by_key(&self, key: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_traits WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(result.rows_affected())
    }
}

// ── PgUserSegmentStore ────────────────────────────────────────

pub struct PgUserSegmentStore {
    pool: PgPool,
}

impl PgUserSegmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserSegmentStore for PgUserSegmentStore {
    async fn get_all(&self, user_id: UserId) -> Result<BTreeMap<String, UserSegment>> {
        let rows: Vec<PgUserSegmentRow> = sqlx::query_as(
            "SELECT user_id, key, in_segment, since, updated_at FROM user_segments WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(|r| (r.key.clone(), r.into())).collect())
    }

    async fn upsert_all(&self, user_id: UserId, rows: Vec<UserSegment>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        for row in &rows {
            sqlx::query(
                r#"
                INSERT INTO user_segments (user_id, key, in_segment, since, updated_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (user_id, key) DO UPDATE SET
                    in_segment = EXCLUDED.in_segment,
                    since = EXCLUDED.since,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(user_id)
            .bind(&row.key)
            .bind(row.in_segment)
            .bind(row.since)
            .bind(row.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;
        }
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn delete_by_key(&self, key: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_segments WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(result.rows_affected())
    }
}

// ── PgAdminQueryStore ─────────────────────────────────────────

/// A correlated subquery per alias kind, reused by `search_users` and
/// `export_segment_members`: at most one alias of each kind is ever
/// linked to a given user by construction, so `LIMIT 1` is a formality
/// rather than an arbitrary tie-break.
const ALIAS_SELECTS: &str = r#"
    (SELECT value FROM aliases WHERE user_id = u.id AND kind = 'device_id' LIMIT 1) AS device_id,
    (SELECT value FROM aliases WHERE user_id = u.id AND kind = 'external_id' LIMIT 1) AS external_id,
    (SELECT value FROM aliases WHERE user_id = u.id AND kind = 'email_hash' LIMIT 1) AS email_hash
"#;

pub struct PgAdminQueryStore {
    pool: PgPool,
}

impl PgAdminQueryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AdminQueryStore for PgAdminQueryStore {
    async fn search_users(
        &self,
        query: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<UserSummary>, i64)> {
        let pattern = query.map(|q| format!("%{q}%"));

        let rows: Vec<PgUserSummaryRow> = sqlx::query_as(&format!(
            r#"
            SELECT u.id, u.created_at, {ALIAS_SELECTS}
            FROM users u
            WHERE $1::text IS NULL
               OR EXISTS (SELECT 1 FROM aliases a WHERE a.user_id = u.id AND a.value ILIKE $1)
            ORDER BY u.created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        let (total,): (i64,) = sqlx::query_as(
            r#"
            SELECT count(*) FROM users u
            WHERE $1::text IS NULL
               OR EXISTS (SELECT 1 FROM aliases a WHERE a.user_id = u.id AND a.value ILIKE $1)
            "#,
        )
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<UserDetail>> {
        let user_row: Option<(Uuid, DateTime<Utc>)> =
            sqlx::query_as("SELECT id, created_at FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| anyhow!(e))?;
        let Some((id, created_at)) = user_row else {
            return Ok(None);
        };

        let alias_rows: Vec<(String, String)> =
            sqlx::query_as("SELECT kind, value FROM aliases WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| anyhow!(e))?;
        let aliases = alias_rows
            .into_iter()
            .map(|(kind, value)| Alias {
                kind: parse_alias_kind(&kind),
                value,
                user_id,
            })
            .collect();

        let trait_rows: Vec<PgUserTraitRow> = sqlx::query_as(
            "SELECT user_id, key, value, updated_at FROM user_traits WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        let traits = trait_rows
            .into_iter()
            .map(|r| (r.key.clone(), UserTrait::from(r)))
            .collect();

        let segment_rows: Vec<PgUserSegmentRow> = sqlx::query_as(
            "SELECT user_id, key, in_segment, since, updated_at FROM user_segments WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        let segments = segment_rows
            .into_iter()
            .map(|r| (r.key.clone(), UserSegment::from(r)))
            .collect();

        Ok(Some(UserDetail {
            user: User { id, created_at },
            aliases,
            traits,
            segments,
        }))
    }

    async fn metrics(&self) -> Result<AdminMetrics> {
        let row: PgAdminMetricsRow = sqlx::query_as(
            r#"
            SELECT
                (SELECT count(*) FROM users) AS user_count,
                (SELECT count(*) FROM events) AS event_count,
                (SELECT count(*) FROM trait_definitions) AS trait_definition_count,
                (SELECT count(*) FROM segment_definitions) AS segment_definition_count,
                (SELECT count(*) FROM flag_definitions) AS flag_definition_count
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        Ok(AdminMetrics {
            user_count: row.user_count,
            event_count: row.event_count,
            trait_definition_count: row.trait_definition_count,
            segment_definition_count: row.segment_definition_count,
            flag_definition_count: row.flag_definition_count,
        })
    }

    async fn export_segment_members(&self, key: &str) -> Result<Vec<SegmentExportRow>> {
        let rows: Vec<PgSegmentExportRow> = sqlx::query_as(&format!(
            r#"
            SELECT us.user_id, u.created_at, us.in_segment, us.since, us.updated_at, {ALIAS_SELECTS}
            FROM user_segments us
            JOIN users u ON u.id = us.user_id
            WHERE us.key = $1 AND us.in_segment
            ORDER BY u.created_at
            "#
        ))
        .bind(key)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
