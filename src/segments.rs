//! Segment Computer (§4.5).
//!
//! Free identifiers resolve against the user's trait map (§4.1 Segment
//! dialect); unknown identifiers are `null`. The rule's result is coerced
//! to boolean via the DSL truthiness rule, then folded against the prior
//! `UserSegment` row to produce the correct `since` transition.

use std::collections::BTreeMap;
use std::sync::Arc;

use cdp_dsl::{eval, parse, Binding, Env};
use cdp_types::{Timestamp, UserId};
use tracing::warn;

use crate::error::Result;
use crate::ports::{SegmentDefStore, UserSegmentStore, UserTraitStore};
use crate::types::UserSegment;

struct SegmentContext<'a> {
    traits: &'a BTreeMap<String, crate::types::UserTrait>,
}

impl Env for SegmentContext<'_> {
    fn root(&self, name: &str) -> Binding {
        match self.traits.get(name) {
            Some(row) => Binding::Value(row.value.clone()),
            None => Binding::Missing,
        }
    }
}

/// Fold a freshly evaluated membership boolean against the prior row
/// (`None` if this is the first computation for this segment) into the
/// row to persist, applying the three transition rules verbatim.
fn transition(
    user_id: UserId,
    key: &str,
    in_segment: bool,
    prior: Option<&UserSegment>,
    now: Timestamp,
) -> UserSegment {
    let since = match prior {
        None => {
            if in_segment {
                Some(now)
            } else {
                None
            }
        }
        Some(prev) if prev.in_segment != in_segment => {
            if in_segment {
                Some(now)
            } else {
                None
            }
        }
        Some(prev) => prev.since,
    };

    UserSegment {
        user_id,
        key: key.to_string(),
        in_segment,
        since,
        updated_at: now,
    }
}

/// Recompute every SegmentDefinition for `user_id` against its trait map
/// and persist the result in one transaction (§4.5).
pub async fn recompute(
    segment_defs: &Arc<dyn SegmentDefStore>,
    user_traits: &Arc<dyn UserTraitStore>,
    user_segments: &Arc<dyn UserSegmentStore>,
    user_id: UserId,
    now: Timestamp,
) -> Result<Vec<UserSegment>> {
    let mut defs = segment_defs.list().await?;
    defs.sort_by(|a, b| a.key.cmp(&b.key));

    let traits = user_traits.get_all(user_id).await?;
    let ctx = SegmentContext { traits: &traits };
    let prior = user_segments.get_all(user_id).await?;

    let mut rows = Vec::with_capacity(defs.len());
    for def in &defs {
        let in_segment = match parse(&def.rule) {
            Ok(parsed) => match eval(&parsed.expr, &ctx) {
                Ok(value) => value.is_truthy(),
                Err(e) => {
                    warn!(key = %def.key, error = %e, "segment evaluation failed, treating as false");
                    false
                }
            },
            Err(e) => {
                warn!(key = %def.key, error = %e, "segment rule failed to parse, treating as false");
                false
            }
        };
        rows.push(transition(user_id, &def.key, in_segment, prior.get(&def.key), now));
    }

    user_segments.upsert_all(user_id, rows.clone()).await?;
    Ok(rows)
}
