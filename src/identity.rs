//! Identity Resolver (§4.2).
//!
//! First-match-in-order alias lookup; create-and-link-all on a total miss;
//! link any remaining supplied aliases to the resolved user. Two
//! pre-existing users are never merged even when one call supplies aliases
//! of both - this is the documented behavior of §9 Open Question 1, not an
//! oversight.

use std::sync::Arc;

use cdp_types::{Timestamp, UserId};
use tracing::warn;

use crate::error::{CdpError, Result};
use crate::ports::{AliasLinkOutcome, IdentityStore};
use crate::types::AliasSet;

pub struct ResolveOutcome {
    pub user_id: UserId,
    pub created: bool,
}

pub async fn resolve(
    store: &Arc<dyn IdentityStore>,
    aliases: &AliasSet,
    now: Timestamp,
) -> Result<ResolveOutcome> {
    if aliases.is_empty() {
        return Err(CdpError::InvalidInput(
            "at least one of deviceId, externalId, emailHash is required".into(),
        ));
    }

    let ordered = aliases.ordered();

    let mut resolved: Option<UserId> = None;
    for (kind, value) in &ordered {
        if let Some(user_id) = store.find_user_by_alias(*kind, value).await? {
            resolved = Some(user_id);
            break;
        }
    }

    let (user_id, created) = match resolved {
        Some(user_id) => (user_id, false),
        None => (store.create_user(now).await?, true),
    };

    for (kind, value) in &ordered {
        match store.link_alias(*kind, value, user_id).await? {
            AliasLinkOutcome::Linked | AliasLinkOutcome::AlreadyLinkedToThisUser => {}
            AliasLinkOutcome::ConflictWithOtherUser(other) => {
                // §4.2 Failure: not a user-creation failure. Logged, alias
                // stays linked to whichever user already held it.
                warn!(
                    kind = kind.as_str(),
                    value,
                    user_id = %user_id,
                    owner = %other,
                    "alias already linked to a different user; left unlinked from this resolution"
                );
            }
        }
    }

    Ok(ResolveOutcome { user_id, created })
}
