//! API key authentication and the `read ⊂ write ⊂ admin` role hierarchy
//! (§3 APIKey, §6 "Required auth").
//!
//! The `server` crate resolves an `Authorization: Bearer <key>` header or
//! `?apiKey=` query parameter to an [`ApiKeyKind`] and builds a
//! [`Principal`] before calling into this crate; core logic never parses
//! raw headers.

use crate::error::CdpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApiKeyKind {
    Read,
    Write,
    Admin,
}

impl ApiKeyKind {
    /// `read ⊂ write ⊂ admin`: a key of this kind satisfies any
    /// requirement at or below its own level.
    pub fn satisfies(&self, required: ApiKeyKind) -> bool {
        *self >= required
    }
}

#[derive(Debug, Clone)]
pub struct Principal {
    pub key_id: String,
    pub kind: ApiKeyKind,
}

impl Principal {
    pub fn new(key_id: impl Into<String>, kind: ApiKeyKind) -> Self {
        Self {
            key_id: key_id.into(),
            kind,
        }
    }

    pub fn require(&self, required: ApiKeyKind) -> Result<(), CdpError> {
        if self.kind.satisfies(required) {
            Ok(())
        } else {
            Err(CdpError::Forbidden(format!(
                "key {} ({:?}) does not satisfy required level {:?}",
                self.key_id, self.kind, required
            )))
        }
    }
}
