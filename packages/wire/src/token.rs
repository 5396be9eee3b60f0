//! Capability tokens.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ContextId, Payload, SlotId};

/// Opaque handle identity assigned by the host when a token is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(Uuid);

impl TokenId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TokenId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A capability token.
///
/// Whoever holds a token can send one payload at a time into the token's
/// issuing context. The issuer may revoke it at any time, after which sends
/// silently go nowhere.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,

    /// The context that created the token and receives its deliveries.
    pub issuer: ContextId,

    pub slot: SlotId,

    /// Payload attached at issue time, delivered when a send carries none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<Payload>>,
}

impl Token {
    pub fn new(issuer: ContextId, slot: SlotId, payload: Option<Payload>) -> Self {
        Self {
            id: TokenId::new(),
            issuer,
            slot,
            payload: payload.map(Box::new),
        }
    }

    /// Whether `other` refers to the same host handle.
    pub fn same_handle(&self, other: &Token) -> bool {
        self.id == other.id && self.issuer == other.issuer && self.slot == other.slot
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({} from {} at {})", self.id, self.issuer, self.slot)
    }
}

/// How `issue` treats an existing token in the requested slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueMode {
    /// Create when absent; otherwise keep the handle and replace its payload.
    CreateIfAbsent,
    /// Get-or-create: an existing token is returned unchanged.
    ReuseExisting,
    /// Return the existing token, or nothing. Never creates.
    FailIfAbsent,
}

impl IssueMode {
    pub fn may_create(&self) -> bool {
        !matches!(self, IssueMode::FailIfAbsent)
    }
}
