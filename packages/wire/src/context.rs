//! Execution context identities and token slots.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an isolated execution context (a user or profile space).
///
/// The hub conventionally runs in context `0`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ContextId(pub u32);

impl ContextId {
    /// The conventional hub context.
    pub const HUB: ContextId = ContextId(0);

    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ContextId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Which family of tokens a slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    /// Delivery channel into the issuing context's dispatcher.
    Shuttle,
    /// Durable storage entry holding another context's token.
    Locker,
}

/// A token slot within one issuing context.
///
/// Slots are derived from a context id, never allocated, so asking for the
/// same slot twice under reuse semantics yields the same live token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId {
    pub kind: SlotKind,
    pub context: ContextId,
}

impl SlotId {
    /// The delivery slot keyed by `context`.
    pub fn shuttle(context: ContextId) -> Self {
        Self {
            kind: SlotKind::Shuttle,
            context,
        }
    }

    /// The locker slot holding the token owned by `context`.
    pub fn locker(context: ContextId) -> Self {
        Self {
            kind: SlotKind::Locker,
            context,
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SlotKind::Shuttle => write!(f, "shuttle/{}", self.context),
            SlotKind::Locker => write!(f, "locker/{}", self.context),
        }
    }
}
