//! The context value handed to procedures on the receiving side.

use std::fmt;

use shuttle_wire::ContextId;

use crate::shuttle::Shuttle;

/// The receiving context, as seen by a shuttled procedure.
///
/// Procedures run where they land, so this is the only way they reach the
/// world: the local context id, and a [`Shuttle`] for sending further
/// closures (there is no automatic reply channel).
#[derive(Clone)]
pub struct Context {
    id: ContextId,
    shuttle: Shuttle,
}

impl Context {
    pub fn new(id: ContextId, shuttle: Shuttle) -> Self {
        Self { id, shuttle }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn shuttle(&self) -> &Shuttle {
        &self.shuttle
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("id", &self.id).finish()
    }
}
