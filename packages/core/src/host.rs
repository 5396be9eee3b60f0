//! The host primitives the protocol is built on.
//!
//! A host offers exactly three things the protocol may rely on:
//!
//! - **Tokens** ([`TokenHost`]): addressed, revocable, one-payload-per-send
//!   capability handles. This is the only thing that crosses the boundary.
//! - **Durable triggers** ([`DurableStore`]): a long-delay trigger whose
//!   attached token survives restarts. The protocol never lets one fire.
//! - **Context directory** ([`ContextDirectory`]): which sibling contexts
//!   exist, whether they are unlocked, how to launch their entry point, and a
//!   stream of "context unlocked" events.
//!
//! Each trait object is bound to one context: `issue` creates tokens owned by
//! that context, `schedule` writes into that context's durable storage.

use std::time::Duration;

use shuttle_wire::{ContextId, IssueMode, LaunchOptions, Payload, SlotId, Token};
use tokio::sync::broadcast;

use crate::error::HostError;

/// Capability token primitive.
pub trait TokenHost: Send + Sync {
    /// Issue (or look up) the token occupying `slot` in the current context.
    ///
    /// Returns `None` only for [`IssueMode::FailIfAbsent`] with no live token,
    /// or when the host refuses to create one.
    fn issue(&self, slot: SlotId, payload: Option<Payload>, mode: IssueMode) -> Option<Token>;

    /// Deliver `payload` (or the token's attached payload) to the token's
    /// issuer. Fire-and-forget: `Ok` means "accepted", not "delivered".
    fn send(&self, token: &Token, payload: Option<Payload>) -> Result<(), HostError>;

    /// Invalidate a token issued by the current context.
    fn revoke(&self, token: &Token);
}

/// Delayed-trigger primitive used purely as durable storage.
pub trait DurableStore: Send + Sync {
    /// Schedule `token` under `key`, to fire after `fire_after`. Replaces any
    /// entry already scheduled under the same key.
    fn schedule(&self, key: SlotId, fire_after: Duration, token: Token) -> Result<(), HostError>;

    /// Trigger the entry under `key` and return its token, if one is still
    /// scheduled.
    fn consume(&self, key: SlotId) -> Result<Option<Token>, HostError>;
}

/// Knowledge about sibling contexts and how to reach them before any token
/// exists.
pub trait ContextDirectory: Send + Sync {
    /// The context this directory view belongs to.
    fn current(&self) -> ContextId;

    /// The context that drives bootstrap.
    fn hub(&self) -> ContextId;

    /// All contexts sharing this installation, in host order.
    fn contexts(&self) -> Vec<ContextId>;

    fn is_unlocked(&self, context: ContextId) -> bool;

    /// Launch `context`'s entry point carrying `options`.
    ///
    /// Fails with [`HostError::NoEntryPoint`] when there is nothing to launch.
    fn launch_entry_point(
        &self,
        context: ContextId,
        options: LaunchOptions,
    ) -> Result<(), HostError>;

    /// Subscribe to "context unlocked" events. Dropping the receiver
    /// unsubscribes.
    fn subscribe_unlocked(&self) -> broadcast::Receiver<ContextId>;
}
