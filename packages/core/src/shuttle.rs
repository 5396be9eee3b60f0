//! The application-facing send side.

use std::sync::Arc;

use shuttle_wire::{ContextId, Payload, Token};
use tracing::{debug, warn};

use crate::codec::{self, Closure, Registry};
use crate::error::{Result, ShuttleError};
use crate::host::TokenHost;
use crate::locker::Locker;

/// Sends closures to other contexts over cached reverse channels.
///
/// There is no result channel: a successful call only means a channel
/// existed and the host accepted the send.
#[derive(Clone)]
pub struct Shuttle {
    context: ContextId,
    tokens: Arc<dyn TokenHost>,
    locker: Locker,
    registry: Arc<Registry>,
}

impl Shuttle {
    pub fn new(tokens: Arc<dyn TokenHost>, locker: Locker, registry: Arc<Registry>) -> Self {
        Self {
            context: locker.context(),
            tokens,
            locker,
            registry,
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The cached channel into `target`.
    pub fn channel(&self, target: ContextId) -> Result<Token> {
        self.locker
            .load(target)?
            .ok_or(ShuttleError::ChannelAbsent(target))
    }

    /// Run `closure` in `target`.
    ///
    /// Returns `Ok(false)` when no channel to `target` exists yet. That is
    /// not permanent: bootstrap will establish one eventually.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `target` is the local context, `Marshal` if the
    /// closure does not match its registered kind.
    pub fn shuttle(&self, target: ContextId, closure: &dyn Closure) -> Result<bool> {
        let token = match self.channel(target) {
            Ok(token) => token,
            Err(ShuttleError::ChannelAbsent(target)) => {
                debug!(context = %self.context, target = %target, "No shuttle to target yet");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let descriptor = codec::encode(closure, &self.registry)?;
        debug!(
            context = %self.context,
            target = %target,
            type_id = %descriptor.type_id,
            "Shuttling closure"
        );
        if let Err(e) = self.tokens.send(&token, Some(Payload::Invocation(descriptor))) {
            warn!(context = %self.context, target = %target, error = %e, "Shuttle send failed");
        }
        Ok(true)
    }
}
