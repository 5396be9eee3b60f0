//! Channel locker: durable storage of other contexts' tokens.
//!
//! The host has no key/value store that survives a reboot, but it does have
//! delayed triggers that do. The locker schedules each token it keeps under a
//! trigger a year out, keyed by the token's owner, and reads it back by
//! triggering the entry on demand.

use std::sync::Arc;
use std::time::Duration;

use shuttle_wire::{ContextId, SlotId, Token};
use tracing::{debug, error};

use crate::error::{Result, ShuttleError};
use crate::host::DurableStore;

/// Durable `owner context -> token` map for one context.
#[derive(Clone)]
pub struct Locker {
    context: ContextId,
    store: Arc<dyn DurableStore>,
    delay: Duration,
}

impl Locker {
    pub fn new(context: ContextId, store: Arc<dyn DurableStore>, delay: Duration) -> Self {
        Self {
            context,
            store,
            delay,
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Keep `token` as the channel into `owner`, replacing any earlier one.
    ///
    /// Only tokens owned by another context are kept.
    pub fn save(&self, owner: ContextId, token: Token) -> Result<()> {
        if owner == self.context {
            error!(context = %self.context, token = %token, "Not a shuttle");
            return Err(ShuttleError::invalid_argument(format!(
                "cannot save a token owned by the local context {}",
                owner
            )));
        }
        debug!(context = %self.context, owner = %owner, token = %token, "Saving shuttle");
        self.store.schedule(SlotId::locker(owner), self.delay, token)?;
        Ok(())
    }

    /// The channel into `target`, if one has been saved.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when `target` is the local context. There is never
    /// a channel to oneself, so asking is a caller bug.
    pub fn load(&self, target: ContextId) -> Result<Option<Token>> {
        if target == self.context {
            return Err(ShuttleError::invalid_argument(format!(
                "same context: {}",
                target
            )));
        }
        Ok(self.store.consume(SlotId::locker(target))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryDurable;

    fn locker(context: u32) -> Locker {
        Locker::new(
            ContextId(context),
            Arc::new(MemoryDurable::default()),
            Duration::from_secs(60),
        )
    }

    fn token_from(issuer: u32) -> Token {
        Token::new(ContextId(issuer), SlotId::shuttle(ContextId(issuer)), None)
    }

    #[test]
    fn save_then_load() {
        let locker = locker(1);
        let token = token_from(0);
        locker.save(ContextId(0), token.clone()).unwrap();

        let loaded = locker.load(ContextId(0)).unwrap().unwrap();
        assert!(loaded.same_handle(&token));
    }

    #[test]
    fn later_save_overwrites() {
        let locker = locker(1);
        let t1 = token_from(0);
        let t2 = token_from(0);
        locker.save(ContextId(0), t1.clone()).unwrap();
        locker.save(ContextId(0), t2.clone()).unwrap();

        let loaded = locker.load(ContextId(0)).unwrap().unwrap();
        assert!(loaded.same_handle(&t2));
        assert!(!loaded.same_handle(&t1));
    }

    #[test]
    fn load_is_repeatable() {
        let locker = locker(1);
        locker.save(ContextId(0), token_from(0)).unwrap();
        assert!(locker.load(ContextId(0)).unwrap().is_some());
        assert!(locker.load(ContextId(0)).unwrap().is_some());
    }

    #[test]
    fn load_unknown_owner_is_absent() {
        let locker = locker(1);
        assert!(locker.load(ContextId(2)).unwrap().is_none());
    }

    #[test]
    fn load_self_is_invalid_argument() {
        let locker = locker(1);
        assert!(matches!(
            locker.load(ContextId(1)),
            Err(ShuttleError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn save_own_token_is_rejected() {
        let locker = locker(1);
        assert!(locker.save(ContextId(1), token_from(1)).is_err());
        assert!(locker.load(ContextId(0)).unwrap().is_none());
    }

    #[test]
    fn owners_are_independent() {
        let locker = locker(0);
        let a = token_from(1);
        let b = token_from(2);
        locker.save(ContextId(1), a.clone()).unwrap();
        locker.save(ContextId(2), b.clone()).unwrap();
        assert!(locker.load(ContextId(1)).unwrap().unwrap().same_handle(&a));
        assert!(locker.load(ContextId(2)).unwrap().unwrap().same_handle(&b));
    }
}
