//! A host that runs every context in one process.
//!
//! Contexts share nothing but the [`SimHost`]: the token table, one bounded
//! delivery queue per context, and the unlock event stream. Everything that
//! crosses a context boundary is serialized to bytes on the way in and parsed
//! again on the way out, as a real host would do across processes.
//!
//! Deliveries queue up until someone drains them with
//! [`SimHost::take_delivery`]; a locked context keeps its queue until it is
//! unlocked.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use shuttle_core::{ContextDirectory, HostError, TokenHost};
use shuttle_wire::{ContextId, IssueMode, LaunchOptions, Message, Payload, SlotId, Token};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::error::{Result, SimError};

/// Something waiting to enter a context.
#[derive(Clone, Debug, PartialEq)]
pub enum Delivery {
    /// Serialized [`Message`] sent over a token issued by the context.
    Message(Vec<u8>),
    /// Serialized [`LaunchOptions`] the entry point was launched with.
    Launch(Vec<u8>),
}

struct Queue {
    tx: mpsc::Sender<Delivery>,
    rx: Mutex<mpsc::Receiver<Delivery>>,
}

struct ContextState {
    unlocked: bool,
    entry_point: bool,
    queue: Arc<Queue>,
}

struct Shared {
    hub: ContextId,
    capacity: usize,
    contexts: Mutex<BTreeMap<ContextId, ContextState>>,
    tokens: Mutex<BTreeMap<(ContextId, SlotId), Token>>,
    unlocked: broadcast::Sender<ContextId>,
}

impl Shared {
    fn queue(&self, context: ContextId) -> std::result::Result<Arc<Queue>, HostError> {
        self.contexts
            .lock()
            .get(&context)
            .map(|state| state.queue.clone())
            .ok_or(HostError::UnknownContext(context))
    }

    fn enqueue(&self, context: ContextId, delivery: Delivery) -> std::result::Result<(), HostError> {
        self.queue(context)?
            .tx
            .try_send(delivery)
            .map_err(|_| HostError::QueueFull(context))
    }
}

/// The simulated installation.
#[derive(Clone)]
pub struct SimHost {
    shared: Arc<Shared>,
}

impl SimHost {
    /// A host whose bootstrap driver is `hub`. The hub context itself is
    /// added, unlocked.
    pub fn new(hub: ContextId, capacity: usize) -> Self {
        let (unlocked, _) = broadcast::channel(capacity.max(1));
        let host = Self {
            shared: Arc::new(Shared {
                hub,
                capacity: capacity.max(1),
                contexts: Mutex::new(BTreeMap::new()),
                tokens: Mutex::new(BTreeMap::new()),
                unlocked,
            }),
        };
        host.add_context(hub, true);
        host
    }

    pub fn hub(&self) -> ContextId {
        self.shared.hub
    }

    /// Add a context with a launchable entry point. Adding an existing
    /// context only updates its lock state.
    pub fn add_context(&self, context: ContextId, unlocked: bool) {
        let mut contexts = self.shared.contexts.lock();
        if let Some(state) = contexts.get_mut(&context) {
            state.unlocked = unlocked;
            return;
        }
        let (tx, rx) = mpsc::channel(self.shared.capacity);
        contexts.insert(
            context,
            ContextState {
                unlocked,
                entry_point: true,
                queue: Arc::new(Queue {
                    tx,
                    rx: Mutex::new(rx),
                }),
            },
        );
    }

    pub fn contexts(&self) -> Vec<ContextId> {
        self.shared.contexts.lock().keys().copied().collect()
    }

    pub fn set_entry_point(&self, context: ContextId, present: bool) -> Result<()> {
        let mut contexts = self.shared.contexts.lock();
        let state = contexts
            .get_mut(&context)
            .ok_or(SimError::UnknownContext(context))?;
        state.entry_point = present;
        Ok(())
    }

    /// Unlock `context` and announce it to every subscriber.
    pub fn unlock(&self, context: ContextId) -> Result<()> {
        {
            let mut contexts = self.shared.contexts.lock();
            let state = contexts
                .get_mut(&context)
                .ok_or(SimError::UnknownContext(context))?;
            state.unlocked = true;
        }
        info!(context = %context, "Context unlocked");
        // Nobody listening is fine.
        let _ = self.shared.unlocked.send(context);
        Ok(())
    }

    pub fn lock(&self, context: ContextId) -> Result<()> {
        let mut contexts = self.shared.contexts.lock();
        let state = contexts
            .get_mut(&context)
            .ok_or(SimError::UnknownContext(context))?;
        state.unlocked = false;
        Ok(())
    }

    pub fn is_unlocked(&self, context: ContextId) -> bool {
        self.shared
            .contexts
            .lock()
            .get(&context)
            .is_some_and(|state| state.unlocked)
    }

    /// Next delivery for `context`, if it is unlocked and one is queued.
    pub fn take_delivery(&self, context: ContextId) -> Option<Delivery> {
        if !self.is_unlocked(context) {
            return None;
        }
        let queue = self.shared.queue(context).ok()?;
        let mut rx = queue.rx.lock();
        rx.try_recv().ok()
    }

    /// Revoke every token `context` issued, as a host does when the context
    /// is removed or reinstalled.
    pub fn revoke_all(&self, context: ContextId) -> usize {
        let mut tokens = self.shared.tokens.lock();
        let before = tokens.len();
        tokens.retain(|(issuer, _), _| *issuer != context);
        before - tokens.len()
    }

    /// The host primitives as seen from inside `context`.
    pub fn view(&self, context: ContextId) -> Result<SimContext> {
        if !self.shared.contexts.lock().contains_key(&context) {
            return Err(SimError::UnknownContext(context));
        }
        Ok(SimContext {
            context,
            shared: self.shared.clone(),
        })
    }
}

/// One context's view of the host.
#[derive(Clone)]
pub struct SimContext {
    context: ContextId,
    shared: Arc<Shared>,
}

impl TokenHost for SimContext {
    fn issue(&self, slot: SlotId, payload: Option<Payload>, mode: IssueMode) -> Option<Token> {
        let mut tokens = self.shared.tokens.lock();
        if let Some(existing) = tokens.get_mut(&(self.context, slot)) {
            if mode == IssueMode::CreateIfAbsent {
                existing.payload = payload.map(Box::new);
            }
            return Some(existing.clone());
        }
        if !mode.may_create() {
            return None;
        }
        let token = Token::new(self.context, slot, payload);
        debug!(context = %self.context, token = %token, "Issued token");
        tokens.insert((self.context, slot), token.clone());
        Some(token)
    }

    fn send(&self, token: &Token, payload: Option<Payload>) -> std::result::Result<(), HostError> {
        let attached = {
            let tokens = self.shared.tokens.lock();
            match tokens.get(&(token.issuer, token.slot)) {
                Some(live) if live.same_handle(token) => live.payload.clone(),
                _ => return Err(HostError::TokenInvalid(token.id)),
            }
        };
        let message = Message {
            payload: payload.or(attached.map(|p| *p)),
            usage_time_report: None,
        };
        self.shared
            .enqueue(token.issuer, Delivery::Message(message.to_bytes()?))
    }

    fn revoke(&self, token: &Token) {
        if token.issuer != self.context {
            return;
        }
        let mut tokens = self.shared.tokens.lock();
        let key = (token.issuer, token.slot);
        if tokens.get(&key).is_some_and(|live| live.same_handle(token)) {
            tokens.remove(&key);
            debug!(context = %self.context, token = %token, "Revoked token");
        }
    }
}

impl ContextDirectory for SimContext {
    fn current(&self) -> ContextId {
        self.context
    }

    fn hub(&self) -> ContextId {
        self.shared.hub
    }

    fn contexts(&self) -> Vec<ContextId> {
        self.shared.contexts.lock().keys().copied().collect()
    }

    fn is_unlocked(&self, context: ContextId) -> bool {
        self.shared
            .contexts
            .lock()
            .get(&context)
            .is_some_and(|state| state.unlocked)
    }

    fn launch_entry_point(
        &self,
        context: ContextId,
        options: LaunchOptions,
    ) -> std::result::Result<(), HostError> {
        let entry_point = self
            .shared
            .contexts
            .lock()
            .get(&context)
            .map(|state| state.entry_point)
            .ok_or(HostError::UnknownContext(context))?;
        if !entry_point {
            return Err(HostError::NoEntryPoint(context));
        }
        self.shared
            .enqueue(context, Delivery::Launch(options.to_bytes()?))
    }

    fn subscribe_unlocked(&self) -> broadcast::Receiver<ContextId> {
        self.shared.unlocked.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shuttle_wire::Value;

    fn host() -> SimHost {
        let host = SimHost::new(ContextId(0), 4);
        host.add_context(ContextId(1), true);
        host.add_context(ContextId(2), false);
        host
    }

    fn message(delivery: Delivery) -> Message {
        match delivery {
            Delivery::Message(bytes) => Message::from_bytes(&bytes).unwrap(),
            other => panic!("expected a message, got {:?}", other),
        }
    }

    #[test]
    fn reuse_existing_is_idempotent() {
        let host = host();
        let hub = host.view(ContextId(0)).unwrap();
        let slot = SlotId::shuttle(ContextId(0));

        let first = hub.issue(slot, None, IssueMode::ReuseExisting).unwrap();
        let second = hub
            .issue(slot, Some(Payload::Opaque(Value::from(1))), IssueMode::ReuseExisting)
            .unwrap();
        assert!(first.same_handle(&second));
        assert!(second.payload.is_none());
    }

    #[test]
    fn create_if_absent_replaces_payload_only() {
        let host = host();
        let hub = host.view(ContextId(0)).unwrap();
        let slot = SlotId::shuttle(ContextId(0));

        let first = hub.issue(slot, None, IssueMode::CreateIfAbsent).unwrap();
        let second = hub
            .issue(slot, Some(Payload::Opaque(Value::from(1))), IssueMode::CreateIfAbsent)
            .unwrap();
        assert!(first.same_handle(&second));
        assert!(second.payload.is_some());
    }

    #[test]
    fn fail_if_absent_never_creates() {
        let host = host();
        let hub = host.view(ContextId(0)).unwrap();
        assert!(hub
            .issue(SlotId::shuttle(ContextId(0)), None, IssueMode::FailIfAbsent)
            .is_none());
    }

    #[test]
    fn send_delivers_into_the_issuer() {
        let host = host();
        let sibling = host.view(ContextId(1)).unwrap();
        let hub = host.view(ContextId(0)).unwrap();
        let token = sibling
            .issue(SlotId::shuttle(ContextId(1)), None, IssueMode::CreateIfAbsent)
            .unwrap();

        hub.send(&token, Some(Payload::Opaque(Value::from("hi")))).unwrap();

        assert!(host.take_delivery(ContextId(0)).is_none());
        let received = message(host.take_delivery(ContextId(1)).unwrap());
        assert_eq!(received.payload, Some(Payload::Opaque(Value::from("hi"))));
    }

    #[test]
    fn send_without_payload_carries_the_attached_one() {
        let host = host();
        let sibling = host.view(ContextId(1)).unwrap();
        let token = sibling
            .issue(
                SlotId::shuttle(ContextId(1)),
                Some(Payload::Opaque(Value::from(9))),
                IssueMode::CreateIfAbsent,
            )
            .unwrap();

        host.view(ContextId(0)).unwrap().send(&token, None).unwrap();
        let received = message(host.take_delivery(ContextId(1)).unwrap());
        assert_eq!(received.payload, Some(Payload::Opaque(Value::from(9))));
    }

    #[test]
    fn revoked_tokens_are_invalid() {
        let host = host();
        let sibling = host.view(ContextId(1)).unwrap();
        let token = sibling
            .issue(SlotId::shuttle(ContextId(1)), None, IssueMode::CreateIfAbsent)
            .unwrap();

        // Only the issuer may revoke.
        host.view(ContextId(0)).unwrap().revoke(&token);
        assert!(host.view(ContextId(0)).unwrap().send(&token, None).is_ok());

        sibling.revoke(&token);
        assert!(matches!(
            host.view(ContextId(0)).unwrap().send(&token, None),
            Err(HostError::TokenInvalid(_))
        ));
        assert!(sibling
            .issue(SlotId::shuttle(ContextId(1)), None, IssueMode::FailIfAbsent)
            .is_none());
    }

    #[test]
    fn locked_contexts_hold_their_queue() {
        let host = host();
        let locked = host.view(ContextId(2)).unwrap();
        let token = locked
            .issue(SlotId::shuttle(ContextId(2)), None, IssueMode::CreateIfAbsent)
            .unwrap();
        host.view(ContextId(0)).unwrap().send(&token, None).unwrap();

        assert!(host.take_delivery(ContextId(2)).is_none());
        host.unlock(ContextId(2)).unwrap();
        assert!(host.take_delivery(ContextId(2)).is_some());
    }

    #[test]
    fn full_queue_is_reported() {
        let host = host();
        let hub = host.view(ContextId(0)).unwrap();
        for _ in 0..4 {
            hub.launch_entry_point(ContextId(2), LaunchOptions::new()).unwrap();
        }
        assert!(matches!(
            hub.launch_entry_point(ContextId(2), LaunchOptions::new()),
            Err(HostError::QueueFull(_))
        ));
    }

    #[test]
    fn launch_without_entry_point() {
        let host = host();
        host.set_entry_point(ContextId(1), false).unwrap();
        let hub = host.view(ContextId(0)).unwrap();

        assert!(matches!(
            hub.launch_entry_point(ContextId(1), LaunchOptions::new()),
            Err(HostError::NoEntryPoint(_))
        ));
        assert!(matches!(
            hub.launch_entry_point(ContextId(9), LaunchOptions::new()),
            Err(HostError::UnknownContext(_))
        ));
    }

    #[test]
    fn unlock_is_broadcast() {
        let host = host();
        let mut events = host.view(ContextId(0)).unwrap().subscribe_unlocked();
        host.unlock(ContextId(2)).unwrap();
        assert_eq!(events.try_recv().unwrap(), ContextId(2));
        assert!(matches!(
            host.unlock(ContextId(7)),
            Err(SimError::UnknownContext(_))
        ));
    }

    #[test]
    fn revoke_all_forgets_a_context() {
        let host = host();
        let sibling = host.view(ContextId(1)).unwrap();
        sibling.issue(SlotId::shuttle(ContextId(1)), None, IssueMode::CreateIfAbsent);
        sibling.issue(SlotId::locker(ContextId(0)), None, IssueMode::CreateIfAbsent);
        assert_eq!(host.revoke_all(ContextId(1)), 2);
        assert_eq!(host.revoke_all(ContextId(1)), 0);
    }
}
