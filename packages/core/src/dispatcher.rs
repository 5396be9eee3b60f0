//! The single inbound entry point of a context.
//!
//! Every delivery the host makes into a context goes through
//! [`Dispatcher::on_message`]. Each message is classified on its own:
//!
//! ```text
//!                 ┌─ usage report ────────────────► drop
//!                 ├─ token issued here ───────────► drop (self loop)
//! Message ─ classify ─ token issued elsewhere ────► Locker::save(issuer)
//!                 ├─ closure descriptor ──────────► decode + invoke
//!                 └─ anything else ───────────────► drop
//! ```
//!
//! Nothing a remote closure does can escape: decode errors and panics are
//! logged and swallowed, and nothing is sent back.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use shuttle_wire::{ClosureDescriptor, ClosureType, ContextId, Message, Payload, Token};
use tracing::{debug, warn};

use crate::codec::{self, Registry};
use crate::context::Context;
use crate::locker::Locker;
use crate::shuttle::Shuttle;

/// What the dispatcher did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Host usage-report bookkeeping, not an application payload.
    UsageReport,
    /// A token issued by this very context.
    SelfLoop,
    /// A handshake token cached as the channel into the given context.
    Saved(ContextId),
    /// A closure that ran to completion.
    Invoked(ClosureType),
    /// A closure that failed to decode or panicked.
    Failed(ClosureType),
    /// No payload, or one the protocol does not understand.
    Ignored,
}

/// Routes inbound messages for one context.
pub struct Dispatcher {
    context: ContextId,
    locker: Locker,
    registry: Arc<Registry>,
    shuttle: Shuttle,
}

impl Dispatcher {
    pub fn new(shuttle: Shuttle, locker: Locker) -> Self {
        Self {
            context: locker.context(),
            registry: Arc::clone(shuttle.registry()),
            locker,
            shuttle,
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Handle one delivery. Never fails; the outcome is for observability.
    pub fn on_message(&self, message: Message) -> Dispatch {
        if message.is_usage_report() {
            return Dispatch::UsageReport;
        }
        match message.payload {
            Some(Payload::Token(token)) => self.on_token(token),
            Some(Payload::Invocation(descriptor)) => self.on_invocation(descriptor),
            Some(Payload::Opaque(_)) | None => {
                debug!(context = %self.context, "Ignoring unrecognized payload");
                Dispatch::Ignored
            }
        }
    }

    fn on_token(&self, token: Token) -> Dispatch {
        debug!(context = %self.context, token = %token, "Received via shuttle");
        if token.issuer == self.context {
            return Dispatch::SelfLoop;
        }
        let owner = token.issuer;
        match self.locker.save(owner, token) {
            Ok(()) => Dispatch::Saved(owner),
            Err(e) => {
                warn!(context = %self.context, owner = %owner, error = %e, "Failed to save shuttle");
                Dispatch::Ignored
            }
        }
    }

    fn on_invocation(&self, descriptor: ClosureDescriptor) -> Dispatch {
        debug!(context = %self.context, invocation = %descriptor, "Received via shuttle");
        let type_id = descriptor.type_id.clone();
        let ctx = Context::new(self.context, self.shuttle.clone());

        // Decode and invoke both run registered code.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            codec::decode(&descriptor, &self.registry, &ctx)
                .map(|invocation| invocation.invoke(&ctx))
        }));

        match outcome {
            Ok(Ok(())) => Dispatch::Invoked(type_id),
            Ok(Err(e)) => {
                warn!(context = %self.context, type_id = %type_id, error = %e, "Error executing");
                Dispatch::Failed(type_id)
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(context = %self.context, type_id = %type_id, reason = %reason, "Error executing");
                Dispatch::Failed(type_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ClosureKind, Invocation};
    use std::any::Any;
    use crate::testing::{MemoryDurable, RecordingTokens};
    use parking_lot::Mutex;
    use shuttle_wire::{ArgType, SlotId, Value};
    use std::time::Duration;

    struct Fixture {
        dispatcher: Dispatcher,
        locker: Locker,
        seen: Arc<Mutex<Vec<(ContextId, String)>>>,
    }

    fn fixture(context: u32) -> Fixture {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();
        let sink = seen.clone();
        registry.register(ClosureKind::procedure(
            "t.note",
            vec![ArgType::String, ArgType::Context],
            move |ctx, args| {
                sink.lock()
                    .push((ctx.id(), args.str(0).unwrap_or_default().to_string()));
            },
        ));
        registry.register(ClosureKind::procedure("t.boom", vec![], |_, _| {
            panic!("procedure failed")
        }));

        let id = ContextId(context);
        let locker = Locker::new(
            id,
            Arc::new(MemoryDurable::default()),
            Duration::from_secs(60),
        );
        let shuttle = Shuttle::new(
            Arc::new(RecordingTokens::new(id)),
            locker.clone(),
            Arc::new(registry),
        );
        Fixture {
            dispatcher: Dispatcher::new(shuttle, locker.clone()),
            locker,
            seen,
        }
    }

    #[test]
    fn foreign_token_is_saved_under_its_issuer() {
        let f = fixture(1);
        let hub_token = Token::new(ContextId(0), SlotId::shuttle(ContextId(0)), None);

        let outcome = f.dispatcher.on_message(Message::new(Payload::Token(hub_token.clone())));
        assert_eq!(outcome, Dispatch::Saved(ContextId(0)));
        assert!(f.locker.load(ContextId(0)).unwrap().unwrap().same_handle(&hub_token));
    }

    #[test]
    fn own_token_is_a_self_loop() {
        let f = fixture(1);
        let own = Token::new(ContextId(1), SlotId::shuttle(ContextId(1)), None);

        let outcome = f.dispatcher.on_message(Message::new(Payload::Token(own)));
        assert_eq!(outcome, Dispatch::SelfLoop);
        assert!(f.locker.load(ContextId(0)).unwrap().is_none());
    }

    #[test]
    fn invocation_runs_with_local_context() {
        let f = fixture(2);
        // Fields [context, string] -> parameters [string, context]
        let descriptor = ClosureDescriptor::new("t.note", vec![Value::Null, Value::from("hi")]);

        let outcome = f.dispatcher.on_message(Message::new(Payload::Invocation(descriptor)));
        assert_eq!(outcome, Dispatch::Invoked(ClosureType::from_static("t.note")));
        assert_eq!(f.seen.lock().as_slice(), [(ContextId(2), "hi".to_string())]);
    }

    #[test]
    fn decode_failure_is_contained() {
        let f = fixture(2);
        let descriptor = ClosureDescriptor::new("t.unknown", vec![]);

        let outcome = f.dispatcher.on_message(Message::new(Payload::Invocation(descriptor)));
        assert_eq!(outcome, Dispatch::Failed(ClosureType::from_static("t.unknown")));
    }

    #[test]
    fn panicking_procedure_is_contained() {
        let f = fixture(2);
        let descriptor = ClosureDescriptor::new("t.boom", vec![]);

        let outcome = f.dispatcher.on_message(Message::new(Payload::Invocation(descriptor)));
        assert_eq!(outcome, Dispatch::Failed(ClosureType::from_static("t.boom")));
    }

    #[test]
    fn panicking_reconstruction_is_contained() {
        let mut f = fixture(2);
        let mut registry = Registry::clone(f.dispatcher.shuttle.registry());
        registry.register(ClosureKind::new("t.eager", vec![ArgType::String], |args| {
            let text = args.str(0).unwrap().to_string();
            Ok(Box::new(Invocation::new(move |_| drop(text))) as Box<dyn Any + Send>)
        }));
        let shuttle = Shuttle::new(
            Arc::new(RecordingTokens::new(ContextId(2))),
            f.locker.clone(),
            Arc::new(registry),
        );
        f.dispatcher = Dispatcher::new(shuttle, f.locker.clone());

        let descriptor = ClosureDescriptor::new("t.eager", vec![Value::Null]);
        let outcome = f.dispatcher.on_message(Message::new(Payload::Invocation(descriptor)));
        assert_eq!(outcome, Dispatch::Failed(ClosureType::from_static("t.eager")));

        // The dispatcher keeps serving afterwards.
        let descriptor = ClosureDescriptor::new("t.note", vec![Value::Null, Value::from("after")]);
        let outcome = f.dispatcher.on_message(Message::new(Payload::Invocation(descriptor)));
        assert_eq!(outcome, Dispatch::Invoked(ClosureType::from_static("t.note")));
        assert_eq!(f.seen.lock().as_slice(), [(ContextId(2), "after".to_string())]);
    }

    #[test]
    fn usage_reports_are_dropped_before_classification() {
        let f = fixture(1);
        let hub_token = Token::new(ContextId(0), SlotId::shuttle(ContextId(0)), None);
        let message = Message {
            payload: Some(Payload::Token(hub_token)),
            usage_time_report: Some(0),
        };

        assert_eq!(f.dispatcher.on_message(message), Dispatch::UsageReport);
        assert!(f.locker.load(ContextId(0)).unwrap().is_none());
    }

    #[test]
    fn unknown_shapes_are_ignored() {
        let f = fixture(1);
        assert_eq!(f.dispatcher.on_message(Message::empty()), Dispatch::Ignored);
        assert_eq!(
            f.dispatcher
                .on_message(Message::new(Payload::Opaque(Value::from(1)))),
            Dispatch::Ignored
        );
    }
}
