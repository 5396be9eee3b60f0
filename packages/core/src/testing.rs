//! In-crate host doubles for unit tests.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shuttle_wire::{ContextId, IssueMode, Payload, SlotId, Token};

use crate::codec::Registry;
use crate::context::Context;
use crate::error::HostError;
use crate::host::{DurableStore, TokenHost};
use crate::locker::Locker;
use crate::shuttle::Shuttle;

/// Durable store that never expires anything.
#[derive(Default)]
pub struct MemoryDurable {
    entries: Mutex<BTreeMap<SlotId, Token>>,
}

impl DurableStore for MemoryDurable {
    fn schedule(&self, key: SlotId, _fire_after: Duration, token: Token) -> Result<(), HostError> {
        self.entries.lock().insert(key, token);
        Ok(())
    }

    fn consume(&self, key: SlotId) -> Result<Option<Token>, HostError> {
        Ok(self.entries.lock().get(&key).cloned())
    }
}

/// Token host that keeps issued tokens and records every send.
pub struct RecordingTokens {
    context: ContextId,
    live: Mutex<BTreeMap<SlotId, Token>>,
    sent: Mutex<Vec<(Token, Option<Payload>)>>,
}

impl RecordingTokens {
    pub fn new(context: ContextId) -> Self {
        Self {
            context,
            live: Mutex::new(BTreeMap::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<(Token, Option<Payload>)> {
        self.sent.lock().clone()
    }

    pub fn live(&self, slot: SlotId) -> Option<Token> {
        self.live.lock().get(&slot).cloned()
    }
}

impl TokenHost for RecordingTokens {
    fn issue(&self, slot: SlotId, payload: Option<Payload>, mode: IssueMode) -> Option<Token> {
        let mut live = self.live.lock();
        if let Some(existing) = live.get_mut(&slot) {
            if mode == IssueMode::CreateIfAbsent {
                existing.payload = payload.map(Box::new);
            }
            return Some(existing.clone());
        }
        if !mode.may_create() {
            return None;
        }
        let token = Token::new(self.context, slot, payload);
        live.insert(slot, token.clone());
        Some(token)
    }

    fn send(&self, token: &Token, payload: Option<Payload>) -> Result<(), HostError> {
        self.sent.lock().push((token.clone(), payload));
        Ok(())
    }

    fn revoke(&self, token: &Token) {
        let mut live = self.live.lock();
        if live.get(&token.slot).is_some_and(|t| t.same_handle(token)) {
            live.remove(&token.slot);
        }
    }
}

/// A context whose shuttle goes nowhere.
pub fn detached_context(id: ContextId) -> Context {
    let locker = Locker::new(
        id,
        Arc::new(MemoryDurable::default()),
        Duration::from_secs(60),
    );
    let shuttle = Shuttle::new(
        Arc::new(RecordingTokens::new(id)),
        locker,
        Arc::new(Registry::new()),
    );
    Context::new(id, shuttle)
}

/// Log sink shared between a test and the subscriber writing into it.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a formatting subscriber and return what it logged.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let sink = CapturedLogs::default();
    let writer = sink.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&sink.0.lock()).into_owned();
    (result, logs)
}
