//! Closure kinds used by the simulation scenario.

use std::sync::Arc;

use parking_lot::Mutex;
use shuttle_core::{CapturedClosure, ClosureKind, Registry};
use shuttle_wire::{ArgType, ContextId};
use tracing::{info, warn};

pub const NOTE: &str = "sim.note";
pub const RELAY: &str = "sim.relay";

/// A note written by a procedure, tagged with the context it ran in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Note {
    pub context: ContextId,
    pub text: String,
}

/// Notes written by every context of a simulation, in arrival order.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Note>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, context: ContextId, text: impl Into<String>) {
        self.0.lock().push(Note {
            context,
            text: text.into(),
        });
    }

    pub fn notes(&self) -> Vec<Note> {
        self.0.lock().clone()
    }

    pub fn notes_in(&self, context: ContextId) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter(|n| n.context == context)
            .map(|n| n.text.clone())
            .collect()
    }
}

/// Registry with the scenario kinds, all writing into `journal`.
///
/// - `sim.note(text, ctx)` records `text` in the context it runs in.
/// - `sim.relay(target, text, ctx)` shuttles a note on to `target`.
pub fn registry(journal: Journal) -> Registry {
    let mut registry = Registry::new();

    let notes = journal.clone();
    registry.register(ClosureKind::procedure(
        NOTE,
        vec![ArgType::String, ArgType::Context],
        move |ctx, args| {
            let text = args.str(0).unwrap_or_default();
            info!(context = %ctx.id(), text, "Note");
            notes.push(ctx.id(), text);
        },
    ));

    registry.register(ClosureKind::procedure(
        RELAY,
        vec![ArgType::Integer, ArgType::String, ArgType::Context],
        move |ctx, args| {
            let Some(target) = args.i64(0).and_then(|t| u32::try_from(t).ok()) else {
                warn!(context = %ctx.id(), "Relay without a valid target");
                return;
            };
            let text = args.str(1).unwrap_or_default();
            journal.push(ctx.id(), format!("relay {} -> {}", text, target));
            match ctx.shuttle().shuttle(ContextId(target), &note(text)) {
                Ok(true) => {}
                Ok(false) => warn!(context = %ctx.id(), target, "No shuttle for relay"),
                Err(e) => warn!(context = %ctx.id(), target, error = %e, "Relay failed"),
            }
        },
    ));

    registry
}

/// A captured `sim.note`. Captured fields are laid out `[ctx, text]`.
pub fn note(text: &str) -> CapturedClosure {
    CapturedClosure::new(NOTE)
        .context()
        .field(ArgType::String, text)
}

/// A captured `sim.relay`. Captured fields are laid out `[text, ctx, target]`.
pub fn relay(target: ContextId, text: &str) -> CapturedClosure {
    CapturedClosure::new(RELAY)
        .field(ArgType::String, text)
        .context()
        .field(ArgType::Integer, i64::from(target.0))
}
