//! Bootstrap coordinator: get a hub token into every sibling context.
//!
//! The hub sweeps its siblings once at start, launching each unlocked one
//! with a hub token on the side channel, and then re-attempts whenever the
//! host reports a context unlocked. Handoff is idempotent (the hub token is
//! reused), so re-attempting on every unlock is safe; the sibling simply
//! overwrites its cached channel.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use shuttle_wire::{ContextId, IssueMode, SlotId};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bridge::SideChannel;
use crate::config::ShuttleConfig;
use crate::error::{HostError, Result, ShuttleError};
use crate::host::{ContextDirectory, TokenHost};

/// One handoff attempt, shared with the unlock watcher task.
#[derive(Clone)]
struct Handoff {
    context: ContextId,
    directory: Arc<dyn ContextDirectory>,
    tokens: Arc<dyn TokenHost>,
    side_channel: Arc<dyn SideChannel>,
    dedupe: bool,
    handed_off: Arc<Mutex<BTreeSet<ContextId>>>,
}

impl Handoff {
    /// Launch `target`'s entry point carrying a hub token.
    ///
    /// `Ok(false)` when the attempt was skipped (locked, or already handed
    /// off with deduplication on).
    fn attempt(&self, target: ContextId) -> Result<bool> {
        if self.dedupe && self.handed_off.lock().contains(&target) {
            debug!(context = %self.context, target = %target, "Already handed off");
            return Ok(false);
        }
        if !self.directory.is_unlocked(target) {
            info!(context = %self.context, target = %target, "Skip stopped or locked context");
            return Ok(false);
        }

        let token = self
            .tokens
            .issue(SlotId::shuttle(self.context), None, IssueMode::CreateIfAbsent)
            .ok_or(HostError::TokenUnavailable)?;
        let options = self.side_channel.attach(token);

        match self.directory.launch_entry_point(target, options) {
            Ok(()) => {
                info!(context = %self.context, target = %target, "Initializing shuttle to context");
                self.handed_off.lock().insert(target);
                Ok(true)
            }
            Err(HostError::NoEntryPoint(target)) => {
                error!(context = %self.context, target = %target, "No launchable entry point");
                Err(ShuttleError::NoEntryPoint(target))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Attempt, logging instead of returning failures.
    fn attempt_logged(&self, target: ContextId) -> bool {
        match self.attempt(target) {
            Ok(launched) => launched,
            Err(e) => {
                warn!(context = %self.context, target = %target, error = %e, "Handoff failed");
                false
            }
        }
    }
}

/// Hub-side bootstrap driver.
pub struct Bootstrap {
    handoff: Handoff,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Bootstrap {
    pub fn new(
        directory: Arc<dyn ContextDirectory>,
        tokens: Arc<dyn TokenHost>,
        side_channel: Arc<dyn SideChannel>,
        config: &ShuttleConfig,
    ) -> Self {
        Self {
            handoff: Handoff {
                context: directory.current(),
                directory,
                tokens,
                side_channel,
                dedupe: config.dedupe_unlock_events,
                handed_off: Arc::new(Mutex::new(BTreeSet::new())),
            },
            watcher: Mutex::new(None),
        }
    }

    pub fn context(&self) -> ContextId {
        self.handoff.context
    }

    pub fn is_hub(&self) -> bool {
        self.handoff.context == self.handoff.directory.hub()
    }

    /// Sweep unlocked siblings and start watching for unlock events.
    ///
    /// Must run inside a tokio runtime. Returns the number of siblings whose
    /// entry point was launched. Calling it again while running only sweeps.
    ///
    /// # Errors
    ///
    /// `NotHub` outside the hub, `InvalidArgument` outside a runtime.
    pub fn start(&self) -> Result<usize> {
        if !self.is_hub() {
            return Err(ShuttleError::NotHub(self.handoff.context));
        }
        let runtime = Handle::try_current()
            .map_err(|_| ShuttleError::invalid_argument("bootstrap requires a tokio runtime"))?;

        info!(context = %self.handoff.context, "Initializing shuttles...");
        let launched = self
            .handoff
            .directory
            .contexts()
            .into_iter()
            .filter(|c| *c != self.handoff.context)
            .filter(|c| self.handoff.attempt_logged(*c))
            .count();

        let mut watcher = self.watcher.lock();
        if watcher.is_none() {
            let mut events = self.handoff.directory.subscribe_unlocked();
            let handoff = self.handoff.clone();
            *watcher = Some(runtime.spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(target) if target == handoff.context => {}
                        Ok(target) => {
                            handoff.attempt_logged(target);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(context = %handoff.context, skipped, "Missed unlock events");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }));
        }
        Ok(launched)
    }

    /// Hand off to one context now, as an unlock event would.
    pub fn on_context_unlocked(&self, target: ContextId) -> Result<bool> {
        if target == self.handoff.context {
            return Ok(false);
        }
        self.handoff.attempt(target)
    }

    /// Stop watching unlock events. Idempotent.
    pub fn stop(&self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
            info!(context = %self.handoff.context, "Stopped watching unlock events");
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }
}

impl Drop for Bootstrap {
    fn drop(&mut self) {
        self.stop();
    }
}
