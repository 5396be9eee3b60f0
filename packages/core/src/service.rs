//! One shuttle service per execution context.
//!
//! The service wires the protocol components to the host primitives of the
//! context it runs in. The host calls [`ShuttleService::on_message`] for every
//! token delivery and [`ShuttleService::on_launched`] when it activates the
//! context's entry point; the outer lifecycle calls `start`/`stop`.

use std::sync::Arc;

use shuttle_wire::{ContextId, LaunchOptions, Message, Token};
use tracing::info;

use crate::bootstrap::Bootstrap;
use crate::bridge::{Bridge, SideChannel, UsageReportSideChannel};
use crate::codec::{Closure, Registry};
use crate::config::ShuttleConfig;
use crate::dispatcher::{Dispatch, Dispatcher};
use crate::error::{Result, ShuttleError};
use crate::host::{ContextDirectory, DurableStore, TokenHost};
use crate::locker::Locker;
use crate::shuttle::Shuttle;

/// The protocol running in one context.
pub struct ShuttleService {
    context: ContextId,
    shuttle: Shuttle,
    dispatcher: Dispatcher,
    bridge: Bridge,
    bootstrap: Bootstrap,
}

impl ShuttleService {
    pub fn builder() -> ShuttleServiceBuilder {
        ShuttleServiceBuilder::default()
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    /// A handle for sending closures from this context.
    pub fn handle(&self) -> Shuttle {
        self.shuttle.clone()
    }

    /// Run `closure` in `target`. See [`Shuttle::shuttle`].
    pub fn shuttle(&self, target: ContextId, closure: &dyn Closure) -> Result<bool> {
        self.shuttle.shuttle(target, closure)
    }

    /// Inbound token delivery.
    pub fn on_message(&self, message: Message) -> Dispatch {
        self.dispatcher.on_message(message)
    }

    /// The host activated this context's entry point with `options`.
    pub fn on_launched(&self, options: Option<&LaunchOptions>) -> Option<Token> {
        self.bridge.retrieve(options)
    }

    /// Host-reported unlock of `target`, outside the subscription.
    pub fn on_context_unlocked(&self, target: ContextId) -> Result<bool> {
        self.bootstrap.on_context_unlocked(target)
    }

    /// Begin bootstrap. Hub only; elsewhere this is a logged `NotHub`.
    pub fn start(&self) -> Result<usize> {
        match self.bootstrap.start() {
            Err(ShuttleError::NotHub(context)) => {
                info!(context = %context, "Not the hub, bootstrap disabled");
                Err(ShuttleError::NotHub(context))
            }
            other => other,
        }
    }

    pub fn stop(&self) {
        self.bootstrap.stop();
    }

    pub fn is_hub(&self) -> bool {
        self.bootstrap.is_hub()
    }
}

/// Builder for [`ShuttleService`]: every host dependency is injected.
#[derive(Default)]
pub struct ShuttleServiceBuilder {
    tokens: Option<Arc<dyn TokenHost>>,
    durable: Option<Arc<dyn DurableStore>>,
    directory: Option<Arc<dyn ContextDirectory>>,
    side_channel: Option<Arc<dyn SideChannel>>,
    registry: Registry,
    config: ShuttleConfig,
}

impl ShuttleServiceBuilder {
    pub fn tokens(mut self, tokens: Arc<dyn TokenHost>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn durable(mut self, durable: Arc<dyn DurableStore>) -> Self {
        self.durable = Some(durable);
        self
    }

    pub fn directory(mut self, directory: Arc<dyn ContextDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Defaults to [`UsageReportSideChannel`].
    pub fn side_channel(mut self, side_channel: Arc<dyn SideChannel>) -> Self {
        self.side_channel = Some(side_channel);
        self
    }

    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(mut self, config: ShuttleConfig) -> Self {
        self.config = config;
        self
    }

    /// # Errors
    ///
    /// `InvalidArgument` when a host dependency was not supplied.
    pub fn build(self) -> Result<ShuttleService> {
        let tokens = self
            .tokens
            .ok_or_else(|| ShuttleError::invalid_argument("missing token host"))?;
        let durable = self
            .durable
            .ok_or_else(|| ShuttleError::invalid_argument("missing durable store"))?;
        let directory = self
            .directory
            .ok_or_else(|| ShuttleError::invalid_argument("missing context directory"))?;
        let side_channel = self
            .side_channel
            .unwrap_or_else(|| Arc::new(UsageReportSideChannel));

        let context = directory.current();
        let locker = Locker::new(context, durable, self.config.locker_delay());
        let shuttle = Shuttle::new(tokens.clone(), locker.clone(), Arc::new(self.registry));

        Ok(ShuttleService {
            context,
            dispatcher: Dispatcher::new(shuttle.clone(), locker.clone()),
            bridge: Bridge::new(tokens.clone(), locker, side_channel.clone()),
            bootstrap: Bootstrap::new(directory, tokens, side_channel, &self.config),
            shuttle,
        })
    }
}
