//! A whole installation: host, one shuttle service per context, and the
//! delivery pump that feeds queued deliveries to those services.

use std::collections::BTreeMap;
use std::path;
use std::sync::Arc;

use shuttle_core::{Dispatch, DurableStore, Registry, ShuttleConfig, ShuttleService};
use shuttle_wire::{ContextId, LaunchOptions, Message, Token};
use tracing::{debug, warn};

use crate::durable::{InMemoryDurableStore, JSONDurableStore};
use crate::error::{Result, SimError};
use crate::host::{Delivery, SimHost};

/// Where each context keeps its locker entries.
#[derive(Clone, Debug)]
pub enum Durability {
    /// Process memory: a restart loses every entry.
    Memory,
    /// One JSON file per context under the given directory.
    Json(path::PathBuf),
}

impl Durability {
    fn open(&self, context: ContextId) -> Result<Arc<dyn DurableStore>> {
        Ok(match self {
            Durability::Memory => Arc::new(InMemoryDurableStore::new()),
            Durability::Json(root) => Arc::new(JSONDurableStore::open(root, context)?),
        })
    }
}

/// What happened to one delivery.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Dispatched(Dispatch),
    /// The entry point ran; carries the handshake token it found, if any.
    Launched(Option<Token>),
    /// The bytes did not parse.
    Malformed,
}

pub struct World {
    host: SimHost,
    config: ShuttleConfig,
    registry: Registry,
    durability: Durability,
    services: BTreeMap<ContextId, ShuttleService>,
}

impl World {
    /// Build a service for every context the host knows.
    pub fn new(
        host: SimHost,
        config: ShuttleConfig,
        registry: Registry,
        durability: Durability,
    ) -> Result<Self> {
        let mut world = Self {
            host,
            config,
            registry,
            durability,
            services: BTreeMap::new(),
        };
        for context in world.host.contexts() {
            let service = world.build_service(context)?;
            world.services.insert(context, service);
        }
        Ok(world)
    }

    fn build_service(&self, context: ContextId) -> Result<ShuttleService> {
        let view = Arc::new(self.host.view(context)?);
        Ok(ShuttleService::builder()
            .tokens(view.clone())
            .directory(view)
            .durable(self.durability.open(context)?)
            .registry(self.registry.clone())
            .config(self.config.clone())
            .build()?)
    }

    pub fn host(&self) -> &SimHost {
        &self.host
    }

    pub fn service(&self, context: ContextId) -> Result<&ShuttleService> {
        self.services
            .get(&context)
            .ok_or(SimError::UnknownContext(context))
    }

    /// Start the hub's bootstrap. Requires a tokio runtime.
    pub fn start(&self) -> Result<usize> {
        Ok(self.service(self.host.hub())?.start()?)
    }

    /// Add a context to the installation after start.
    pub fn add_context(&mut self, context: ContextId, unlocked: bool) -> Result<()> {
        self.host.add_context(context, unlocked);
        if !self.services.contains_key(&context) {
            let service = self.build_service(context)?;
            self.services.insert(context, service);
        }
        Ok(())
    }

    /// Tear down and rebuild `context`'s service, as after a process
    /// restart. The hub is restarted with its bootstrap running again.
    ///
    /// On failure the running service stays in place.
    pub fn restart(&mut self, context: ContextId) -> Result<()> {
        let service = self.build_service(context)?;
        if context == self.host.hub() {
            service.start()?;
        }
        if let Some(old) = self.services.insert(context, service) {
            old.stop();
        }
        Ok(())
    }

    /// Hand one delivery to `context`'s service.
    pub fn deliver(&self, context: ContextId, delivery: Delivery) -> Result<Outcome> {
        let service = self.service(context)?;
        Ok(match delivery {
            Delivery::Message(bytes) => match Message::from_bytes(&bytes) {
                Ok(message) => Outcome::Dispatched(service.on_message(message)),
                Err(e) => {
                    warn!(context = %context, error = %e, "Dropping malformed message");
                    Outcome::Malformed
                }
            },
            Delivery::Launch(bytes) => match LaunchOptions::from_bytes(&bytes) {
                Ok(options) => Outcome::Launched(service.on_launched(Some(&options))),
                Err(e) => {
                    warn!(context = %context, error = %e, "Dropping malformed launch");
                    Outcome::Malformed
                }
            },
        })
    }

    /// Drain every unlocked context's queue until no context has anything
    /// left, including deliveries produced while draining.
    pub fn deliver_pending(&self) -> Vec<(ContextId, Outcome)> {
        let mut outcomes = Vec::new();
        loop {
            let before = outcomes.len();
            for &context in self.services.keys() {
                while let Some(delivery) = self.host.take_delivery(context) {
                    match self.deliver(context, delivery) {
                        Ok(outcome) => {
                            debug!(context = %context, outcome = ?outcome, "Delivered");
                            outcomes.push((context, outcome));
                        }
                        Err(e) => warn!(context = %context, error = %e, "Delivery failed"),
                    }
                }
            }
            if outcomes.len() == before {
                return outcomes;
            }
        }
    }

    /// Let background tasks (the unlock watcher) run, pumping deliveries
    /// until a few rounds pass with nothing to do.
    pub async fn settle(&self) -> Vec<(ContextId, Outcome)> {
        let mut outcomes = Vec::new();
        let mut idle = 0;
        while idle < 3 {
            tokio::task::yield_now().await;
            let round = self.deliver_pending();
            if round.is_empty() {
                idle += 1;
            } else {
                idle = 0;
                outcomes.extend(round);
            }
        }
        outcomes
    }

    pub fn stop(&self) {
        for service in self.services.values() {
            service.stop();
        }
    }
}
