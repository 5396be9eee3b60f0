//! Scenario runner behind the `shuttle-sim` binary.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::{fs, io};

use shuttle_core::ShuttleConfig;
use shuttle_sim::demo::{self, Journal, Note};
use shuttle_sim::{Durability, SimError, SimHost, World};
use shuttle_wire::ContextId;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("cannot read config {path:?}: {error}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        error: io::Error,
    },

    #[error("invalid config {path:?}: {error}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        error: serde_json::Error,
    },

    #[error("cannot start runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error(transparent)]
    Sim(#[from] SimError),
}

pub type Result<T> = std::result::Result<T, CliError>;

pub fn load_config(path: &Path) -> Result<ShuttleConfig> {
    let json = fs::read_to_string(path).map_err(|error| CliError::ConfigRead {
        path: path.to_path_buf(),
        error,
    })?;
    ShuttleConfig::from_json(&json).map_err(|error| CliError::ConfigParse {
        path: path.to_path_buf(),
        error,
    })
}

/// One simulated installation.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub siblings: u32,
    pub locked: BTreeSet<u32>,
    /// Unlock the locked siblings once the first round is done.
    pub unlock: bool,
    pub state_dir: Option<PathBuf>,
    pub config: ShuttleConfig,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            siblings: 2,
            locked: BTreeSet::from([2]),
            unlock: true,
            state_dir: None,
            config: ShuttleConfig::default(),
        }
    }
}

impl Scenario {
    /// Bootstrap, greet every sibling from the hub, unlock the rest, greet
    /// again, then have every sibling answer the hub. Returns every note
    /// written along the way.
    pub fn run(&self) -> Result<Vec<Note>> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(CliError::Runtime)?;
        runtime.block_on(self.run_async())
    }

    async fn run_async(&self) -> Result<Vec<Note>> {
        let hub = ContextId::HUB;
        let host = SimHost::new(hub, self.config.delivery_capacity);
        let siblings: Vec<ContextId> = (1..=self.siblings).map(ContextId).collect();
        for &sibling in &siblings {
            host.add_context(sibling, !self.locked.contains(&sibling.0));
        }

        let durability = match &self.state_dir {
            Some(dir) => Durability::Json(dir.clone()),
            None => Durability::Memory,
        };
        let journal = Journal::new();
        let world = World::new(
            host,
            self.config.clone(),
            demo::registry(journal.clone()),
            durability,
        )?;

        let launched = world.start()?;
        world.settle().await;
        info!(launched, "Bootstrap sweep done");

        self.greet(&world, &siblings, "first round")?;
        world.settle().await;

        if self.unlock {
            for &sibling in &siblings {
                if !world.host().is_unlocked(sibling) {
                    world.host().unlock(sibling)?;
                }
            }
            world.settle().await;
            self.greet(&world, &siblings, "after unlock")?;
            world.settle().await;
        }

        for &sibling in &siblings {
            let service = world.service(sibling)?;
            let text = format!("hello from {}", sibling);
            if !service.shuttle(hub, &demo::note(&text)).map_err(SimError::from)? {
                info!(context = %sibling, "No shuttle to the hub");
            }
        }
        world.settle().await;
        world.stop();

        Ok(journal.notes())
    }

    fn greet(&self, world: &World, siblings: &[ContextId], round: &str) -> Result<()> {
        let hub = world.service(ContextId::HUB)?;
        for &sibling in siblings {
            let text = format!("{} to {}", round, sibling);
            let sent = hub
                .shuttle(sibling, &demo::note(&text))
                .map_err(SimError::from)?;
            info!(target_context = %sibling, sent, round, "Greeting");
        }
        Ok(())
    }
}
