//! In-process host for the shuttle protocol.
//!
//! [`SimHost`] implements the host traits of `shuttle-core` for any number
//! of contexts living in one process, and [`World`] runs a
//! [`ShuttleService`](shuttle_core::ShuttleService) in each of them:
//!
//! ```no_run
//! use shuttle_core::ShuttleConfig;
//! use shuttle_sim::{demo, Durability, SimHost, World};
//! use shuttle_wire::ContextId;
//!
//! # async fn run() -> shuttle_sim::Result<()> {
//! let host = SimHost::new(ContextId::HUB, 1024);
//! host.add_context(ContextId(1), true);
//!
//! let journal = demo::Journal::new();
//! let world = World::new(
//!     host,
//!     ShuttleConfig::default(),
//!     demo::registry(journal.clone()),
//!     Durability::Memory,
//! )?;
//! world.start()?;
//! world.settle().await;
//!
//! let hub = world.service(ContextId::HUB)?;
//! hub.shuttle(ContextId(1), &demo::note("hello"))?;
//! world.settle().await;
//! assert_eq!(journal.notes_in(ContextId(1)), ["hello"]);
//! # Ok(())
//! # }
//! ```

pub mod demo;
pub mod durable;
pub mod error;
pub mod host;
pub mod world;

pub use durable::{InMemoryDurableStore, JSONDurableStore};
pub use error::{Result, SimError};
pub use host::{Delivery, SimContext, SimHost};
pub use world::{Durability, Outcome, World};
