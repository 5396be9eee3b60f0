//! # Shuttle
//!
//! Run a captured procedure inside another, isolated execution context using
//! nothing but host-issued capability tokens.
//!
//! Contexts share no memory and may not even be running. The only thing that
//! crosses the boundary is a token: an opaque, revocable handle that delivers
//! a payload into the context that issued it. On top of that primitive this
//! crate builds:
//!
//! - a **closure codec** ([`codec`]) that turns a registered closure kind plus
//!   captured fields into a descriptor and back,
//! - a **locker** ([`locker`]) that durably caches, per remote context, the
//!   token leading into it,
//! - a **bootstrap** handshake ([`bootstrap`], [`bridge`]) that gets a hub
//!   token into every sibling and a reverse token back into the hub,
//! - a **dispatcher** ([`dispatcher`]) that classifies each inbound message,
//! - and the application-facing [`Shuttle::shuttle`].
//!
//! ## Handshake
//!
//! ```text
//!  hub (0)                                   sibling (1)
//!  ───────                                   ───────────
//!  start(): 1 unlocked
//!  issue hub token ──launch entry point──►   on_launched(options)
//!                     (side channel)           extract hub token
//!                                              Locker::save(0, hub token)
//!  on_message(reverse) ◄──── send ─────────    issue reverse token
//!  Locker::save(1, reverse)
//!
//!  shuttle(1, closure) ───── send ─────────►  on_message(descriptor)
//!                                              decode, invoke with ctx 1
//! ```
//!
//! The protocol is one-way and best effort. `shuttle` only reports whether a
//! channel existed; failures on the receiving side surface in logs only.
//!
//! ## Host
//!
//! Everything host specific lives behind the traits in [`host`]. The
//! `shuttle-sim` crate provides an in-process implementation.

pub mod bootstrap;
pub mod bridge;
pub mod codec;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod host;
pub mod locker;
pub mod service;
pub mod shuttle;

#[cfg(test)]
mod testing;

pub use bootstrap::Bootstrap;
pub use bridge::{Bridge, SideChannel, UsageReportSideChannel};
pub use codec::{Args, CapturedClosure, Closure, ClosureKind, Field, Invocation, Registry};
pub use config::ShuttleConfig;
pub use context::Context;
pub use dispatcher::{Dispatch, Dispatcher};
pub use error::{HostError, Result, ShuttleError};
pub use host::{ContextDirectory, DurableStore, TokenHost};
pub use locker::Locker;
pub use service::{ShuttleService, ShuttleServiceBuilder};
pub use shuttle::Shuttle;
