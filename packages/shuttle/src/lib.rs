//! Shuttle: run a captured procedure inside another, isolated execution
//! context, using nothing but host-issued capability tokens.
//!
//! This crate re-exports the protocol ([`shuttle_core`]) and its wire model
//! ([`wire`]). The in-process host is available as [`sim`] with the `sim`
//! feature.

pub use shuttle_core::*;

pub mod wire {
    pub use shuttle_wire::*;
}

#[cfg(feature = "sim")]
pub use shuttle_sim as sim;
