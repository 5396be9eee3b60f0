//! Shuttle wire layer: the data that crosses an isolation boundary.
//!
//! Nothing in this crate knows how a message is delivered. It only defines
//! what a message looks like once a host has carried it across:
//!
//! - `Value` / `ArgType`: captured argument values and their declared types
//! - `ContextId` / `SlotId`: who a token belongs to and which slot it occupies
//! - `Token`: an opaque, revocable capability handle
//! - `ClosureDescriptor`: a procedure marshaled as type identity + arguments
//! - `Payload` / `Message`: what a dispatcher receives
//!
//! # Example
//!
//! ```rust
//! use shuttle_wire::{ClosureDescriptor, Message, Payload, Value};
//!
//! let descriptor = ClosureDescriptor::new("greet", vec![Value::from("Alice"), Value::Null]);
//! let message = Message::new(Payload::Invocation(descriptor));
//!
//! let bytes = message.to_bytes().unwrap();
//! assert_eq!(Message::from_bytes(&bytes).unwrap(), message);
//! ```

mod context;
mod descriptor;
mod error;
mod message;
mod token;
mod value;

pub use context::{ContextId, SlotId, SlotKind};
pub use descriptor::{ClosureDescriptor, ClosureType};
pub use error::WireError;
pub use message::{LaunchOptions, Message, Payload, USAGE_TIME_REPORT};
pub use token::{IssueMode, Token, TokenId};
pub use value::{ArgType, Value};
