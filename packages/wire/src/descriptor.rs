//! Closure descriptors: a procedure in transit.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Value;

/// Stable identity of a closure kind, shared by sender and receiver.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClosureType(pub Cow<'static, str>);

impl ClosureType {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClosureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ClosureType {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for ClosureType {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

/// Wire form of a captured procedure.
///
/// `args` holds the captured field values in field declaration order.
/// Context fields are always `Null` here; the receiver fills them in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClosureDescriptor {
    pub type_id: ClosureType,
    pub args: Vec<Value>,
}

impl ClosureDescriptor {
    pub fn new(type_id: impl Into<ClosureType>, args: Vec<Value>) -> Self {
        Self {
            type_id: type_id.into(),
            args,
        }
    }
}

impl fmt::Display for ClosureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invocation({}, {} args)", self.type_id, self.args.len())
    }
}
