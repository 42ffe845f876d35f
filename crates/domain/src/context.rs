//! Caller identity and per-call context

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque caller identity supplied by the host
///
/// The ledger never authenticates a principal; it only compares it against
/// identities it has stored.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Wrap a host identity
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identity as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identity is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Principal {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Everything an operation learns from the host for one call
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    /// Caller identity
    pub caller: &'a Principal,
    /// Oracle time (Unix seconds)
    pub time: u64,
    /// Oracle height
    pub height: u64,
}

/// Storage key made of a string id and a second component
///
/// The first component is length-prefixed so ids containing `/` cannot
/// collide, e.g. `V1` + `3` renders as `2:V1/3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompoundKey<'a, T: fmt::Display>(pub &'a str, pub T);

impl<T: fmt::Display> fmt::Display for CompoundKey<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.0.len(), self.0, self.1)
    }
}
