use serde::{Deserialize, Serialize};
use std::fmt;

/// A memory size in bytes, with constructors for the usual binary units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Size(usize);

impl Size {
    pub const fn new(bytes: usize) -> Self {
        Self(bytes)
    }

    pub const fn kibi(n: usize) -> Self {
        Self(n * 1024)
    }

    pub const fn mebi(n: usize) -> Self {
        Self(n * 1024 * 1024)
    }

    pub const fn gibi(n: usize) -> Self {
        Self(n * 1024 * 1024 * 1024)
    }

    pub const fn bytes(&self) -> usize {
        self.0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.0)
    }
}
