use std::fmt;

use serde::{Deserialize, Serialize};

/// Version of a published catalog tree.
///
/// Every successful transaction advances the version by exactly one. Entities
/// inside the tree also carry a version: the catalog version at which they
/// last changed. An entity touched by an in-flight mutation holds
/// [`CatalogVersion::INVALID`] until the transaction stamps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogVersion(i64);

impl CatalogVersion {
    /// No version assigned yet.
    pub const INVALID: CatalogVersion = CatalogVersion(-1);
    /// Version of the first snapshot of a catalog.
    pub const INITIAL: CatalogVersion = CatalogVersion(0);

    pub const fn new(v: i64) -> Self {
        CatalogVersion(v)
    }

    pub const fn get(&self) -> i64 {
        self.0
    }

    pub const fn is_valid(&self) -> bool {
        self.0 >= 0
    }

    pub const fn next(&self) -> CatalogVersion {
        CatalogVersion(self.0 + 1)
    }
}

impl Default for CatalogVersion {
    fn default() -> Self {
        CatalogVersion::INVALID
    }
}

impl From<i64> for CatalogVersion {
    fn from(value: i64) -> Self {
        CatalogVersion(value)
    }
}

impl fmt::Display for CatalogVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
