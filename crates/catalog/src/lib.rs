//! The in-memory catalog tree.
//!
//! A [`Catalog`] owns databases, which own tables, table groups, functions and
//! load strategies. Tables own an optional structure and their partitions.
//! Every mutation is a plain method on the tree returning a domain error on
//! violation. The tree has value semantics: cloning produces a fully
//! independent copy, which is what lets a rejected transaction be thrown away
//! without touching the published tree.
pub mod catalog;
pub mod database;
pub mod errors;
pub mod function;
pub mod keys;
pub mod load_strategy;
pub mod partition;
pub mod table;
pub mod table_group;
pub mod version;

pub use catalog::Catalog;
pub use errors::{CatalogError, Result};
pub use keys::{
    DatabaseKey, EntityKind, FunctionKey, LoadStrategyKey, PartitionId, TableGroupKey, TableKey,
};
pub use partition::{PartitionBuildInfo, PartitionMarker};
pub use version::CatalogVersion;

/// How much of an entity to include when converting to its wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum DetailLevel {
    /// Only the identifying key.
    Minimal,
    /// All fields of the entity itself, no children.
    Summary,
    /// The entity and its full subtree.
    #[default]
    Detailed,
}

use protogen::catalog::EntityStatus;

pub(crate) fn status_from_proto(raw: i32) -> Result<EntityStatus> {
    Ok(protogen::enum_from_i32("EntityStatus", raw)?)
}

/// Status given to newly created entities when the request leaves it unset.
pub(crate) fn creation_status(status: EntityStatus) -> EntityStatus {
    match status {
        EntityStatus::Unspecified => EntityStatus::PendingPublish,
        other => other,
    }
}

/// Check a parent name carried by a child against the parent it's being
/// attached to. Empty names are filled in from the parent.
pub(crate) fn check_parent(kind: EntityKind, field: &str, expected: &str, actual: &str) -> Result<()> {
    if actual.is_empty() || actual == expected {
        return Ok(());
    }
    Err(CatalogError::invalid(
        kind,
        format!("{field} mismatch; expected: {expected}, got: {actual}"),
    ))
}
