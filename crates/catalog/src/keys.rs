//! Keys addressing entities in the catalog tree.
//!
//! Keys carry the full path from the catalog root so an entity can be located
//! in any snapshot of the tree.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Catalog,
    Database,
    Table,
    TableStructure,
    Column,
    Index,
    Partition,
    TableGroup,
    LoadStrategy,
    Function,
}

impl EntityKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Database => "database",
            Self::Table => "table",
            Self::TableStructure => "table structure",
            Self::Column => "column",
            Self::Index => "index",
            Self::Partition => "partition",
            Self::TableGroup => "table group",
            Self::LoadStrategy => "load strategy",
            Self::Function => "function",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatabaseKey {
    pub catalog_name: String,
    pub database_name: String,
}

impl DatabaseKey {
    pub fn new(catalog_name: impl Into<String>, database_name: impl Into<String>) -> Self {
        DatabaseKey {
            catalog_name: catalog_name.into(),
            database_name: database_name.into(),
        }
    }
}

impl fmt::Display for DatabaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.catalog_name, self.database_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableKey {
    pub catalog_name: String,
    pub database_name: String,
    pub table_name: String,
}

impl TableKey {
    pub fn new(
        catalog_name: impl Into<String>,
        database_name: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        TableKey {
            catalog_name: catalog_name.into(),
            database_name: database_name.into(),
            table_name: table_name.into(),
        }
    }

    pub fn database_key(&self) -> DatabaseKey {
        DatabaseKey::new(&self.catalog_name, &self.database_name)
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.catalog_name, self.database_name, self.table_name
        )
    }
}

/// Identifies a partition regardless of the snapshot it was read from.
///
/// Ordering and equality use the full tuple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId {
    pub catalog_name: String,
    pub database_name: String,
    pub table_name: String,
    pub partition_name: String,
}

impl PartitionId {
    pub fn new(
        catalog_name: impl Into<String>,
        database_name: impl Into<String>,
        table_name: impl Into<String>,
        partition_name: impl Into<String>,
    ) -> Self {
        PartitionId {
            catalog_name: catalog_name.into(),
            database_name: database_name.into(),
            table_name: table_name.into(),
            partition_name: partition_name.into(),
        }
    }

    pub fn table_key(&self) -> TableKey {
        TableKey::new(&self.catalog_name, &self.database_name, &self.table_name)
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.catalog_name, self.database_name, self.table_name, self.partition_name
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableGroupKey {
    pub catalog_name: String,
    pub database_name: String,
    pub table_group_name: String,
}

impl TableGroupKey {
    pub fn new(
        catalog_name: impl Into<String>,
        database_name: impl Into<String>,
        table_group_name: impl Into<String>,
    ) -> Self {
        TableGroupKey {
            catalog_name: catalog_name.into(),
            database_name: database_name.into(),
            table_group_name: table_group_name.into(),
        }
    }

    pub fn database_key(&self) -> DatabaseKey {
        DatabaseKey::new(&self.catalog_name, &self.database_name)
    }
}

impl fmt::Display for TableGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.catalog_name, self.database_name, self.table_group_name
        )
    }
}

/// Load strategies are addressed by the table group they belong to and the
/// table they apply to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadStrategyKey {
    pub catalog_name: String,
    pub database_name: String,
    pub table_group_name: String,
    pub table_name: String,
}

impl LoadStrategyKey {
    pub fn new(
        catalog_name: impl Into<String>,
        database_name: impl Into<String>,
        table_group_name: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        LoadStrategyKey {
            catalog_name: catalog_name.into(),
            database_name: database_name.into(),
            table_group_name: table_group_name.into(),
            table_name: table_name.into(),
        }
    }

    pub fn database_key(&self) -> DatabaseKey {
        DatabaseKey::new(&self.catalog_name, &self.database_name)
    }
}

impl fmt::Display for LoadStrategyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.catalog_name, self.database_name, self.table_group_name, self.table_name
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionKey {
    pub catalog_name: String,
    pub database_name: String,
    pub function_name: String,
}

impl FunctionKey {
    pub fn new(
        catalog_name: impl Into<String>,
        database_name: impl Into<String>,
        function_name: impl Into<String>,
    ) -> Self {
        FunctionKey {
            catalog_name: catalog_name.into(),
            database_name: database_name.into(),
            function_name: function_name.into(),
        }
    }

    pub fn database_key(&self) -> DatabaseKey {
        DatabaseKey::new(&self.catalog_name, &self.database_name)
    }
}

impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.catalog_name, self.database_name, self.function_name
        )
    }
}
