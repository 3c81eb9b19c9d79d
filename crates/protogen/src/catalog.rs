//! Wire form of the catalog tree.
//!
//! Every entity carries its full key (catalog, database, ...) so it can be
//! sent on its own in a request. Repeated children are always ordered by name
//! when produced by the catalog crate.

use serde::{Deserialize, Serialize};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ::prost::Enumeration,
)]
#[repr(i32)]
pub enum EntityStatus {
    Unspecified = 0,
    PendingPublish = 1,
    Published = 2,
    PendingDelete = 3,
    Deleted = 4,
}

impl EntityStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::PendingPublish => "pending_publish",
            Self::Published => "published",
            Self::PendingDelete => "pending_delete",
            Self::Deleted => "deleted",
        }
    }
}

/// How the indexes of a table are built.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ::prost::Enumeration,
)]
#[repr(i32)]
pub enum BuildType {
    Unspecified = 0,
    /// Full batch builds managed by the build registry.
    Offline = 1,
    /// Realtime only, never tracked as a build.
    Direct = 2,
}

impl BuildType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Offline => "offline",
            Self::Direct => "direct",
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Catalog {
    #[prost(string, tag = "1")]
    pub catalog_name: String,
    #[prost(int64, tag = "2")]
    pub version: i64,
    #[prost(enumeration = "EntityStatus", tag = "3")]
    pub status: i32,
    #[prost(string, tag = "4")]
    pub description: String,
    #[prost(message, repeated, tag = "5")]
    pub databases: Vec<Database>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Database {
    #[prost(string, tag = "1")]
    pub catalog_name: String,
    #[prost(string, tag = "2")]
    pub database_name: String,
    #[prost(int64, tag = "3")]
    pub version: i64,
    #[prost(enumeration = "EntityStatus", tag = "4")]
    pub status: i32,
    #[prost(string, tag = "5")]
    pub description: String,
    #[prost(message, repeated, tag = "6")]
    pub tables: Vec<Table>,
    #[prost(message, repeated, tag = "7")]
    pub table_groups: Vec<TableGroup>,
    #[prost(message, repeated, tag = "8")]
    pub functions: Vec<Function>,
    #[prost(message, repeated, tag = "9")]
    pub load_strategies: Vec<LoadStrategy>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Table {
    #[prost(string, tag = "1")]
    pub catalog_name: String,
    #[prost(string, tag = "2")]
    pub database_name: String,
    #[prost(string, tag = "3")]
    pub table_name: String,
    #[prost(int64, tag = "4")]
    pub version: i64,
    #[prost(enumeration = "EntityStatus", tag = "5")]
    pub status: i32,
    #[prost(string, tag = "6")]
    pub description: String,
    #[prost(message, optional, tag = "7")]
    pub table_structure: Option<TableStructure>,
    #[prost(message, repeated, tag = "8")]
    pub partitions: Vec<Partition>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TableStructure {
    #[prost(string, tag = "1")]
    pub catalog_name: String,
    #[prost(string, tag = "2")]
    pub database_name: String,
    #[prost(string, tag = "3")]
    pub table_name: String,
    #[prost(int64, tag = "4")]
    pub version: i64,
    #[prost(message, repeated, tag = "5")]
    pub columns: Vec<Column>,
    #[prost(message, repeated, tag = "6")]
    pub indexes: Vec<Index>,
    #[prost(enumeration = "BuildType", tag = "7")]
    pub build_type: i32,
    #[prost(uint32, tag = "8")]
    pub shard_count: u32,
    #[prost(string, tag = "9")]
    pub comment: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Column {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub column_type: String,
    #[prost(bool, tag = "3")]
    pub nullable: bool,
    #[prost(bool, tag = "4")]
    pub primary_key: bool,
    #[prost(string, tag = "5")]
    pub comment: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Index {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub index_type: String,
    #[prost(string, repeated, tag = "3")]
    pub fields: Vec<String>,
    #[prost(string, tag = "4")]
    pub comment: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Partition {
    #[prost(string, tag = "1")]
    pub catalog_name: String,
    #[prost(string, tag = "2")]
    pub database_name: String,
    #[prost(string, tag = "3")]
    pub table_name: String,
    #[prost(string, tag = "4")]
    pub partition_name: String,
    #[prost(int64, tag = "5")]
    pub version: i64,
    #[prost(enumeration = "EntityStatus", tag = "6")]
    pub status: i32,
    /// Where documents for this partition are read from.
    #[prost(string, tag = "7")]
    pub data_source: String,
    /// Bumped by clients to request a rebuild from the same source.
    #[prost(uint64, tag = "8")]
    pub data_version: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TableGroup {
    #[prost(string, tag = "1")]
    pub catalog_name: String,
    #[prost(string, tag = "2")]
    pub database_name: String,
    #[prost(string, tag = "3")]
    pub table_group_name: String,
    #[prost(int64, tag = "4")]
    pub version: i64,
    #[prost(enumeration = "EntityStatus", tag = "5")]
    pub status: i32,
    #[prost(string, repeated, tag = "6")]
    pub table_names: Vec<String>,
    #[prost(string, tag = "7")]
    pub comment: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LoadStrategy {
    #[prost(string, tag = "1")]
    pub catalog_name: String,
    #[prost(string, tag = "2")]
    pub database_name: String,
    #[prost(string, tag = "3")]
    pub table_group_name: String,
    #[prost(string, tag = "4")]
    pub table_name: String,
    #[prost(int64, tag = "5")]
    pub version: i64,
    #[prost(enumeration = "EntityStatus", tag = "6")]
    pub status: i32,
    #[prost(string, tag = "7")]
    pub online_index_config: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Function {
    #[prost(string, tag = "1")]
    pub catalog_name: String,
    #[prost(string, tag = "2")]
    pub database_name: String,
    #[prost(string, tag = "3")]
    pub function_name: String,
    #[prost(int64, tag = "4")]
    pub version: i64,
    #[prost(enumeration = "EntityStatus", tag = "5")]
    pub status: i32,
    #[prost(string, tag = "6")]
    pub function_type: String,
    #[prost(string, tag = "7")]
    pub function_content: String,
}
