//! Wire form of build records.

use serde::{Deserialize, Serialize};

pub use crate::catalog::BuildType;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ::prost::Enumeration,
)]
#[repr(i32)]
pub enum BuildState {
    Unspecified = 0,
    Running = 1,
    Stopped = 2,
}

impl BuildState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BuildId {
    #[prost(string, tag = "1")]
    pub catalog_name: String,
    #[prost(string, tag = "2")]
    pub database_name: String,
    #[prost(string, tag = "3")]
    pub table_name: String,
    #[prost(string, tag = "4")]
    pub partition_name: String,
    #[prost(uint64, tag = "5")]
    pub generation_id: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BuildTarget {
    #[prost(enumeration = "BuildType", tag = "1")]
    pub build_type: i32,
    #[prost(enumeration = "BuildState", tag = "2")]
    pub build_state: i32,
    #[prost(string, tag = "3")]
    pub config_path: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Shard {
    #[prost(uint32, tag = "1")]
    pub range_from: u32,
    #[prost(uint32, tag = "2")]
    pub range_to: u32,
    #[prost(int64, tag = "3")]
    pub index_version: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BuildCurrent {
    #[prost(enumeration = "BuildState", tag = "1")]
    pub build_state: i32,
    #[prost(string, tag = "2")]
    pub config_path: String,
    #[prost(string, tag = "3")]
    pub last_error: String,
    #[prost(string, tag = "4")]
    pub index_root: String,
    #[prost(message, repeated, tag = "5")]
    pub shards: Vec<Shard>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Build {
    #[prost(message, optional, tag = "1")]
    pub build_id: Option<BuildId>,
    #[prost(message, optional, tag = "2")]
    pub target: Option<BuildTarget>,
    #[prost(message, optional, tag = "3")]
    pub current: Option<BuildCurrent>,
}

/// The persisted build list of a single catalog.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BuildList {
    #[prost(message, repeated, tag = "1")]
    pub builds: Vec<Build>,
}
