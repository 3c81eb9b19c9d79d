//! The metastore crate manages versioned catalogs and the index builds
//! derived from them.
pub mod build;
pub mod build_config;
pub mod config;
pub mod controller;
pub mod errors;
pub mod local;
pub mod reconciler;
pub mod snapshot;
pub mod srv;
pub mod storage;
pub mod transaction;
