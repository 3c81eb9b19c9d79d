use std::fmt;
use std::path::PathBuf;

use catalog::{CatalogError, CatalogVersion};

use crate::build::BuildId;
use crate::storage::StorageError;

#[derive(thiserror::Error, Debug)]
pub enum MetastoreError {
    #[error("Missing catalog: {0}")]
    MissingCatalog(String),

    #[error("Catalog already exists: {0}")]
    CatalogAlreadyExists(String),

    #[error("Catalog version expired; have: {have}, need: {need}")]
    VersionExpired {
        have: CatalogVersion,
        need: CatalogVersion,
    },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Missing catalog version {version} for catalog '{catalog}'")]
    MissingCatalogVersion {
        catalog: String,
        version: CatalogVersion,
    },

    #[error("Build already exists: {0}; retry once the generation id changes")]
    BuildAlreadyExists(BuildId),

    #[error("Missing build: {0}")]
    MissingBuild(BuildId),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    ProtoConv(#[from] protogen::ProtoConvError),

    #[error("Failed to prepare local store at {}: {source}", path.display())]
    LocalStore {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MetastoreError {
    /// Status code reported for this error.
    pub fn code(&self) -> StatusCode {
        match self {
            Self::MissingCatalog(_) | Self::MissingCatalogVersion { .. } | Self::MissingBuild(_) => {
                StatusCode::NotFound
            }
            Self::CatalogAlreadyExists(_) | Self::BuildAlreadyExists(_) => {
                StatusCode::AlreadyExists
            }
            Self::VersionExpired { .. } => StatusCode::VersionExpired,
            Self::InvalidArguments(_) | Self::ProtoConv(_) => StatusCode::InvalidArguments,
            Self::Catalog(e) => match e {
                CatalogError::NotFound { .. } => StatusCode::NotFound,
                CatalogError::AlreadyExists { .. } => StatusCode::AlreadyExists,
                CatalogError::Invalid { .. } | CatalogError::ProtoConv(_) => {
                    StatusCode::InvalidArguments
                }
            },
            Self::Storage(e) if e.is_not_found() => StatusCode::NotFound,
            Self::Storage(_) | Self::LocalStore { .. } | Self::Internal(_) => {
                StatusCode::InternalError
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == StatusCode::NotFound
    }
}

pub type Result<T, E = MetastoreError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    NotFound,
    VersionExpired,
    InvalidArguments,
    AlreadyExists,
    InternalError,
}

impl StatusCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NotFound => "NOT_FOUND",
            Self::VersionExpired => "VERSION_EXPIRED",
            Self::InvalidArguments => "INVALID_ARGUMENTS",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status attached to every response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseStatus {
    pub code: StatusCode,
    pub message: String,
}

impl ResponseStatus {
    pub fn ok() -> Self {
        ResponseStatus {
            code: StatusCode::Ok,
            message: String::new(),
        }
    }

    /// Build the status for the outcome of a call.
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(e) => e.into(),
        }
    }
}

impl From<&MetastoreError> for ResponseStatus {
    fn from(e: &MetastoreError) -> Self {
        ResponseStatus {
            code: e.code(),
            message: e.to_string(),
        }
    }
}
