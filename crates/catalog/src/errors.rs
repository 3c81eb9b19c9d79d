use protogen::ProtoConvError;

use crate::keys::EntityKind;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Missing {kind}: {name}")]
    NotFound { kind: EntityKind, name: String },

    #[error("Duplicate {kind}: {name}")]
    AlreadyExists { kind: EntityKind, name: String },

    #[error("Invalid {kind}: {reason}")]
    Invalid { kind: EntityKind, reason: String },

    #[error(transparent)]
    ProtoConv(#[from] ProtoConvError),
}

impl CatalogError {
    pub fn not_found(kind: EntityKind, name: impl ToString) -> Self {
        CatalogError::NotFound {
            kind,
            name: name.to_string(),
        }
    }

    pub fn already_exists(kind: EntityKind, name: impl ToString) -> Self {
        CatalogError::AlreadyExists {
            kind,
            name: name.to_string(),
        }
    }

    pub fn invalid(kind: EntityKind, reason: impl Into<String>) -> Self {
        CatalogError::Invalid {
            kind,
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound { .. })
    }
}

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;

/// Ensure a name from a request is usable as a key.
pub(crate) fn validate_name(kind: EntityKind, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CatalogError::invalid(kind, "name must not be empty"));
    }
    if name.contains('/') {
        return Err(CatalogError::invalid(
            kind,
            format!("name must not contain '/': {name}"),
        ));
    }
    Ok(())
}
