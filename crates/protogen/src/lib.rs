//! Centralized protobuf definitions.
//!
//! Every catalog entity and build record has a wire form defined here. These
//! are the types written to persistent storage and carried in requests, so
//! field tags must never be reused. There should be a minimal amount of logic
//! in this crate.

pub mod build;
pub mod catalog;

#[derive(thiserror::Error, Debug)]
pub enum ProtoConvError {
    #[error("Field required: {0}")]
    RequiredField(String),

    #[error("Unknown enum variant for '{0}': {1}")]
    UnknownEnumVariant(&'static str, i32),
}

/// Helper for converting optional message fields that must be present.
pub trait FromOptionalField<T> {
    /// Convert self into the target type, erroring if the field is `None`.
    fn required(self, field: &'static str) -> Result<T, ProtoConvError>;
}

impl<T, U> FromOptionalField<U> for Option<T>
where
    T: TryInto<U, Error = ProtoConvError>,
{
    fn required(self, field: &'static str) -> Result<U, ProtoConvError> {
        match self {
            Some(v) => v.try_into(),
            None => Err(ProtoConvError::RequiredField(field.to_string())),
        }
    }
}

/// Convert a raw `i32` into a prost enumeration, erroring on unknown values.
pub fn enum_from_i32<E>(name: &'static str, value: i32) -> Result<E, ProtoConvError>
where
    E: TryFrom<i32>,
{
    E::try_from(value).map_err(|_| ProtoConvError::UnknownEnumVariant(name, value))
}
