use thiserror::Error;

/// Errors raised by the reference, settings and port layers.
///
/// `CommError` in the sibling transport crate wraps this one for failures
/// that originate below the wire, the way `EisenbahnError` wraps codec and
/// I/O failures in the messaging layer this crate descends from.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("parameter not found: {0}")]
    ParameterNotFound(String),

    #[error("type mismatch for parameter {name}: expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("base settings are immutable after load")]
    BaseImmutable,
}

pub type CoreResult<T> = Result<T, CoreError>;
