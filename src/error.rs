//! Typed failures that the UI distinguishes when surfacing errors. Everything
//! travels as `anyhow::Error`; these types sit somewhere in the chain and are
//! recovered with [`classify`].

use anyhow::Error;
use thiserror::Error;

/// Input rejected before any store call was made.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    /// Form field the message belongs next to.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// The store refused an otherwise well-formed request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("{entity} not found.")]
    NotFound { entity: &'static str },
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    PermissionDenied(String),
    #[error("Only {remaining} spots left for this experience.")]
    CapacityExceeded { remaining: u32 },
}

/// Coarse bucket used to decide how an error is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    Validation(ValidationError),
    Backend(BackendError),
    Unknown,
}

/// Walk the error chain and report the first typed failure found.
pub fn classify(err: &Error) -> ErrorClass {
    if let Some(validation) = err.downcast_ref::<ValidationError>() {
        return ErrorClass::Validation(validation.clone());
    }
    if let Some(backend) = err.downcast_ref::<BackendError>() {
        return ErrorClass::Backend(backend.clone());
    }
    for cause in err.chain() {
        if let Some(validation) = cause.downcast_ref::<ValidationError>() {
            return ErrorClass::Validation(validation.clone());
        }
        if let Some(backend) = cause.downcast_ref::<BackendError>() {
            return ErrorClass::Backend(backend.clone());
        }
    }
    ErrorClass::Unknown
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Context};

    use super::*;

    #[test]
    fn classify_finds_typed_cause_behind_context() {
        let err = Err::<(), _>(BackendError::NotFound { entity: "Booking" })
            .context("failed to cancel booking")
            .unwrap_err();
        assert_eq!(
            classify(&err),
            ErrorClass::Backend(BackendError::NotFound { entity: "Booking" })
        );

        let err: Error = ValidationError::new("email", "Invalid email format").into();
        assert!(matches!(classify(&err), ErrorClass::Validation(v) if v.field == "email"));

        assert_eq!(classify(&anyhow!("disk on fire")), ErrorClass::Unknown);
    }
}
