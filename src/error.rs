//! Errors surfaced by weight / progress operations

use thiserror::Error;

use crate::overlay::{Coordinate, CoordinateError, WeightError};
use crate::template::TemplateError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Coordinate(#[from] CoordinateError),

    #[error(transparent)]
    InvalidWeight(#[from] WeightError),

    #[error("invalid week number: {0}")]
    InvalidWeek(String),

    #[error("{0} is outside the assigned routine")]
    OutOfBoundsCoordinate(Coordinate),

    #[error("student {0} has no assigned routine")]
    TemplateNotFound(String),

    #[error("student {0} not found")]
    StudentNotFound(String),

    #[error(transparent)]
    InvalidTemplate(#[from] TemplateError),

    #[error("malformed request: {0}")]
    BadRequest(String),

    /// Storage failure; never retried
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ServiceError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Coordinate(CoordinateError::InvalidCoordinate(_)) => "INVALID_COORDINATE",
            ServiceError::Coordinate(CoordinateError::MalformedKey { .. }) => "MALFORMED_KEY",
            ServiceError::InvalidWeight(_) => "INVALID_WEIGHT",
            ServiceError::InvalidWeek(_) => "INVALID_WEEK",
            ServiceError::OutOfBoundsCoordinate(_) => "OUT_OF_BOUNDS_COORDINATE",
            ServiceError::TemplateNotFound(_) => "TEMPLATE_NOT_FOUND",
            ServiceError::StudentNotFound(_) => "STUDENT_NOT_FOUND",
            ServiceError::InvalidTemplate(_) => "INVALID_TEMPLATE",
            ServiceError::BadRequest(_) => "BAD_REQUEST",
            ServiceError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// User-correctable request problem
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            ServiceError::Storage(_)
                | ServiceError::TemplateNotFound(_)
                | ServiceError::StudentNotFound(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ServiceError::TemplateNotFound(_) | ServiceError::StudentNotFound(_)
        )
    }
}
