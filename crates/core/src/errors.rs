use thiserror::Error;

use crate::domain::request::RequestStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid request transition from {from} to {to}")]
    InvalidTransition { from: RequestStatus, to: RequestStatus },
    #[error("validation failed: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("notification failure: {0}")]
    Notification(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("upstream failure: {message}")]
    BadGateway { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => "The request has already been decided.",
            Self::BadGateway { .. } => {
                "The request was saved but the approver could not be notified."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::BadGateway { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::BadGateway { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::BadGateway { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::Validation(message)) => {
                Self::BadRequest { message, correlation_id }
            }
            ApplicationError::Domain(error @ DomainError::InvalidTransition { .. }) => {
                Self::Conflict { message: error.to_string(), correlation_id }
            }
            ApplicationError::NotFound(message) => Self::NotFound { message, correlation_id },
            ApplicationError::Notification(message) => Self::BadGateway { message, correlation_id },
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
