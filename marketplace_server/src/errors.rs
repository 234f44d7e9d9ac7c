use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::error;
use marketplace_engine::{GatewayError, LifecycleError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("{0}")]
    Lifecycle(#[from] LifecycleError),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not serialize the response. {0}")]
    CouldNotSerializeResponse(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ServerError {
    fn lifecycle_status(e: &LifecycleError) -> StatusCode {
        match e {
            LifecycleError::Validation(_) => StatusCode::BAD_REQUEST,
            LifecycleError::Authorization(_) => StatusCode::FORBIDDEN,
            LifecycleError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            LifecycleError::TerminalState(_, _) => StatusCode::BAD_REQUEST,
            LifecycleError::InvalidState { .. } => StatusCode::BAD_REQUEST,
            LifecycleError::InvalidTrackingFormat { .. } => StatusCode::BAD_REQUEST,
            LifecycleError::ConcurrentModification(_) => StatusCode::CONFLICT,
            LifecycleError::DuplicateTracking(_) => StatusCode::CONFLICT,
            LifecycleError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            LifecycleError::TrackingNotFound(_) => StatusCode::NOT_FOUND,
            LifecycleError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            LifecycleError::Gateway(g) => match g {
                GatewayError::Timeout | GatewayError::Unavailable(_) | GatewayError::NotConfigured(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                },
                GatewayError::Rejected(_) | GatewayError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
            },
            LifecycleError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Lifecycle(e) => Self::lifecycle_status(e),
            Self::AuthenticationError(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::CouldNotSerializeResponse(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("💻️ Request failed with {status}. {self}");
        }
        HttpResponse::build(status)
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "success": false, "message": self.to_string() }).to_string())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("No bearer token was found in the Authorization header.")]
    MissingToken,
    #[error("The access token is not in the correct format. {0}")]
    PoorlyFormattedToken(String),
    #[error("The access token has expired.")]
    TokenExpired,
    #[error("The access token could not be validated. {0}")]
    ValidationError(String),
}
