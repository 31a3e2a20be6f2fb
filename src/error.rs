// HTTP API Error Types
use axum::{response::IntoResponse, http::StatusCode, Json};
use serde_json::{json, Value};
use std::collections::HashMap;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 422 Unprocessable Entity (well-formed JSON, semantically invalid)
    UnprocessableEntity(String),

    // 429 Too Many Requests
    TooManyRequests(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::UnprocessableEntity(_) => 422,
            ApiError::TooManyRequests(_) => 429,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::UnprocessableEntity(msg) => msg,
            ApiError::TooManyRequests(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::ValidationError { message, field_errors } => {
                let mut response = json!({
                    "error": true,
                    "message": message,
                    "code": "VALIDATION_ERROR"
                });

                if let Some(field_errors) = field_errors {
                    response["field_errors"] = json!(field_errors);
                }

                response
            }
            _ => {
                json!({
                    "error": true,
                    "message": self.message(),
                    "code": self.error_code()
                })
            }
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::UnprocessableEntity(_) => "UNPROCESSABLE_ENTITY",
            ApiError::TooManyRequests(_) => "TOO_MANY_REQUESTS",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(
        message: impl Into<String>,
        field_errors: Option<HashMap<String, String>>,
    ) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn unprocessable_entity(message: impl Into<String>) -> Self {
        ApiError::UnprocessableEntity(message.into())
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        ApiError::TooManyRequests(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert other error types to ApiError
impl From<crate::database::manager::DatabaseError> for ApiError {
    fn from(err: crate::database::manager::DatabaseError) -> Self {
        match err {
            crate::database::manager::DatabaseError::NotFound(msg) => ApiError::not_found(msg),
            crate::database::manager::DatabaseError::InvalidDatabaseName(name) => {
                tracing::error!("Rejected database name: {}", name);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            crate::database::manager::DatabaseError::ConfigMissing(var) => {
                tracing::error!("Missing configuration: {}", var);
                ApiError::service_unavailable("Service is not fully configured")
            }
            crate::database::manager::DatabaseError::InvalidDatabaseUrl => {
                ApiError::service_unavailable("Service is not fully configured")
            }
            crate::database::manager::DatabaseError::ConnectFailed { database, .. } => {
                tracing::error!("Connection failed for database: {}", database);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            crate::database::manager::DatabaseError::Sqlx(sqlx_err) => {
                // Log the real error but return generic message
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

impl From<crate::database::provisioner::ProvisionError> for ApiError {
    fn from(err: crate::database::provisioner::ProvisionError) -> Self {
        match err {
            crate::database::provisioner::ProvisionError::AlreadyExists(name) => {
                ApiError::conflict(format!("Database for '{}' already exists", name))
            }
            crate::database::provisioner::ProvisionError::Database(e) => e.into(),
            crate::database::provisioner::ProvisionError::Migration(e) => {
                tracing::error!("Tenant migration error: {}", e);
                ApiError::service_unavailable("Service is being updated, please try again later")
            }
            crate::database::provisioner::ProvisionError::Sqlx(e) => {
                tracing::error!("Provisioning error: {}", e);
                ApiError::internal_server_error("Failed to provision tenant database")
            }
        }
    }
}

impl From<crate::services::secret_store::SecretError> for ApiError {
    fn from(err: crate::services::secret_store::SecretError) -> Self {
        tracing::error!("Secret store error: {}", err);
        ApiError::service_unavailable("Credential service unavailable")
    }
}

impl From<crate::auth::AuthError> for ApiError {
    fn from(err: crate::auth::AuthError) -> Self {
        match err {
            crate::auth::AuthError::InvalidToken(msg) => ApiError::unauthorized(msg),
            crate::auth::AuthError::InvalidCredentials => {
                ApiError::unauthorized("Invalid email or password")
            }
            crate::auth::AuthError::MissingSecret => {
                tracing::error!("JWT secret not configured");
                ApiError::service_unavailable("Authentication service unavailable")
            }
            crate::auth::AuthError::Hash(msg) => {
                tracing::error!("Password hash error: {}", msg);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::not_found("Record not found"),
            other => {
                tracing::error!("SQLx error: {}", other);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

impl From<crate::services::org_service::OrgError> for ApiError {
    fn from(err: crate::services::org_service::OrgError) -> Self {
        use crate::services::org_service::OrgError;
        match err {
            OrgError::AlreadyExists(name) => {
                ApiError::conflict(format!("Organization '{}' already exists", name))
            }
            OrgError::InvalidName(msg) => ApiError::bad_request(msg),
            OrgError::NotFound(_) => ApiError::not_found("Organization not found"),
            OrgError::Database(e) => e.into(),
            OrgError::Manager(e) => e.into(),
            OrgError::Provision(e) => e.into(),
            OrgError::Secret(e) => e.into(),
            OrgError::Auth(e) => e.into(),
        }
    }
}

impl From<crate::services::user_service::UserError> for ApiError {
    fn from(err: crate::services::user_service::UserError) -> Self {
        use crate::services::user_service::UserError;
        match err {
            UserError::EmailTaken(_) => ApiError::conflict("Email is already registered"),
            UserError::NotFound => ApiError::not_found("User not found"),
            UserError::Database(e) => e.into(),
            UserError::Auth(e) => e.into(),
        }
    }
}

impl From<crate::services::appointment_service::AppointmentError> for ApiError {
    fn from(err: crate::services::appointment_service::AppointmentError) -> Self {
        use crate::services::appointment_service::AppointmentError;
        match err {
            AppointmentError::NotFound => ApiError::not_found("Appointment not found"),
            AppointmentError::UnknownDoctor => ApiError::not_found("Doctor not found"),
            AppointmentError::InvalidStatus(status) => {
                ApiError::bad_request(format!("Unknown appointment status: {}", status))
            }
            AppointmentError::IllegalTransition { from, to } => ApiError::unprocessable_entity(
                format!("Cannot move appointment from {} to {}", from, to),
            ),
            AppointmentError::NotReschedulable => ApiError::unprocessable_entity(
                "Appointment can only be rescheduled while pending",
            ),
            AppointmentError::Database(e) => e.into(),
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
