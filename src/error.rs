// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

/// HTTP API error with appropriate status codes and client-friendly messages.
///
/// Boundary denials serialize as `{"error": "<message>"}`; the two special
/// cases (`BreakGlassRequired`, `RateLimited`) carry extra fields that
/// clients and compliance tooling match on.
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError(String),

    // 403 Forbidden
    Forbidden(String),
    /// A superadmin tried to touch tenant data without an effective
    /// break-glass grant. Distinguishable from an ordinary 403 by `code`.
    BreakGlassRequired(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 429 Too Many Requests
    TooManyRequests(String),
    /// Per-tenant rate limit tripped. Carries the fields the wire contract
    /// promises alongside the `X-RateLimit-*` headers.
    RateLimited {
        message: String,
        retry_after_secs: u64,
        limit: u32,
        window_ms: u64,
        reset_in_secs: u64,
    },

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
            ApiError::ValidationError(_) => 400,
            ApiError::Forbidden(_) => 403,
            ApiError::BreakGlassRequired(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::TooManyRequests(_) => 429,
            ApiError::RateLimited { .. } => 429,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::BreakGlassRequired(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::TooManyRequests(msg) => msg,
            ApiError::RateLimited { message, .. } => message,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::RateLimited {
                message,
                retry_after_secs,
                limit,
                window_ms,
                reset_in_secs,
            } => {
                json!({
                    "success": false,
                    "error": message,
                    "code": "RATE_LIMITED",
                    "retryAfter": retry_after_secs,
                    "details": {
                        "limit": limit,
                        "windowMs": window_ms,
                        "resetIn": reset_in_secs,
                    }
                })
            }
            ApiError::BreakGlassRequired(message) => {
                json!({
                    "error": message,
                    "code": "BREAK_GLASS_REQUIRED",
                })
            }
            _ => {
                json!({ "error": self.message() })
            }
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        ApiError::ValidationError(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn break_glass_required(message: impl Into<String>) -> Self {
        ApiError::BreakGlassRequired(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
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

// Convert domain error types to ApiError
impl From<crate::database::StoreError> for ApiError {
    fn from(err: crate::database::StoreError) -> Self {
        match err {
            crate::database::StoreError::Unavailable(msg) => {
                tracing::error!("Store unavailable: {}", msg);
                ApiError::service_unavailable("Service temporarily unavailable")
            }
            crate::database::StoreError::Sqlx(sqlx_err) => {
                // Log the real error but return generic message
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<crate::permissions::PermissionError> for ApiError {
    fn from(err: crate::permissions::PermissionError) -> Self {
        match err {
            crate::permissions::PermissionError::Validation(msg) => ApiError::validation_error(msg),
            crate::permissions::PermissionError::NotFound(msg) => ApiError::not_found(msg),
            crate::permissions::PermissionError::Store(e) => e.into(),
        }
    }
}

impl From<crate::provisioning::ProvisioningError> for ApiError {
    fn from(err: crate::provisioning::ProvisioningError) -> Self {
        use crate::provisioning::ProvisioningError::*;
        match err {
            InvalidName(msg) => ApiError::validation_error(msg),
            EmailInUse(email) => {
                ApiError::conflict(format!("An account already exists for {}", email))
            }
            SlugExhausted(name) => {
                tracing::error!("Slug space exhausted for company name '{}'", name);
                ApiError::conflict("Could not allocate a unique company identifier")
            }
            NotFound(msg) => ApiError::not_found(msg),
            AlreadyActive(id) => {
                ApiError::conflict(format!("Company {} is already active", id))
            }
            Store(e) => e.into(),
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
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_body_is_flat_error_object() {
        let err = ApiError::forbidden("No active membership in this tenant");
        assert_eq!(err.status_code(), 403);
        assert_eq!(
            err.to_json(),
            json!({"error": "No active membership in this tenant"})
        );
    }

    #[test]
    fn rate_limited_body_carries_details() {
        let err = ApiError::RateLimited {
            message: "Too many requests".into(),
            retry_after_secs: 42,
            limit: 100,
            window_ms: 60_000,
            reset_in_secs: 42,
        };
        let body = err.to_json();
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["code"], json!("RATE_LIMITED"));
        assert_eq!(body["retryAfter"], json!(42));
        assert_eq!(body["details"]["windowMs"], json!(60_000));
    }

    #[test]
    fn break_glass_denial_is_distinguishable() {
        let plain = ApiError::forbidden("nope");
        let bg = ApiError::break_glass_required("Break-glass access required for this tenant");
        assert_eq!(plain.status_code(), bg.status_code());
        assert_ne!(plain.to_json(), bg.to_json());
        assert_eq!(bg.to_json()["code"], json!("BREAK_GLASS_REQUIRED"));
    }
}
