// Error handling module for the Coupon API
// Provides centralized error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::coupons::CouponError;

/// Main error type for the API
/// All handlers should return Result<T, ApiError>
///
/// Each variant maps to a specific HTTP status code and error response format.
/// Rejected redemptions are not errors; handlers answer them with 422 themselves.
#[derive(Debug)]
pub enum ApiError {
    /// Validation errors from request validation
    /// Maps to HTTP 400 Bad Request
    ValidationError(validator::ValidationErrors),

    /// Resource not found by ID
    /// Maps to HTTP 404 Not Found
    NotFound {
        resource: String,
        id: String,
    },

    /// State conflict, e.g. a coupon that can no longer be marked used
    /// Maps to HTTP 409 Conflict
    Conflict {
        message: String,
    },

    /// The purchase pipeline failed
    /// Maps to HTTP 502 Bad Gateway
    BadGateway(String),

    /// Database operation errors
    /// Maps to HTTP 500 Internal Server Error
    /// Sensitive details are filtered from client responses
    DatabaseError(sqlx::Error),
}

/// Consistent error response structure
///
/// Provides both machine-readable (error_code) and human-readable (message) information.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "VALIDATION_ERROR", "NOT_FOUND")
    pub error_code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (e.g., field-level validation errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// ISO 8601 timestamp of when the error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    fn new(error_code: &str, message: String, details: Option<serde_json::Value>) -> Self {
        Self {
            error_code: error_code.to_string(),
            message,
            details,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = self.to_error_response();
        (status, Json(error_response)).into_response()
    }
}

impl ApiError {
    /// Convert ApiError to HTTP status code and ErrorResponse
    ///
    /// Logs at error! for 500-level faults, warn! for conflicts and upstream
    /// failures, debug! for expected client errors.
    fn to_error_response(&self) -> (StatusCode, ErrorResponse) {
        match self {
            ApiError::ValidationError(errors) => {
                debug!("Validation error: {:?}", errors);
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::new(
                        "VALIDATION_ERROR",
                        "Request validation failed".to_string(),
                        Some(serde_json::to_value(errors).unwrap_or(serde_json::json!({}))),
                    ),
                )
            }
            ApiError::NotFound { resource, id } => {
                debug!("Resource not found: {} with id {}", resource, id);
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::new("NOT_FOUND", format!("{} with id {} not found", resource, id), None),
                )
            }
            ApiError::Conflict { message } => {
                warn!("Conflict error: {}", message);
                (
                    StatusCode::CONFLICT,
                    ErrorResponse::new("CONFLICT", message.clone(), None),
                )
            }
            ApiError::BadGateway(message) => {
                warn!("Purchase pipeline error: {}", message);
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorResponse::new("PURCHASE_FAILED", "The purchase could not be completed".to_string(), None),
                )
            }
            ApiError::DatabaseError(db_error) => {
                // Full error stays in the logs only
                error!("Database error: {:?}", db_error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("DATABASE_ERROR", "A database error occurred".to_string(), None),
                )
            }
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convert sqlx errors to ApiError
impl From<sqlx::Error> for ApiError {
    fn from(error: sqlx::Error) -> Self {
        ApiError::DatabaseError(error)
    }
}

/// Convert validator errors to ApiError
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(errors)
    }
}

/// Convert coupon faults to ApiError
impl From<CouponError> for ApiError {
    fn from(error: CouponError) -> Self {
        match error {
            CouponError::DatabaseError(e) => ApiError::DatabaseError(e),
            CouponError::PersistenceFailure { coupon_id } => ApiError::Conflict {
                message: format!("Coupon {} is already used or deactivated", coupon_id),
            },
            CouponError::CouponNotFound(id) => ApiError::NotFound {
                resource: "Coupon".to_string(),
                id: id.to_string(),
            },
            CouponError::RedemptionNotFound { coupon_id, .. } => ApiError::NotFound {
                resource: "Redemption of coupon".to_string(),
                id: coupon_id.to_string(),
            },
            CouponError::AlreadyRedeemed { coupon_id } => ApiError::Conflict {
                message: format!("Coupon {} is already redeemed", coupon_id),
            },
            CouponError::CustomerNotFound(id) => ApiError::NotFound {
                resource: "Customer".to_string(),
                id: id.to_string(),
            },
            CouponError::PharmacyNotFound(id) => ApiError::NotFound {
                resource: "Pharmacy".to_string(),
                id: id.to_string(),
            },
            CouponError::Purchase(message) => ApiError::BadGateway(message),
            CouponError::ValidationError(errors) => ApiError::ValidationError(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coupon_error_mapping() {
        let cases = vec![
            (CouponError::PersistenceFailure { coupon_id: 1 }, StatusCode::CONFLICT),
            (CouponError::CouponNotFound(1), StatusCode::NOT_FOUND),
            (
                CouponError::RedemptionNotFound {
                    coupon_id: 1,
                    account_id: 2,
                },
                StatusCode::NOT_FOUND,
            ),
            (CouponError::AlreadyRedeemed { coupon_id: 1 }, StatusCode::CONFLICT),
            (CouponError::CustomerNotFound(1), StatusCode::NOT_FOUND),
            (CouponError::PharmacyNotFound(1), StatusCode::NOT_FOUND),
            (CouponError::Purchase("down".to_string()), StatusCode::BAD_GATEWAY),
            (
                CouponError::ValidationError(validator::ValidationErrors::new()),
                StatusCode::BAD_REQUEST,
            ),
            (CouponError::DatabaseError(sqlx::Error::RowNotFound), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status_code(), status);
        }
    }

    #[test]
    fn test_database_error_hides_details() {
        let (status, body) = ApiError::DatabaseError(sqlx::Error::RowNotFound).to_error_response();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error_code, "DATABASE_ERROR");
        assert_eq!(body.message, "A database error occurred");
        assert!(body.details.is_none());
    }

    #[test]
    fn test_not_found_message() {
        let (_, body) = ApiError::from(CouponError::PharmacyNotFound(12)).to_error_response();
        assert_eq!(body.message, "Pharmacy with id 12 not found");
    }

    #[test]
    fn test_redemption_not_found_does_not_leak_owner() {
        let error = CouponError::RedemptionNotFound {
            coupon_id: 5,
            account_id: 77,
        };
        let (status, body) = ApiError::from(error).to_error_response();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.message, "Redemption of coupon with id 5 not found");
        assert!(!body.message.contains("77"));
    }
}
