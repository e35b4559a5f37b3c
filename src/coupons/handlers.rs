// HTTP handlers for coupon endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::auth::AuthenticatedCustomer;
use crate::coupons::{
    CouponCode, CouponView, RedeemCouponRequest, RedemptionOutcome, RedemptionResponse,
    RejectionResponse, ValidateCouponRequest, ValidationResponse,
};
use crate::error::ApiError;

/// Handler for POST /api/coupons/validate
/// Checks a coupon code for the authenticated customer without side effects
#[utoipa::path(
    post,
    path = "/api/coupons/validate",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "Validation result", body = ValidationResponse),
        (status = 400, description = "Invalid request body"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown customer or pharmacy")
    ),
    security(("bearer_auth" = [])),
    tag = "coupons"
)]
pub async fn validate_coupon_handler(
    State(state): State<crate::AppState>,
    customer: AuthenticatedCustomer,
    Json(request): Json<ValidateCouponRequest>,
) -> Result<Json<ValidationResponse>, ApiError> {
    let report = state
        .coupon_service
        .validate(customer.customer_id, &request)
        .await?;

    Ok(Json(ValidationResponse {
        valid: report.is_valid(),
        coupon: report.resolved.coupon.as_ref().map(CouponView::from),
        errors: state.messages.details(&report.violations),
    }))
}

/// Handler for POST /api/coupons/redeem
/// Validates the coupon and runs the purchase; the coupon stays unused until
/// its usage is recorded
#[utoipa::path(
    post,
    path = "/api/coupons/redeem",
    request_body = RedeemCouponRequest,
    responses(
        (status = 201, description = "Coupon accepted and purchase recorded", body = RedemptionResponse),
        (status = 400, description = "Invalid request body"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown customer or pharmacy"),
        (status = 422, description = "Coupon rejected", body = RejectionResponse),
        (status = 502, description = "Purchase could not be completed")
    ),
    security(("bearer_auth" = [])),
    tag = "coupons"
)]
pub async fn redeem_coupon_handler(
    State(state): State<crate::AppState>,
    customer: AuthenticatedCustomer,
    Json(request): Json<RedeemCouponRequest>,
) -> Result<Response, ApiError> {
    let outcome = state
        .coupon_service
        .redeem(customer.customer_id, &request)
        .await?;

    let response = match outcome {
        RedemptionOutcome::Accepted { coupon, receipt } => (
            StatusCode::CREATED,
            Json(RedemptionResponse {
                coupon: CouponView::from(&coupon),
                purchase: receipt,
            }),
        )
            .into_response(),
        RedemptionOutcome::Rejected { violations } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(RejectionResponse {
                errors: state.messages.details(&violations),
            }),
        )
            .into_response(),
    };

    Ok(response)
}

/// Handler for POST /api/coupons/{coupon_id}/usage
/// Marks a coupon as used after the authenticated customer's purchase went through
#[utoipa::path(
    post,
    path = "/api/coupons/{coupon_id}/usage",
    params(
        ("coupon_id" = i64, Path, description = "Coupon code instance ID")
    ),
    responses(
        (status = 200, description = "Coupon marked as used", body = CouponCode),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Coupon not found or not redeemed by this customer"),
        (status = 409, description = "Coupon already used or deactivated")
    ),
    security(("bearer_auth" = [])),
    tag = "coupons"
)]
pub async fn update_coupon_usage_handler(
    State(state): State<crate::AppState>,
    customer: AuthenticatedCustomer,
    Path(coupon_id): Path<i64>,
) -> Result<Json<CouponCode>, ApiError> {
    tracing::debug!(
        "Customer {} recording usage of coupon {}",
        customer.customer_id,
        coupon_id
    );

    let coupon = state
        .coupon_service
        .update_coupon_usage(customer.customer_id, coupon_id)
        .await?;
    Ok(Json(coupon))
}
