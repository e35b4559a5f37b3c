pub mod auth;
pub mod config;
pub mod coupons;
pub mod db;
pub mod error;
pub mod validation;

use std::sync::Arc;

use axum::{extract::FromRef, routing::post, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use auth::TokenService;
use coupons::{
    CartItem, CouponCode, CouponCodeType, CouponUsageService, CouponView, MessageCatalog,
    PurchaseReceipt, RedeemCouponRequest, RedemptionResponse, RejectionResponse,
    ValidateCouponRequest, ValidationResponse, ViolationDetail, ViolationKind,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        coupons::validate_coupon_handler,
        coupons::redeem_coupon_handler,
        coupons::update_coupon_usage_handler,
    ),
    components(
        schemas(
            CartItem,
            CouponCode,
            CouponCodeType,
            CouponView,
            PurchaseReceipt,
            RedeemCouponRequest,
            RedemptionResponse,
            RejectionResponse,
            ValidateCouponRequest,
            ValidationResponse,
            ViolationDetail,
            ViolationKind,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "coupons", description = "Coupon validation and redemption endpoints")
    ),
    info(
        title = "Coupon API",
        version = "1.0.0",
        description = "Validates and redeems promotion coupon codes"
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub coupon_service: Arc<CouponUsageService>,
    pub messages: Arc<MessageCatalog>,
    pub tokens: Arc<TokenService>,
}

impl AppState {
    /// Create a new AppState with the default English message catalog
    pub fn new(coupon_service: CouponUsageService, tokens: TokenService) -> Self {
        Self {
            coupon_service: Arc::new(coupon_service),
            messages: Arc::new(MessageCatalog::english()),
            tokens: Arc::new(tokens),
        }
    }

    /// Replace the message catalog used to render violations
    pub fn with_messages(mut self, messages: MessageCatalog) -> Self {
        self.messages = Arc::new(messages);
        self
    }
}

impl FromRef<AppState> for Arc<TokenService> {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

/// Creates and configures the application router
/// Maps all API endpoints to their handlers and adds CORS and tracing middleware
pub fn create_router(state: AppState) -> Router {
    // Configure CORS to allow all origins, methods, and headers
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // API routes
        .route("/api/coupons/validate", post(coupons::validate_coupon_handler))
        .route("/api/coupons/redeem", post(coupons::redeem_coupon_handler))
        .route(
            "/api/coupons/:coupon_id/usage",
            post(coupons::update_coupon_usage_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
