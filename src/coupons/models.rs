use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::validation::{validate_cart_items, validate_coupon_code_charset};

/// How the codes of a promotion map to redeemable instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CouponCodeType {
    /// One shared code backed by a pool of instances, each usable once
    SingleCode,
    /// Every code is a single, uniquely identified instance
    UniqueCode,
}

impl CouponCodeType {
    /// Convert code type to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponCodeType::SingleCode => "single_code",
            CouponCodeType::UniqueCode => "unique_code",
        }
    }
}

impl std::fmt::Display for CouponCodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Campaign definition governing the validity window and usage limits of its codes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CouponPromotion {
    pub id: i64,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_active: bool,
    pub usage_limit_per_account: i32,
    pub single_code_usage_limit: Option<i32>,
    pub code_type: CouponCodeType,
}

impl CouponPromotion {
    /// Whether `now` falls inside `[start_time, end_time]` on an active promotion
    pub fn is_redeemable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.start_time <= now && now <= self.end_time
    }
}

/// A redeemable code instance as stored in `coupon_codes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CouponCode {
    pub id: i64,
    pub code: String,
    pub coupon_promotion_id: i64,
    pub is_used: bool,
    pub deactivated: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A coupon instance loaded together with its promotion
#[derive(Debug, Clone, PartialEq)]
pub struct RedeemableCoupon {
    pub coupon: CouponCode,
    pub promotion: CouponPromotion,
}

/// Code type and promotion of the first record carrying a code
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct CodeProfile {
    pub promotion_id: i64,
    pub code_type: CouponCodeType,
}

/// Customer record; sub-accounts point at their main account
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Customer {
    pub id: i64,
    pub main_customer_id: Option<i64>,
}

impl Customer {
    /// The account identity usage limits are attributed to
    pub fn main_account(&self) -> MainAccount {
        MainAccount {
            id: self.main_customer_id.unwrap_or(self.id),
        }
    }
}

/// Top-level account identity that redemptions are counted against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct MainAccount {
    pub id: i64,
}

/// A product line forwarded to the purchase pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct CartItem {
    pub product_id: i64,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

/// Request DTO for a dry-run coupon check
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ValidateCouponRequest {
    #[validate(
        length(min = 1, max = 64, message = "Coupon code must be between 1 and 64 characters"),
        custom = "validate_coupon_code_charset"
    )]
    pub coupon_code: String,
    pub pharmacy_id: Option<i64>,
}

/// Request DTO for redeeming a coupon against a purchase
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RedeemCouponRequest {
    #[validate(
        length(min = 1, max = 64, message = "Coupon code must be between 1 and 64 characters"),
        custom = "validate_coupon_code_charset"
    )]
    pub coupon_code: String,
    pub pharmacy_id: Option<i64>,
    #[validate(
        length(min = 1, message = "Purchase must contain at least one item"),
        custom = "validate_cart_items"
    )]
    pub items: Vec<CartItem>,
}

impl RedeemCouponRequest {
    /// The validation-only view of this request
    pub fn as_validation(&self) -> ValidateCouponRequest {
        ValidateCouponRequest {
            coupon_code: self.coupon_code.clone(),
            pharmacy_id: self.pharmacy_id,
        }
    }
}

/// Serializable view of the purchase produced by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PurchaseReceipt {
    pub order_id: i64,
    pub customer_id: i64,
    pub pharmacy_id: Option<i64>,
    pub coupon_code_id: i64,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
}

/// Response DTO for a coupon instance
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CouponView {
    pub id: i64,
    pub code: String,
    pub promotion_id: i64,
    pub code_type: CouponCodeType,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

impl From<&RedeemableCoupon> for CouponView {
    fn from(redeemable: &RedeemableCoupon) -> Self {
        Self {
            id: redeemable.coupon.id,
            code: redeemable.coupon.code.clone(),
            promotion_id: redeemable.promotion.id,
            code_type: redeemable.promotion.code_type,
            is_used: redeemable.coupon.is_used,
            used_at: redeemable.coupon.used_at,
        }
    }
}

/// One failed rule, rendered for clients
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ViolationDetail {
    pub kind: crate::coupons::ViolationKind,
    pub field: String,
    pub message_key: String,
    pub message: String,
    #[schema(value_type = Object)]
    pub context: serde_json::Value,
}

/// Response DTO for `POST /api/coupons/validate`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidationResponse {
    pub valid: bool,
    pub coupon: Option<CouponView>,
    pub errors: Vec<ViolationDetail>,
}

/// Response DTO for an accepted redemption
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RedemptionResponse {
    pub coupon: CouponView,
    pub purchase: PurchaseReceipt,
}

/// Response DTO for a rejected redemption
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RejectionResponse {
    pub errors: Vec<ViolationDetail>,
}
