// Error types for coupon redemption
// Violations are expected rule failures returned as data; CouponError covers faults

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

/// Machine-readable category of a failed redemption rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    CodeNotFound,
    SingleCodeExhausted,
    AlreadyUsed,
    Deactivated,
    OutsideValidityWindow,
    AccountLimitExceeded,
}

impl ViolationKind {
    /// Localization key of the user-facing message
    pub fn message_key(&self) -> &'static str {
        match self {
            ViolationKind::CodeNotFound => "custom.errors.invalid_coupon_code",
            ViolationKind::SingleCodeExhausted => "custom.errors.invalid_limit_single_coupon_code",
            ViolationKind::AlreadyUsed => "custom.errors.coupon_code_already_used",
            ViolationKind::Deactivated => "custom.errors.coupon_code_deactivated",
            ViolationKind::OutsideValidityWindow => "custom.errors.invalid_usage_date",
            ViolationKind::AccountLimitExceeded => "custom.errors.invalid_usage_limit",
        }
    }

    /// Convert kind to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::CodeNotFound => "code_not_found",
            ViolationKind::SingleCodeExhausted => "single_code_exhausted",
            ViolationKind::AlreadyUsed => "already_used",
            ViolationKind::Deactivated => "deactivated",
            ViolationKind::OutsideValidityWindow => "outside_validity_window",
            ViolationKind::AccountLimitExceeded => "account_limit_exceeded",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failed redemption rule together with the state that triggered it
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    /// No coupon record matches the code
    CodeNotFound { code: String },

    /// The shared code has no redeemable instance left.
    /// `used` is `None` when no unused instance could be resolved at all.
    SingleCodeExhausted {
        code: String,
        limit: Option<i32>,
        used: Option<i64>,
    },

    /// This coupon instance was already redeemed
    AlreadyUsed { coupon_id: i64 },

    /// This coupon instance was switched off
    Deactivated { coupon_id: i64 },

    /// Redemption attempted before start, after end, or on an inactive promotion
    OutsideValidityWindow {
        promotion_id: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        is_active: bool,
    },

    /// The account already reached the promotion's redemption limit
    AccountLimitExceeded {
        promotion_id: i64,
        limit: i32,
        used: usize,
    },
}

impl Violation {
    pub fn kind(&self) -> ViolationKind {
        match self {
            Violation::CodeNotFound { .. } => ViolationKind::CodeNotFound,
            Violation::SingleCodeExhausted { .. } => ViolationKind::SingleCodeExhausted,
            Violation::AlreadyUsed { .. } => ViolationKind::AlreadyUsed,
            Violation::Deactivated { .. } => ViolationKind::Deactivated,
            Violation::OutsideValidityWindow { .. } => ViolationKind::OutsideValidityWindow,
            Violation::AccountLimitExceeded { .. } => ViolationKind::AccountLimitExceeded,
        }
    }

    /// Request field the violation is reported under
    pub fn field(&self) -> &'static str {
        "coupon_code"
    }

    /// Structured context for clients that need more than the message
    pub fn context(&self) -> serde_json::Value {
        match self {
            Violation::CodeNotFound { code } => json!({ "code": code }),
            Violation::SingleCodeExhausted { code, limit, used } => json!({
                "code": code,
                "limit": limit,
                "used": used,
            }),
            Violation::AlreadyUsed { coupon_id } | Violation::Deactivated { coupon_id } => {
                json!({ "coupon_id": coupon_id })
            }
            Violation::OutsideValidityWindow {
                promotion_id,
                start_time,
                end_time,
                is_active,
            } => json!({
                "promotion_id": promotion_id,
                "start_time": start_time.to_rfc3339(),
                "end_time": end_time.to_rfc3339(),
                "is_active": is_active,
            }),
            Violation::AccountLimitExceeded {
                promotion_id,
                limit,
                used,
            } => json!({
                "promotion_id": promotion_id,
                "limit": limit,
                "used": used,
            }),
        }
    }
}

/// Faults raised by coupon operations
#[derive(Debug, thiserror::Error)]
pub enum CouponError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// The conditional mark-used update affected no row
    #[error("Coupon {coupon_id} could not be marked as used")]
    PersistenceFailure { coupon_id: i64 },

    #[error("Coupon not found: {0}")]
    CouponNotFound(i64),

    /// The account holds no live redemption of the coupon
    #[error("No redemption of coupon {coupon_id} by account {account_id}")]
    RedemptionNotFound { coupon_id: i64, account_id: i64 },

    /// Another order already links the coupon
    #[error("Coupon {coupon_id} is already redeemed")]
    AlreadyRedeemed { coupon_id: i64 },

    #[error("Customer not found: {0}")]
    CustomerNotFound(i64),

    #[error("Pharmacy not found: {0}")]
    PharmacyNotFound(i64),

    #[error("Purchase failed: {0}")]
    Purchase(String),

    /// Malformed request, rejected before any lookup
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}
