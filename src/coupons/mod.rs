// Coupon redemption module
//
// Validates coupon codes against their promotion rules, forwards valid redemptions
// to the purchase pipeline and marks coupons used on request.

pub mod error;
pub mod handlers;
pub mod locks;
pub mod lookup;
pub mod memory;
pub mod messages;
pub mod models;
pub mod purchase;
pub mod repository;
pub mod service;
pub mod usage_counter;
pub mod validation_chain;

pub use error::{CouponError, Violation, ViolationKind};
pub use handlers::*;
pub use locks::{LockKey, RedemptionLocks};
pub use lookup::{normalize_code, resolve, ResolvedCoupon};
pub use memory::{InMemoryCouponStore, InMemoryPurchasePipeline};
pub use messages::MessageCatalog;
pub use models::*;
pub use purchase::{PgPurchasePipeline, PurchasePipeline};
pub use repository::{CouponStore, PgCouponStore};
pub use service::{CouponUsageService, RedemptionOutcome};
pub use usage_counter::redeemed_coupons;
pub use validation_chain::{evaluate, ValidationReport};
