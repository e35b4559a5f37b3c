// Coupon lookup
//
// Resolves a raw code to a coupon instance. Single-code promotions hand out the
// lowest-id unused instance of the shared code; unique codes resolve to their one
// record whatever its state, so later checks can tell "used" from "missing".

use crate::coupons::error::CouponError;
use crate::coupons::{CodeProfile, CouponCodeType, CouponStore, RedeemableCoupon};

/// Outcome of resolving a code
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCoupon {
    /// Normalized code that was looked up
    pub code: String,
    /// Code type of the promotion, `None` when no record carries the code
    pub code_type: Option<CouponCodeType>,
    pub coupon: Option<RedeemableCoupon>,
}

impl ResolvedCoupon {
    pub fn is_single_code(&self) -> bool {
        self.code_type == Some(CouponCodeType::SingleCode)
    }
}

/// Normalize a user-supplied code the way codes are stored
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Resolve a raw code, looking up its profile first
pub async fn resolve(store: &dyn CouponStore, raw_code: &str) -> Result<ResolvedCoupon, CouponError> {
    let code = normalize_code(raw_code);
    let profile = store.find_code_profile(&code).await?;
    resolve_with_profile(store, code, profile).await
}

/// Resolve an already normalized code whose profile is known
pub async fn resolve_with_profile(
    store: &dyn CouponStore,
    code: String,
    profile: Option<CodeProfile>,
) -> Result<ResolvedCoupon, CouponError> {
    let code_type = profile.map(|p| p.code_type);

    let coupon = match code_type {
        Some(CouponCodeType::SingleCode) => store.find_first_unused(&code).await?,
        _ => store.find_by_code(&code).await?,
    };

    tracing::debug!(
        "Resolved coupon code {} (type: {:?}) to {:?}",
        code,
        code_type,
        coupon.as_ref().map(|c| c.coupon.id)
    );

    Ok(ResolvedCoupon {
        code,
        code_type,
        coupon,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupons::{CouponPromotion, InMemoryCouponStore};
    use chrono::{Duration, Utc};

    fn promotion(code_type: CouponCodeType) -> CouponPromotion {
        let now = Utc::now();
        CouponPromotion {
            id: 0,
            name: "Lookup".to_string(),
            start_time: now - Duration::days(1),
            end_time: now + Duration::days(1),
            is_active: true,
            usage_limit_per_account: 1,
            single_code_usage_limit: Some(10),
            code_type,
        }
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  welcome10 "), "WELCOME10");
        assert_eq!(normalize_code("Mixed-Case_1"), "MIXED-CASE_1");
    }

    #[tokio::test]
    async fn test_unknown_code_resolves_to_nothing() {
        let store = InMemoryCouponStore::new();
        let resolved = resolve(&store, "missing").await.unwrap();
        assert_eq!(resolved.code, "MISSING");
        assert_eq!(resolved.code_type, None);
        assert!(resolved.coupon.is_none());
        assert!(!resolved.is_single_code());
    }

    #[tokio::test]
    async fn test_unique_code_resolves_even_when_used() {
        let store = InMemoryCouponStore::new();
        let promo = store.add_promotion(promotion(CouponCodeType::UniqueCode)).await;
        let coupon = store.add_coupon("UNIQUE1", promo.id).await;
        store.mark_used(coupon.id, Utc::now()).await.unwrap();

        let resolved = resolve(&store, "unique1").await.unwrap();
        let found = resolved.coupon.unwrap();
        assert_eq!(found.coupon.id, coupon.id);
        assert!(found.coupon.is_used);
        assert_eq!(found.promotion.id, promo.id);
    }

    #[tokio::test]
    async fn test_single_code_skips_used_instances() {
        let store = InMemoryCouponStore::new();
        let promo = store.add_promotion(promotion(CouponCodeType::SingleCode)).await;
        let first = store.add_coupon("POOL", promo.id).await;
        let second = store.add_coupon("POOL", promo.id).await;
        store.mark_used(first.id, Utc::now()).await.unwrap();

        let resolved = resolve(&store, "pool").await.unwrap();
        assert!(resolved.is_single_code());
        assert_eq!(resolved.coupon.unwrap().coupon.id, second.id);
    }

    #[tokio::test]
    async fn test_single_code_pool_exhausted() {
        let store = InMemoryCouponStore::new();
        let promo = store.add_promotion(promotion(CouponCodeType::SingleCode)).await;
        let only = store.add_coupon("POOL", promo.id).await;
        store.mark_used(only.id, Utc::now()).await.unwrap();

        let resolved = resolve(&store, "POOL").await.unwrap();
        assert!(resolved.is_single_code());
        assert!(resolved.coupon.is_none());
    }
}
