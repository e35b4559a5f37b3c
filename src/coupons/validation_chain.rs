// Validation chain
//
// Five ordered checks over a resolved coupon. The existence check always runs;
// every later check only runs while no violation has been recorded, so data for
// a check (used-instance count, account usage) is only loaded when it is needed.

use chrono::{DateTime, Utc};

use crate::coupons::error::{CouponError, Violation};
use crate::coupons::lookup::ResolvedCoupon;
use crate::coupons::usage_counter::redeemed_coupons;
use crate::coupons::{CouponCode, CouponPromotion, CouponStore, MainAccount};

/// Result of running the chain for one redemption attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub resolved: ResolvedCoupon,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check 1: a coupon instance must have been resolved
pub fn check_existence(resolved: &ResolvedCoupon) -> Option<Violation> {
    if resolved.coupon.is_some() {
        return None;
    }

    // A recognized single code without an unused instance is reported as exhausted
    if resolved.is_single_code() {
        Some(Violation::SingleCodeExhausted {
            code: resolved.code.clone(),
            limit: None,
            used: None,
        })
    } else {
        Some(Violation::CodeNotFound {
            code: resolved.code.clone(),
        })
    }
}

/// Check 2: a shared code may not be used more than its cap. No cap means unlimited.
pub fn check_single_code_limit(
    code: &str,
    promotion: &CouponPromotion,
    used_instances: i64,
) -> Option<Violation> {
    let limit = promotion.single_code_usage_limit?;
    if i64::from(limit) <= used_instances {
        Some(Violation::SingleCodeExhausted {
            code: code.to_string(),
            limit: Some(limit),
            used: Some(used_instances),
        })
    } else {
        None
    }
}

/// Check 3: the instance itself must be unused, unclaimed by a live redemption,
/// and not deactivated
pub fn check_activity(coupon: &CouponCode, linked: bool) -> Option<Violation> {
    if coupon.is_used || linked {
        Some(Violation::AlreadyUsed {
            coupon_id: coupon.id,
        })
    } else if coupon.deactivated {
        Some(Violation::Deactivated {
            coupon_id: coupon.id,
        })
    } else {
        None
    }
}

/// Check 4: the promotion must be active and `now` inside its window (inclusive)
pub fn check_validity_window(promotion: &CouponPromotion, now: DateTime<Utc>) -> Option<Violation> {
    if promotion.is_redeemable_at(now) {
        None
    } else {
        Some(Violation::OutsideValidityWindow {
            promotion_id: promotion.id,
            start_time: promotion.start_time,
            end_time: promotion.end_time,
            is_active: promotion.is_active,
        })
    }
}

/// Check 5: the account must be below the promotion's per-account limit
pub fn check_account_limit(promotion: &CouponPromotion, redeemed: usize) -> Option<Violation> {
    let limit = promotion.usage_limit_per_account;
    let over_limit = usize::try_from(limit).map_or(true, |limit| redeemed >= limit);
    if over_limit {
        Some(Violation::AccountLimitExceeded {
            promotion_id: promotion.id,
            limit,
            used: redeemed,
        })
    } else {
        None
    }
}

/// Run the full chain for `account` at time `now`
pub async fn evaluate(
    store: &dyn CouponStore,
    resolved: ResolvedCoupon,
    account: &MainAccount,
    now: DateTime<Utc>,
) -> Result<ValidationReport, CouponError> {
    let mut violations = Vec::new();

    if let Some(violation) = check_existence(&resolved) {
        violations.push(violation);
    }

    if let (true, Some(redeemable)) = (violations.is_empty(), resolved.coupon.as_ref()) {
        let coupon = &redeemable.coupon;
        let promotion = &redeemable.promotion;

        if resolved.is_single_code() {
            let used = store.count_used_instances(&resolved.code).await?;
            violations.extend(check_single_code_limit(&resolved.code, promotion, used));
        }

        if violations.is_empty() {
            let linked = !coupon.is_used
                && !store.active_redemption_accounts(coupon.id).await?.is_empty();
            violations.extend(check_activity(coupon, linked));
        }

        if violations.is_empty() {
            violations.extend(check_validity_window(promotion, now));
        }

        if violations.is_empty() {
            let redeemed = redeemed_coupons(store, account, promotion.id).await?;
            violations.extend(check_account_limit(promotion, redeemed.len()));
        }
    }

    if let Some(first) = violations.first() {
        tracing::warn!(
            "Coupon code {} rejected for account {}: {}",
            resolved.code,
            account.id,
            first.kind()
        );
    }

    Ok(ValidationReport {
        resolved,
        violations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupons::{CouponCodeType, InMemoryCouponStore, RedeemableCoupon, ViolationKind};
    use chrono::Duration;
    use proptest::prelude::*;

    fn promotion(now: DateTime<Utc>) -> CouponPromotion {
        CouponPromotion {
            id: 5,
            name: "Chain".to_string(),
            start_time: now - Duration::days(1),
            end_time: now + Duration::days(1),
            is_active: true,
            usage_limit_per_account: 2,
            single_code_usage_limit: Some(3),
            code_type: CouponCodeType::UniqueCode,
        }
    }

    fn coupon(is_used: bool, deactivated: bool) -> CouponCode {
        CouponCode {
            id: 11,
            code: "CHAIN".to_string(),
            coupon_promotion_id: 5,
            is_used,
            deactivated,
            used_at: None,
            created_at: Utc::now(),
        }
    }

    fn kinds(report: &ValidationReport) -> Vec<ViolationKind> {
        report.violations.iter().map(|v| v.kind()).collect()
    }

    #[test]
    fn test_existence_unique_vs_single() {
        let missing = ResolvedCoupon {
            code: "NOPE".to_string(),
            code_type: None,
            coupon: None,
        };
        assert_eq!(
            check_existence(&missing).map(|v| v.kind()),
            Some(ViolationKind::CodeNotFound)
        );

        let exhausted = ResolvedCoupon {
            code_type: Some(CouponCodeType::SingleCode),
            ..missing
        };
        assert_eq!(
            check_existence(&exhausted).map(|v| v.kind()),
            Some(ViolationKind::SingleCodeExhausted)
        );
    }

    #[test]
    fn test_single_code_limit() {
        let now = Utc::now();
        let promo = promotion(now);
        assert!(check_single_code_limit("CHAIN", &promo, 2).is_none());
        assert!(check_single_code_limit("CHAIN", &promo, 3).is_some());

        let uncapped = CouponPromotion {
            single_code_usage_limit: None,
            ..promo
        };
        assert!(check_single_code_limit("CHAIN", &uncapped, 10_000).is_none());
    }

    #[test]
    fn test_activity() {
        assert!(check_activity(&coupon(false, false), false).is_none());
        assert_eq!(
            check_activity(&coupon(true, false), false).map(|v| v.kind()),
            Some(ViolationKind::AlreadyUsed)
        );
        assert_eq!(
            check_activity(&coupon(false, true), false).map(|v| v.kind()),
            Some(ViolationKind::Deactivated)
        );
        assert_eq!(
            check_activity(&coupon(true, true), false).map(|v| v.kind()),
            Some(ViolationKind::AlreadyUsed)
        );
    }

    #[test]
    fn test_linked_coupon_counts_as_used() {
        assert_eq!(
            check_activity(&coupon(false, false), true).map(|v| v.kind()),
            Some(ViolationKind::AlreadyUsed)
        );
        assert_eq!(
            check_activity(&coupon(false, true), true).map(|v| v.kind()),
            Some(ViolationKind::AlreadyUsed)
        );
    }

    #[test]
    fn test_account_limit_boundary() {
        let promo = promotion(Utc::now());
        assert!(check_account_limit(&promo, 1).is_none());
        assert!(check_account_limit(&promo, 2).is_some());

        let zero = CouponPromotion {
            usage_limit_per_account: 0,
            ..promo.clone()
        };
        assert!(check_account_limit(&zero, 0).is_some());

        let negative = CouponPromotion {
            usage_limit_per_account: -1,
            ..promo
        };
        assert!(check_account_limit(&negative, 0).is_some());
    }

    proptest! {
        #[test]
        fn prop_window_passes_only_inside_active_range(
            start_offset in -10_000i64..10_000,
            length in 0i64..20_000,
            is_active in any::<bool>(),
        ) {
            let now = Utc::now();
            let promo = CouponPromotion {
                start_time: now + Duration::seconds(start_offset),
                end_time: now + Duration::seconds(start_offset + length),
                is_active,
                ..promotion(now)
            };
            let inside = promo.start_time <= now && now <= promo.end_time;
            let violation = check_validity_window(&promo, now);
            prop_assert_eq!(violation.is_none(), inside && is_active);
        }

        #[test]
        fn prop_account_limit_is_reached_at_limit(limit in 1i32..50, redeemed in 0usize..100) {
            let promo = CouponPromotion {
                usage_limit_per_account: limit,
                ..promotion(Utc::now())
            };
            let violation = check_account_limit(&promo, redeemed);
            prop_assert_eq!(violation.is_some(), redeemed >= limit as usize);
        }
    }

    #[tokio::test]
    async fn test_checks_stop_after_first_violation() {
        let store = InMemoryCouponStore::new();
        let now = Utc::now();
        let account = MainAccount { id: 1 };

        // Used and outside its window: only the earlier check reports
        let expired = CouponPromotion {
            end_time: now - Duration::hours(1),
            start_time: now - Duration::days(2),
            ..promotion(now)
        };
        let resolved = ResolvedCoupon {
            code: "CHAIN".to_string(),
            code_type: Some(CouponCodeType::UniqueCode),
            coupon: Some(RedeemableCoupon {
                coupon: coupon(true, false),
                promotion: expired,
            }),
        };

        let report = evaluate(&store, resolved, &account, now).await.unwrap();
        assert_eq!(kinds(&report), vec![ViolationKind::AlreadyUsed]);
        assert!(!report.is_valid());
    }

    #[tokio::test]
    async fn test_clean_coupon_passes() {
        let store = InMemoryCouponStore::new();
        let now = Utc::now();
        let resolved = ResolvedCoupon {
            code: "CHAIN".to_string(),
            code_type: Some(CouponCodeType::UniqueCode),
            coupon: Some(RedeemableCoupon {
                coupon: coupon(false, false),
                promotion: promotion(now),
            }),
        };

        let report = evaluate(&store, resolved, &MainAccount { id: 1 }, now)
            .await
            .unwrap();
        assert!(report.is_valid());
    }
}
