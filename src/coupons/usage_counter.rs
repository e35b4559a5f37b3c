// Usage counter
//
// Counts the distinct coupons an account redeemed under a promotion. The store
// returns one id per redemption link, and an order with several components can
// carry the same coupon more than once, so ids are deduplicated here.

use std::collections::BTreeSet;

use crate::coupons::error::CouponError;
use crate::coupons::{CouponStore, MainAccount};

/// Distinct coupon ids redeemed by `account` under `promotion_id`, ascending.
/// Canceled redemption links are excluded by the store.
pub async fn redeemed_coupons(
    store: &dyn CouponStore,
    account: &MainAccount,
    promotion_id: i64,
) -> Result<BTreeSet<i64>, CouponError> {
    let rows = store.redeemed_coupon_ids(account.id, promotion_id).await?;
    let distinct: BTreeSet<i64> = rows.iter().copied().collect();

    tracing::debug!(
        "Account {} redeemed {} coupons under promotion {} ({} links)",
        account.id,
        distinct.len(),
        promotion_id,
        rows.len()
    );

    Ok(distinct)
}
