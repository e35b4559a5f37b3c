//! In-memory coupon store and purchase pipeline.
//!
//! Mirrors the relational layout (orders → components → used-coupon links) so the
//! usage counter sees the same fan-out it would see from Postgres. Used by the
//! test suites and for running the API without a database.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::coupons::error::CouponError;
use crate::coupons::{
    CodeProfile, CouponCode, CouponPromotion, CouponStore, Customer, MainAccount,
    PurchasePipeline, PurchaseReceipt, RedeemCouponRequest, RedeemableCoupon,
};

#[derive(Debug, Clone)]
struct StoredLink {
    coupon_id: i64,
    is_canceled: bool,
}

#[derive(Debug, Clone)]
struct StoredComponent {
    used_coupon: Option<StoredLink>,
}

#[derive(Debug, Clone)]
struct StoredOrder {
    customer_id: i64,
    components: Vec<StoredComponent>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    customers: BTreeMap<i64, Customer>,
    pharmacies: BTreeSet<i64>,
    promotions: BTreeMap<i64, CouponPromotion>,
    coupons: BTreeMap<i64, CouponCode>,
    orders: BTreeMap<i64, StoredOrder>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn redeemable(&self, coupon: &CouponCode) -> Option<RedeemableCoupon> {
        self.promotions
            .get(&coupon.coupon_promotion_id)
            .map(|promotion| RedeemableCoupon {
                coupon: coupon.clone(),
                promotion: promotion.clone(),
            })
    }

    fn live_links(&self) -> impl Iterator<Item = (i64, &StoredLink)> + '_ {
        self.orders.values().flat_map(|order| {
            order
                .components
                .iter()
                .filter_map(|component| component.used_coupon.as_ref())
                .filter(|link| !link.is_canceled)
                .map(move |link| (order.customer_id, link))
        })
    }

    fn is_linked(&self, coupon_id: i64) -> bool {
        self.live_links().any(|(_, link)| link.coupon_id == coupon_id)
    }

    fn insert_order(
        &mut self,
        customer_id: i64,
        coupon_id: i64,
        components: usize,
        links: usize,
    ) -> i64 {
        let order_id = self.allocate_id();
        let components = (0..components.max(1))
            .map(|index| StoredComponent {
                used_coupon: (index < links).then_some(StoredLink {
                    coupon_id,
                    is_canceled: false,
                }),
            })
            .collect();
        self.orders.insert(
            order_id,
            StoredOrder {
                customer_id,
                components,
            },
        );
        order_id
    }

    // BTreeMap iteration is ascending by id, matching ORDER BY id
    fn first_with_code(
        &self,
        code: &str,
        filter: impl Fn(&CouponCode) -> bool,
    ) -> Option<&CouponCode> {
        self.coupons
            .values()
            .find(|c| c.code == code && filter(*c))
    }
}

/// Coupon store holding everything in process memory
#[derive(Debug, Default)]
pub struct InMemoryCouponStore {
    state: RwLock<MemoryState>,
}

impl InMemoryCouponStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a customer, optionally as a sub-account of `main_customer_id`
    pub async fn add_customer(&self, main_customer_id: Option<i64>) -> Customer {
        let mut state = self.state.write().await;
        let customer = Customer {
            id: state.allocate_id(),
            main_customer_id,
        };
        state.customers.insert(customer.id, customer.clone());
        customer
    }

    pub async fn add_pharmacy(&self) -> i64 {
        let mut state = self.state.write().await;
        let id = state.allocate_id();
        state.pharmacies.insert(id);
        id
    }

    /// Store a promotion; the supplied id is replaced by a fresh one
    pub async fn add_promotion(&self, promotion: CouponPromotion) -> CouponPromotion {
        let mut state = self.state.write().await;
        let promotion = CouponPromotion {
            id: state.allocate_id(),
            ..promotion
        };
        state.promotions.insert(promotion.id, promotion.clone());
        promotion
    }

    /// Store an unused coupon instance; the code is upper-cased like the database constraint requires
    pub async fn add_coupon(&self, code: &str, promotion_id: i64) -> CouponCode {
        let mut state = self.state.write().await;
        let coupon = CouponCode {
            id: state.allocate_id(),
            code: code.to_uppercase(),
            coupon_promotion_id: promotion_id,
            is_used: false,
            deactivated: false,
            used_at: None,
            created_at: Utc::now(),
        };
        state.coupons.insert(coupon.id, coupon.clone());
        coupon
    }

    pub async fn deactivate(&self, coupon_id: i64) -> bool {
        let mut state = self.state.write().await;
        match state.coupons.get_mut(&coupon_id) {
            Some(coupon) => {
                coupon.deactivated = true;
                true
            }
            None => false,
        }
    }

    pub async fn coupon(&self, coupon_id: i64) -> Option<CouponCode> {
        self.state.read().await.coupons.get(&coupon_id).cloned()
    }

    /// Record an order for `customer_id` with one component per item.
    /// `links` coupon links are attached to the first `links` components.
    pub async fn record_order(
        &self,
        customer_id: i64,
        coupon_id: i64,
        components: usize,
        links: usize,
    ) -> i64 {
        self.state
            .write()
            .await
            .insert_order(customer_id, coupon_id, components, links)
    }

    /// Like [`record_order`](Self::record_order) with one link, but refuses a
    /// coupon another live order already links
    pub async fn record_exclusive_order(
        &self,
        customer_id: i64,
        coupon_id: i64,
        components: usize,
    ) -> Result<i64, CouponError> {
        let mut state = self.state.write().await;
        if state.is_linked(coupon_id) {
            return Err(CouponError::AlreadyRedeemed { coupon_id });
        }
        Ok(state.insert_order(customer_id, coupon_id, components, 1))
    }

    /// Shorthand for a single-component order linked to `coupon_id`
    pub async fn record_redemption(&self, customer_id: i64, coupon_id: i64) -> i64 {
        self.record_order(customer_id, coupon_id, 1, 1).await
    }

    /// Mark every coupon link of an order as canceled
    pub async fn cancel_order(&self, order_id: i64) -> bool {
        let mut state = self.state.write().await;
        match state.orders.get_mut(&order_id) {
            Some(order) => {
                for link in order
                    .components
                    .iter_mut()
                    .filter_map(|c| c.used_coupon.as_mut())
                {
                    link.is_canceled = true;
                }
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl CouponStore for InMemoryCouponStore {
    async fn find_customer(&self, customer_id: i64) -> Result<Option<Customer>, CouponError> {
        Ok(self.state.read().await.customers.get(&customer_id).cloned())
    }

    async fn pharmacy_exists(&self, pharmacy_id: i64) -> Result<bool, CouponError> {
        Ok(self.state.read().await.pharmacies.contains(&pharmacy_id))
    }

    async fn find_code_profile(&self, code: &str) -> Result<Option<CodeProfile>, CouponError> {
        let state = self.state.read().await;
        let profile = state
            .first_with_code(code, |_| true)
            .and_then(|coupon| state.promotions.get(&coupon.coupon_promotion_id))
            .map(|promotion| CodeProfile {
                promotion_id: promotion.id,
                code_type: promotion.code_type,
            });
        Ok(profile)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<RedeemableCoupon>, CouponError> {
        let state = self.state.read().await;
        Ok(state
            .first_with_code(code, |_| true)
            .and_then(|coupon| state.redeemable(coupon)))
    }

    async fn find_first_unused(
        &self,
        code: &str,
    ) -> Result<Option<RedeemableCoupon>, CouponError> {
        let state = self.state.read().await;
        Ok(state
            .first_with_code(code, |c| !c.is_used && !c.deactivated && !state.is_linked(c.id))
            .and_then(|coupon| state.redeemable(coupon)))
    }

    async fn find_by_id(&self, coupon_id: i64) -> Result<Option<RedeemableCoupon>, CouponError> {
        let state = self.state.read().await;
        Ok(state
            .coupons
            .get(&coupon_id)
            .and_then(|coupon| state.redeemable(coupon)))
    }

    async fn count_used_instances(&self, code: &str) -> Result<i64, CouponError> {
        let state = self.state.read().await;
        let count = state
            .coupons
            .values()
            .filter(|c| c.code == code && (c.is_used || state.is_linked(c.id)))
            .count();
        Ok(count as i64)
    }

    async fn redeemed_coupon_ids(
        &self,
        account_id: i64,
        promotion_id: i64,
    ) -> Result<Vec<i64>, CouponError> {
        let state = self.state.read().await;
        let ids = state
            .orders
            .values()
            .filter(|order| order.customer_id == account_id)
            .flat_map(|order| order.components.iter())
            .filter_map(|component| component.used_coupon.as_ref())
            .filter(|link| !link.is_canceled)
            .filter(|link| {
                state
                    .coupons
                    .get(&link.coupon_id)
                    .is_some_and(|c| c.coupon_promotion_id == promotion_id)
            })
            .map(|link| link.coupon_id)
            .collect();
        Ok(ids)
    }

    async fn active_redemption_accounts(&self, coupon_id: i64) -> Result<Vec<i64>, CouponError> {
        let state = self.state.read().await;
        let accounts: BTreeSet<i64> = state
            .live_links()
            .filter(|(_, link)| link.coupon_id == coupon_id)
            .map(|(customer_id, _)| customer_id)
            .collect();
        Ok(accounts.into_iter().collect())
    }

    async fn mark_used(
        &self,
        coupon_id: i64,
        used_at: DateTime<Utc>,
    ) -> Result<Option<CouponCode>, CouponError> {
        let mut state = self.state.write().await;
        match state.coupons.get_mut(&coupon_id) {
            Some(coupon) if !coupon.is_used && !coupon.deactivated => {
                coupon.is_used = true;
                coupon.used_at = Some(used_at);
                Ok(Some(coupon.clone()))
            }
            _ => Ok(None),
        }
    }
}

/// Purchase pipeline that records the order and coupon link in an [`InMemoryCouponStore`]
#[derive(Debug, Clone)]
pub struct InMemoryPurchasePipeline {
    store: Arc<InMemoryCouponStore>,
}

impl InMemoryPurchasePipeline {
    pub fn new(store: Arc<InMemoryCouponStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PurchasePipeline for InMemoryPurchasePipeline {
    async fn purchase(
        &self,
        request: &RedeemCouponRequest,
        account: &MainAccount,
        coupon: &RedeemableCoupon,
    ) -> Result<PurchaseReceipt, CouponError> {
        // Let concurrent redemptions interleave the way a network round-trip would
        tokio::task::yield_now().await;

        let order_id = self
            .store
            .record_exclusive_order(account.id, coupon.coupon.id, request.items.len())
            .await?;

        Ok(PurchaseReceipt {
            order_id,
            customer_id: account.id,
            pharmacy_id: request.pharmacy_id,
            coupon_code_id: coupon.coupon.id,
            items: request.items.clone(),
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupons::CouponCodeType;
    use chrono::Duration;

    fn promotion(code_type: CouponCodeType) -> CouponPromotion {
        let now = Utc::now();
        CouponPromotion {
            id: 0,
            name: "Test".to_string(),
            start_time: now - Duration::days(1),
            end_time: now + Duration::days(1),
            is_active: true,
            usage_limit_per_account: 1,
            single_code_usage_limit: None,
            code_type,
        }
    }

    #[tokio::test]
    async fn test_first_unused_picks_lowest_id() {
        let store = InMemoryCouponStore::new();
        let promo = store.add_promotion(promotion(CouponCodeType::SingleCode)).await;
        let first = store.add_coupon("shared", promo.id).await;
        let second = store.add_coupon("SHARED", promo.id).await;
        let third = store.add_coupon("SHARED", promo.id).await;

        store.mark_used(first.id, Utc::now()).await.unwrap();
        let found = store.find_first_unused("SHARED").await.unwrap().unwrap();
        assert_eq!(found.coupon.id, second.id);

        store.deactivate(second.id).await;
        let found = store.find_first_unused("SHARED").await.unwrap().unwrap();
        assert_eq!(found.coupon.id, third.id);
    }

    #[tokio::test]
    async fn test_mark_used_is_conditional() {
        let store = InMemoryCouponStore::new();
        let promo = store.add_promotion(promotion(CouponCodeType::UniqueCode)).await;
        let coupon = store.add_coupon("ONCE", promo.id).await;

        assert!(store.mark_used(coupon.id, Utc::now()).await.unwrap().is_some());
        assert!(store.mark_used(coupon.id, Utc::now()).await.unwrap().is_none());
        assert!(store.mark_used(9999, Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_redeemed_ids_follow_links() {
        let store = InMemoryCouponStore::new();
        let promo = store.add_promotion(promotion(CouponCodeType::UniqueCode)).await;
        let other = store.add_promotion(promotion(CouponCodeType::UniqueCode)).await;
        let customer = store.add_customer(None).await;
        let a = store.add_coupon("A", promo.id).await;
        let b = store.add_coupon("B", other.id).await;

        store.record_order(customer.id, a.id, 3, 2).await;
        store.record_redemption(customer.id, b.id).await;

        let ids = store.redeemed_coupon_ids(customer.id, promo.id).await.unwrap();
        assert_eq!(ids, vec![a.id, a.id]);

        let canceled = store.record_redemption(customer.id, a.id).await;
        store.cancel_order(canceled).await;
        let ids = store.redeemed_coupon_ids(customer.id, promo.id).await.unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[tokio::test]
    async fn test_live_links_hide_pool_instances() {
        let store = InMemoryCouponStore::new();
        let promo = store.add_promotion(promotion(CouponCodeType::SingleCode)).await;
        let customer = store.add_customer(None).await;
        let first = store.add_coupon("POOL", promo.id).await;
        let second = store.add_coupon("POOL", promo.id).await;

        let order = store.record_redemption(customer.id, first.id).await;
        let found = store.find_first_unused("POOL").await.unwrap().unwrap();
        assert_eq!(found.coupon.id, second.id);
        assert_eq!(store.count_used_instances("POOL").await.unwrap(), 1);

        store.cancel_order(order).await;
        let found = store.find_first_unused("POOL").await.unwrap().unwrap();
        assert_eq!(found.coupon.id, first.id);
        assert_eq!(store.count_used_instances("POOL").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_active_redemption_accounts() {
        let store = InMemoryCouponStore::new();
        let promo = store.add_promotion(promotion(CouponCodeType::UniqueCode)).await;
        let first = store.add_customer(None).await;
        let second = store.add_customer(None).await;
        let coupon = store.add_coupon("LINKED", promo.id).await;

        assert!(store.active_redemption_accounts(coupon.id).await.unwrap().is_empty());

        store.record_order(second.id, coupon.id, 2, 2).await;
        let canceled = store.record_redemption(first.id, coupon.id).await;
        store.cancel_order(canceled).await;

        let accounts = store.active_redemption_accounts(coupon.id).await.unwrap();
        assert_eq!(accounts, vec![second.id]);
    }

    #[tokio::test]
    async fn test_exclusive_order_refuses_linked_coupon() {
        let store = InMemoryCouponStore::new();
        let promo = store.add_promotion(promotion(CouponCodeType::UniqueCode)).await;
        let first = store.add_customer(None).await;
        let second = store.add_customer(None).await;
        let coupon = store.add_coupon("MINE", promo.id).await;

        store.record_exclusive_order(first.id, coupon.id, 1).await.unwrap();
        let result = store.record_exclusive_order(second.id, coupon.id, 1).await;
        assert!(matches!(
            result,
            Err(CouponError::AlreadyRedeemed { coupon_id }) if coupon_id == coupon.id
        ));
    }
}
