use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::coupons::error::CouponError;
use crate::coupons::{MainAccount, PurchaseReceipt, RedeemCouponRequest, RedeemableCoupon};

/// Downstream purchase step, invoked only for coupons that passed validation
#[async_trait]
pub trait PurchasePipeline: Send + Sync {
    async fn purchase(
        &self,
        request: &RedeemCouponRequest,
        account: &MainAccount,
        coupon: &RedeemableCoupon,
    ) -> Result<PurchaseReceipt, CouponError>;
}

/// Records the order, its components and the coupon link in PostgreSQL.
/// Pricing and payment are handled further down the order flow.
///
/// The coupon row is locked for the transaction, so two API processes cannot
/// both link the same coupon.
#[derive(Clone)]
pub struct PgPurchasePipeline {
    pool: PgPool,
}

impl PgPurchasePipeline {
    /// Create a new PgPurchasePipeline
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PurchasePipeline for PgPurchasePipeline {
    async fn purchase(
        &self,
        request: &RedeemCouponRequest,
        account: &MainAccount,
        coupon: &RedeemableCoupon,
    ) -> Result<PurchaseReceipt, CouponError> {
        let coupon_id = coupon.coupon.id;
        let mut tx = self.pool.begin().await?;

        // Held until commit; a competing transaction waits here and then sees our link
        sqlx::query_scalar::<_, i64>("SELECT id FROM coupon_codes WHERE id = $1 FOR UPDATE")
            .bind(coupon_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(CouponError::CouponNotFound(coupon_id))?;

        let linked: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM used_coupons
                WHERE coupon_code_id = $1 AND is_canceled = FALSE
            )
            "#,
        )
        .bind(coupon_id)
        .fetch_one(&mut *tx)
        .await?;

        if linked {
            tracing::warn!("Coupon {} was linked by a concurrent order", coupon_id);
            return Err(CouponError::AlreadyRedeemed { coupon_id });
        }

        let (order_id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO orders (customer_id, pharmacy_id)
            VALUES ($1, $2)
            RETURNING id, created_at
            "#,
        )
        .bind(account.id)
        .bind(request.pharmacy_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut first_component: Option<i64> = None;
        for item in &request.items {
            let component_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO order_components (order_id, product_id, quantity)
                VALUES ($1, $2, $3)
                RETURNING id
                "#,
            )
            .bind(order_id)
            .bind(item.product_id)
            .bind(item.quantity)
            .fetch_one(&mut *tx)
            .await?;

            first_component.get_or_insert(component_id);
        }

        let component_id = first_component
            .ok_or_else(|| CouponError::Purchase("Purchase must contain at least one item".to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO used_coupons (order_component_id, coupon_code_id, is_canceled)
            VALUES ($1, $2, FALSE)
            "#,
        )
        .bind(component_id)
        .bind(coupon_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Recorded order {} for account {} with coupon {}",
            order_id,
            account.id,
            coupon_id
        );

        Ok(PurchaseReceipt {
            order_id,
            customer_id: account.id,
            pharmacy_id: request.pharmacy_id,
            coupon_code_id: coupon_id,
            items: request.items.clone(),
            created_at,
        })
    }
}
