use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::coupons::error::CouponError;
use crate::coupons::{
    CodeProfile, CouponCode, CouponCodeType, CouponPromotion, Customer, RedeemableCoupon,
};

/// Persistence port for coupon redemption
///
/// Codes passed in are already normalized (trimmed, upper-case).
#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn find_customer(&self, customer_id: i64) -> Result<Option<Customer>, CouponError>;

    async fn pharmacy_exists(&self, pharmacy_id: i64) -> Result<bool, CouponError>;

    /// Promotion and code type of the lowest-id record carrying `code`
    async fn find_code_profile(&self, code: &str) -> Result<Option<CodeProfile>, CouponError>;

    /// Lowest-id record carrying `code`, regardless of used or deactivated state
    async fn find_by_code(&self, code: &str) -> Result<Option<RedeemableCoupon>, CouponError>;

    /// Lowest-id record carrying `code` that is unused, not deactivated and not
    /// linked to a live redemption
    async fn find_first_unused(&self, code: &str)
        -> Result<Option<RedeemableCoupon>, CouponError>;

    async fn find_by_id(&self, coupon_id: i64) -> Result<Option<RedeemableCoupon>, CouponError>;

    /// Number of instances carrying `code` that are used or linked to a live redemption
    async fn count_used_instances(&self, code: &str) -> Result<i64, CouponError>;

    /// Coupon ids linked to non-canceled redemptions of `account_id` under a promotion.
    /// One row per redemption link; ids may repeat.
    async fn redeemed_coupon_ids(
        &self,
        account_id: i64,
        promotion_id: i64,
    ) -> Result<Vec<i64>, CouponError>;

    /// Main accounts holding a non-canceled redemption link to the coupon, ascending
    async fn active_redemption_accounts(&self, coupon_id: i64) -> Result<Vec<i64>, CouponError>;

    /// Flip `is_used` on an unused, non-deactivated coupon.
    /// Returns `None` when no row matched the condition.
    async fn mark_used(
        &self,
        coupon_id: i64,
        used_at: DateTime<Utc>,
    ) -> Result<Option<CouponCode>, CouponError>;
}

/// Row of `coupon_codes` joined with its promotion
#[derive(Debug, FromRow)]
struct RedeemableCouponRow {
    id: i64,
    code: String,
    coupon_promotion_id: i64,
    is_used: bool,
    deactivated: bool,
    used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    promotion_name: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    is_active: bool,
    usage_limit_per_account: i32,
    single_code_usage_limit: Option<i32>,
    code_type: CouponCodeType,
}

impl From<RedeemableCouponRow> for RedeemableCoupon {
    fn from(row: RedeemableCouponRow) -> Self {
        Self {
            coupon: CouponCode {
                id: row.id,
                code: row.code,
                coupon_promotion_id: row.coupon_promotion_id,
                is_used: row.is_used,
                deactivated: row.deactivated,
                used_at: row.used_at,
                created_at: row.created_at,
            },
            promotion: CouponPromotion {
                id: row.coupon_promotion_id,
                name: row.promotion_name,
                start_time: row.start_time,
                end_time: row.end_time,
                is_active: row.is_active,
                usage_limit_per_account: row.usage_limit_per_account,
                single_code_usage_limit: row.single_code_usage_limit,
                code_type: row.code_type,
            },
        }
    }
}

const REDEEMABLE_COLUMNS: &str = r#"
    c.id, c.code, c.coupon_promotion_id, c.is_used, c.deactivated, c.used_at, c.created_at,
    p.name AS promotion_name, p.start_time, p.end_time, p.is_active,
    p.usage_limit_per_account, p.single_code_usage_limit, p.code_type
"#;

/// PostgreSQL-backed coupon store
#[derive(Clone)]
pub struct PgCouponStore {
    pool: PgPool,
}

impl PgCouponStore {
    /// Create a new PgCouponStore
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_redeemable(
        &self,
        filter: &str,
        code: &str,
    ) -> Result<Option<RedeemableCoupon>, CouponError> {
        let sql = format!(
            "SELECT {REDEEMABLE_COLUMNS} FROM coupon_codes c \
             JOIN coupon_promotions p ON p.id = c.coupon_promotion_id \
             WHERE {filter} ORDER BY c.id LIMIT 1"
        );

        let row = sqlx::query_as::<_, RedeemableCouponRow>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl CouponStore for PgCouponStore {
    async fn find_customer(&self, customer_id: i64) -> Result<Option<Customer>, CouponError> {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT id, main_customer_id FROM customers WHERE id = $1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    async fn pharmacy_exists(&self, pharmacy_id: i64) -> Result<bool, CouponError> {
        let exists: Option<bool> =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pharmacies WHERE id = $1)")
                .bind(pharmacy_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists.unwrap_or(false))
    }

    async fn find_code_profile(&self, code: &str) -> Result<Option<CodeProfile>, CouponError> {
        let profile = sqlx::query_as::<_, CodeProfile>(
            r#"
            SELECT p.id AS promotion_id, p.code_type
            FROM coupon_codes c
            JOIN coupon_promotions p ON p.id = c.coupon_promotion_id
            WHERE c.code = $1
            ORDER BY c.id
            LIMIT 1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<RedeemableCoupon>, CouponError> {
        self.fetch_redeemable("c.code = $1", code).await
    }

    async fn find_first_unused(
        &self,
        code: &str,
    ) -> Result<Option<RedeemableCoupon>, CouponError> {
        self.fetch_redeemable(
            "c.code = $1 AND c.is_used = FALSE AND c.deactivated = FALSE \
             AND NOT EXISTS (SELECT 1 FROM used_coupons uc \
                             WHERE uc.coupon_code_id = c.id AND uc.is_canceled = FALSE)",
            code,
        )
        .await
    }

    async fn find_by_id(&self, coupon_id: i64) -> Result<Option<RedeemableCoupon>, CouponError> {
        let sql = format!(
            "SELECT {REDEEMABLE_COLUMNS} FROM coupon_codes c \
             JOIN coupon_promotions p ON p.id = c.coupon_promotion_id \
             WHERE c.id = $1"
        );

        let row = sqlx::query_as::<_, RedeemableCouponRow>(&sql)
            .bind(coupon_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn count_used_instances(&self, code: &str) -> Result<i64, CouponError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM coupon_codes c
            WHERE c.code = $1
              AND (c.is_used = TRUE
                   OR EXISTS (SELECT 1 FROM used_coupons uc
                              WHERE uc.coupon_code_id = c.id AND uc.is_canceled = FALSE))
            "#,
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn redeemed_coupon_ids(
        &self,
        account_id: i64,
        promotion_id: i64,
    ) -> Result<Vec<i64>, CouponError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT c.id
            FROM orders o
            JOIN order_components oc ON oc.order_id = o.id
            JOIN used_coupons uc ON uc.order_component_id = oc.id
            JOIN coupon_codes c ON c.id = uc.coupon_code_id
            WHERE o.customer_id = $1
              AND uc.is_canceled = FALSE
              AND c.coupon_promotion_id = $2
            "#,
        )
        .bind(account_id)
        .bind(promotion_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn active_redemption_accounts(&self, coupon_id: i64) -> Result<Vec<i64>, CouponError> {
        let accounts: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT o.customer_id
            FROM used_coupons uc
            JOIN order_components oc ON oc.id = uc.order_component_id
            JOIN orders o ON o.id = oc.order_id
            WHERE uc.coupon_code_id = $1 AND uc.is_canceled = FALSE
            ORDER BY o.customer_id
            "#,
        )
        .bind(coupon_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(accounts)
    }

    async fn mark_used(
        &self,
        coupon_id: i64,
        used_at: DateTime<Utc>,
    ) -> Result<Option<CouponCode>, CouponError> {
        let coupon = sqlx::query_as::<_, CouponCode>(
            r#"
            UPDATE coupon_codes
            SET is_used = TRUE, used_at = $2
            WHERE id = $1 AND is_used = FALSE AND deactivated = FALSE
            RETURNING id, code, coupon_promotion_id, is_used, deactivated, used_at, created_at
            "#,
        )
        .bind(coupon_id)
        .bind(used_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(coupon)
    }
}
