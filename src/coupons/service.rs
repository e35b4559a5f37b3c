use std::sync::Arc;

use chrono::Utc;
use tokio::sync::OwnedMutexGuard;
use validator::Validate;

use crate::coupons::error::{CouponError, Violation};
use crate::coupons::lookup::{normalize_code, resolve_with_profile};
use crate::coupons::validation_chain::{evaluate, ValidationReport};
use crate::coupons::{
    CouponCode, CouponStore, MainAccount, PurchasePipeline, PurchaseReceipt, RedeemCouponRequest,
    RedeemableCoupon, RedemptionLocks, ValidateCouponRequest,
};

/// Outcome of a redemption attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RedemptionOutcome {
    /// Validation passed and the purchase pipeline completed
    Accepted {
        coupon: RedeemableCoupon,
        receipt: PurchaseReceipt,
    },
    /// At least one rule failed; nothing was written
    Rejected { violations: Vec<Violation> },
}

/// Service for coupon redemption business logic
///
/// Redemption is a two-step contract: [`CouponUsageService::redeem`] validates the
/// coupon and runs the purchase, and the caller marks the coupon used afterwards
/// with [`CouponUsageService::update_coupon_usage`].
#[derive(Clone)]
pub struct CouponUsageService {
    store: Arc<dyn CouponStore>,
    pipeline: Arc<dyn PurchasePipeline>,
    locks: Arc<RedemptionLocks>,
}

impl CouponUsageService {
    /// Create a new CouponUsageService
    pub fn new(store: Arc<dyn CouponStore>, pipeline: Arc<dyn PurchasePipeline>) -> Self {
        Self {
            store,
            pipeline,
            locks: Arc::new(RedemptionLocks::new()),
        }
    }

    /// Resolve a customer to the main account usage is attributed to
    pub async fn resolve_main_account(&self, customer_id: i64) -> Result<MainAccount, CouponError> {
        let customer = self
            .store
            .find_customer(customer_id)
            .await?
            .ok_or(CouponError::CustomerNotFound(customer_id))?;

        Ok(customer.main_account())
    }

    async fn ensure_pharmacy(&self, pharmacy_id: Option<i64>) -> Result<(), CouponError> {
        match pharmacy_id {
            Some(id) if !self.store.pharmacy_exists(id).await? => {
                Err(CouponError::PharmacyNotFound(id))
            }
            _ => Ok(()),
        }
    }

    async fn validate_code(
        &self,
        account: &MainAccount,
        raw_code: &str,
        lock: bool,
    ) -> Result<(ValidationReport, Vec<OwnedMutexGuard<()>>), CouponError> {
        let code = normalize_code(raw_code);
        let profile = self.store.find_code_profile(&code).await?;

        let guards = match (lock, profile) {
            (true, Some(profile)) => {
                self.locks
                    .acquire_redemption(&code, account.id, profile.promotion_id)
                    .await
            }
            _ => Vec::new(),
        };

        let resolved = resolve_with_profile(self.store.as_ref(), code, profile).await?;
        let report = evaluate(self.store.as_ref(), resolved, account, Utc::now()).await?;

        Ok((report, guards))
    }

    /// Run the validation chain without any side effect
    ///
    /// # Arguments
    /// * `customer_id` - ID of the authenticated customer
    /// * `request` - Coupon code and optional pharmacy
    ///
    /// # Returns
    /// The validation report, or an error for malformed requests, unknown
    /// customers/pharmacies and database faults
    pub async fn validate(
        &self,
        customer_id: i64,
        request: &ValidateCouponRequest,
    ) -> Result<ValidationReport, CouponError> {
        request.validate()?;
        let account = self.resolve_main_account(customer_id).await?;
        self.ensure_pharmacy(request.pharmacy_id).await?;

        let (report, _) = self.validate_code(&account, &request.coupon_code, false).await?;
        Ok(report)
    }

    /// Validate a coupon and hand the purchase to the pipeline
    ///
    /// # Validation
    /// - Request shape is checked first (`ValidationError`)
    /// - Customer is resolved to its main account
    /// - Pharmacy must exist when supplied
    /// - Attempts on one code, and attempts by one account under one promotion,
    ///   are serialized until the purchase is recorded
    /// - Any violation rejects the attempt before the pipeline runs
    ///
    /// The coupon is NOT marked used here; see [`Self::update_coupon_usage`].
    pub async fn redeem(
        &self,
        customer_id: i64,
        request: &RedeemCouponRequest,
    ) -> Result<RedemptionOutcome, CouponError> {
        request.validate()?;
        let account = self.resolve_main_account(customer_id).await?;
        self.ensure_pharmacy(request.pharmacy_id).await?;

        let (report, _guards) = self.validate_code(&account, &request.coupon_code, true).await?;

        let coupon = match (report.violations.is_empty(), report.resolved.coupon) {
            (true, Some(coupon)) => coupon,
            _ => {
                return Ok(RedemptionOutcome::Rejected {
                    violations: report.violations,
                })
            }
        };

        let receipt = self.pipeline.purchase(request, &account, &coupon).await?;

        tracing::info!(
            "Coupon {} redeemed by account {} (order {})",
            coupon.coupon.id,
            account.id,
            receipt.order_id
        );

        Ok(RedemptionOutcome::Accepted { coupon, receipt })
    }

    /// Mark a coupon as used on behalf of the customer who redeemed it
    ///
    /// # Validation
    /// - Customer is resolved to its main account
    /// - The coupon must exist (`CouponNotFound`)
    /// - The main account must hold a non-canceled redemption of the coupon
    ///   (`RedemptionNotFound`)
    ///
    /// Only an unused, non-deactivated coupon is updated. Losing a race against a
    /// concurrent call, or calling this twice, yields `PersistenceFailure`.
    pub async fn update_coupon_usage(
        &self,
        customer_id: i64,
        coupon_id: i64,
    ) -> Result<CouponCode, CouponError> {
        let account = self.resolve_main_account(customer_id).await?;

        if self.store.find_by_id(coupon_id).await?.is_none() {
            return Err(CouponError::CouponNotFound(coupon_id));
        }

        let holders = self.store.active_redemption_accounts(coupon_id).await?;
        if !holders.contains(&account.id) {
            tracing::warn!(
                "Account {} tried to mark coupon {} without redeeming it",
                account.id,
                coupon_id
            );
            return Err(CouponError::RedemptionNotFound {
                coupon_id,
                account_id: account.id,
            });
        }

        match self.store.mark_used(coupon_id, Utc::now()).await? {
            Some(coupon) => {
                tracing::info!("Coupon {} marked as used", coupon.id);
                Ok(coupon)
            }
            None => {
                tracing::warn!("Coupon {} was not marked as used: already used or deactivated", coupon_id);
                Err(CouponError::PersistenceFailure { coupon_id })
            }
        }
    }
}
