//! Order modification service
//!
//! After-the-fact changes to settled orders go through a review queue:
//! an operator files a request, a reviewer approves or rejects it exactly
//! once, and approval applies the change to the order.

use parkbill_cache::{DistributedLock, LockManager};
use parkbill_core::{
    models::{
        ModificationStatus, ModificationType, OrderModification, PayStatus,
    },
    traits::{ModificationRepository, OrderRepository},
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::wallet::WalletService;

/// Order modification review workflow
pub struct ModificationService<L = DistributedLock> {
    mod_repo: Arc<dyn ModificationRepository>,
    order_repo: Arc<dyn OrderRepository>,
    wallets: Arc<WalletService<L>>,
}

impl<L: LockManager> ModificationService<L> {
    /// Create a new modification service
    pub fn new(
        mod_repo: Arc<dyn ModificationRepository>,
        order_repo: Arc<dyn OrderRepository>,
        wallets: Arc<WalletService<L>>,
    ) -> Self {
        Self {
            mod_repo,
            order_repo,
            wallets,
        }
    }

    /// File a request to adjust the payable amount of an unpaid order
    #[instrument(skip(self))]
    pub async fn request_amount_adjust(
        &self,
        order_id: i64,
        new_amount: i64,
        reason: &str,
        requested_by: i64,
    ) -> AppResult<OrderModification> {
        if new_amount < 0 {
            return Err(AppError::Validation(
                "adjusted amount must not be negative".to_string(),
            ));
        }

        let order = self
            .order_repo
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| AppError::OrderNotFound(order_id.to_string()))?;

        if order.pay_status != PayStatus::Unpaid {
            return Err(AppError::InvalidState(format!(
                "order {} is {}, only unpaid orders can be adjusted",
                order.order_no, order.pay_status
            )));
        }

        let request = OrderModification {
            order_id,
            kind: ModificationType::AmountAdjust,
            requested_amount: new_amount,
            original_amount: order.amount,
            reason: reason.to_string(),
            requested_by,
            ..Default::default()
        };

        self.mod_repo.create(&request).await
    }

    /// File a request to refund a paid order
    #[instrument(skip(self))]
    pub async fn request_refund(
        &self,
        order_id: i64,
        amount: i64,
        reason: &str,
        requested_by: i64,
    ) -> AppResult<OrderModification> {
        if amount <= 0 {
            return Err(AppError::Validation(
                "refund amount must be positive".to_string(),
            ));
        }

        let order = self
            .order_repo
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| AppError::OrderNotFound(order_id.to_string()))?;

        if order.pay_status != PayStatus::Paid {
            return Err(AppError::InvalidState(format!(
                "order {} is {}, only paid orders can be refunded",
                order.order_no, order.pay_status
            )));
        }
        if amount > order.amount {
            return Err(AppError::Validation(format!(
                "refund {} exceeds the paid amount {}",
                amount, order.amount
            )));
        }

        let request = OrderModification {
            order_id,
            kind: ModificationType::Refund,
            requested_amount: amount,
            original_amount: order.amount,
            reason: reason.to_string(),
            requested_by,
            ..Default::default()
        };

        self.mod_repo.create(&request).await
    }

    /// List requests awaiting review
    pub async fn list_pending(&self, limit: i64, offset: i64) -> AppResult<Vec<OrderModification>> {
        self.mod_repo.list_pending(limit, offset).await
    }

    /// Approve a pending request and apply it to the order.
    ///
    /// The PENDING-to-APPROVED transition is conditional at the storage
    /// layer, so a request can only ever be applied once.
    #[instrument(skip(self))]
    pub async fn approve(
        &self,
        id: i64,
        reviewed_by: i64,
        note: Option<&str>,
    ) -> AppResult<OrderModification> {
        let request = self
            .mod_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::ModificationNotFound(id.to_string()))?;

        if !request.is_reviewable() {
            return Err(AppError::InvalidState(format!(
                "modification {} is {}, only pending requests can be reviewed",
                id, request.status
            )));
        }

        let approved = self
            .mod_repo
            .review(id, ModificationStatus::Approved, reviewed_by, note)
            .await?
            .ok_or_else(|| {
                AppError::InvalidState(format!("modification {} was reviewed concurrently", id))
            })?;

        match approved.kind {
            ModificationType::AmountAdjust => {
                let order = self
                    .order_repo
                    .find_by_id(approved.order_id)
                    .await?
                    .ok_or_else(|| AppError::OrderNotFound(approved.order_id.to_string()))?;

                if order.pay_status != PayStatus::Unpaid {
                    return Err(AppError::InvalidState(format!(
                        "order {} was paid while the adjustment was pending",
                        order.order_no
                    )));
                }

                self.order_repo
                    .update_amount(approved.order_id, approved.requested_amount)
                    .await?;
                info!(
                    "Adjusted order {} from {} to {}",
                    approved.order_id, approved.original_amount, approved.requested_amount
                );
            }
            ModificationType::Refund => {
                let order = self.order_repo.mark_refunded(approved.order_id).await?;

                // Wallet-linked orders get the money back automatically;
                // external channels settle out of band
                if let Some(user_id) = order.user_id {
                    self.wallets.refund(user_id, approved.requested_amount).await?;
                }
                info!(
                    "Refunded {} on order {}",
                    approved.requested_amount, approved.order_id
                );
            }
        }

        Ok(approved)
    }

    /// Reject a pending request
    #[instrument(skip(self))]
    pub async fn reject(
        &self,
        id: i64,
        reviewed_by: i64,
        note: Option<&str>,
    ) -> AppResult<OrderModification> {
        let request = self
            .mod_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::ModificationNotFound(id.to_string()))?;

        if !request.is_reviewable() {
            return Err(AppError::InvalidState(format!(
                "modification {} is {}, only pending requests can be reviewed",
                id, request.status
            )));
        }

        self.mod_repo
            .review(id, ModificationStatus::Rejected, reviewed_by, note)
            .await?
            .ok_or_else(|| {
                AppError::InvalidState(format!("modification {} was reviewed concurrently", id))
            })
    }
}
