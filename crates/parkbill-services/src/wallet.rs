//! Wallet service
//!
//! Prepaid balance operations. Recharges are serialized per user through the
//! distributed lock; debits rely on the storage-level conditional update and
//! need no lock of their own.

use parkbill_cache::{DistributedLock, LockManager};
use parkbill_core::{
    models::Wallet,
    traits::WalletRepository,
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::constants::{wallet_lock_resource, WALLET_LOCK_TTL_SECS, WALLET_LOCK_WAIT};

/// Wallet operations
pub struct WalletService<L = DistributedLock> {
    repo: Arc<dyn WalletRepository>,
    lock: L,
}

impl<L: LockManager> WalletService<L> {
    /// Create a new wallet service
    pub fn new(repo: Arc<dyn WalletRepository>, lock: L) -> Self {
        Self { repo, lock }
    }

    /// Load a user's wallet, creating an empty one on first touch
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, user_id: i64) -> AppResult<Wallet> {
        if let Some(wallet) = self.repo.find_by_user(user_id).await? {
            return Ok(wallet);
        }

        match self.repo.create_for_user(user_id).await {
            Ok(wallet) => Ok(wallet),
            // Lost a creation race; the winner's row is what we want
            Err(AppError::AlreadyExists(_)) => self
                .repo
                .find_by_user(user_id)
                .await?
                .ok_or_else(|| AppError::WalletNotFound(user_id.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Current balance in minor currency units
    #[instrument(skip(self))]
    pub async fn balance(&self, user_id: i64) -> AppResult<i64> {
        let wallet = self
            .repo
            .find_by_user(user_id)
            .await?
            .ok_or_else(|| AppError::WalletNotFound(user_id.to_string()))?;
        Ok(wallet.balance)
    }

    /// Add funds to a user's wallet.
    ///
    /// Serialized per user so concurrent recharges cannot interleave with
    /// first-touch wallet creation.
    #[instrument(skip(self))]
    pub async fn recharge(&self, user_id: i64, amount: i64) -> AppResult<Wallet> {
        if amount <= 0 {
            return Err(AppError::Validation(
                "recharge amount must be positive".to_string(),
            ));
        }

        let resource = wallet_lock_resource(user_id);
        self.lock
            .with_lock(&resource, WALLET_LOCK_TTL_SECS, WALLET_LOCK_WAIT, || async {
                self.get_or_create(user_id).await?;
                let wallet = self.repo.credit(user_id, amount).await?;
                debug!(
                    "Recharged {} for user {}; balance now {}",
                    amount, user_id, wallet.balance
                );
                Ok(wallet)
            })
            .await
    }

    /// Deduct funds if the balance covers the amount.
    ///
    /// # Errors
    ///
    /// [`AppError::InsufficientBalance`] when the balance does not cover
    /// `amount`; [`AppError::WalletNotFound`] when the user has no wallet
    #[instrument(skip(self))]
    pub async fn debit(&self, user_id: i64, amount: i64) -> AppResult<Wallet> {
        if amount <= 0 {
            return Err(AppError::Validation(
                "debit amount must be positive".to_string(),
            ));
        }

        if let Some(wallet) = self.repo.debit_if_sufficient(user_id, amount).await? {
            debug!(
                "Debited {} from user {}; balance now {}",
                amount, user_id, wallet.balance
            );
            return Ok(wallet);
        }

        let wallet = self
            .repo
            .find_by_user(user_id)
            .await?
            .ok_or_else(|| AppError::WalletNotFound(user_id.to_string()))?;

        Err(AppError::InsufficientBalance {
            required: amount,
            available: wallet.balance,
        })
    }

    /// Return previously debited funds, e.g. for an approved refund
    #[instrument(skip(self))]
    pub async fn refund(&self, user_id: i64, amount: i64) -> AppResult<Wallet> {
        if amount <= 0 {
            return Err(AppError::Validation(
                "refund amount must be positive".to_string(),
            ));
        }

        let resource = wallet_lock_resource(user_id);
        self.lock
            .with_lock(&resource, WALLET_LOCK_TTL_SECS, WALLET_LOCK_WAIT, || async {
                self.get_or_create(user_id).await?;
                self.repo.credit(user_id, amount).await
            })
            .await
    }
}
