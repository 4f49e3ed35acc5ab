//! Business logic services for the parking billing service
//!
//! This crate contains all the business logic services that orchestrate
//! billing operations: rule resolution, discount computation, settlement,
//! memberships, promotions, wallets and order modifications.
//!
//! # Architecture
//!
//! Services are designed to be composable and testable:
//! - Each service owns its dependencies (repositories, cache, lock)
//! - Repositories are held as `Arc<dyn Trait>` for safe sharing across tasks
//! - All operations are instrumented with tracing
//! - Comprehensive error handling with AppError
//!
//! # Services
//!
//! - `RuleService` - Cache-aside billing rule resolution with site fallback
//! - `DiscountEngine` - Two-stage discount computation (member, then promo)
//! - `SettlementServiceImpl` - Idempotent exit settlement, preview, payment
//! - `MembershipService` - Membership administration with cached lookups
//! - `PromotionService` - Promotional rule administration
//! - `WalletService` - Prepaid wallet recharges and debits
//! - `ModificationService` - Order modification review queue

pub mod discounts;
pub mod membership;
pub mod modifications;
pub mod promotions;
pub mod rules;
pub mod settlement;
pub mod wallet;

#[cfg(test)]
mod testutil;

pub use discounts::DiscountEngine;
pub use membership::MembershipService;
pub use modifications::ModificationService;
pub use promotions::PromotionService;
pub use rules::RuleService;
pub use settlement::SettlementServiceImpl;
pub use wallet::WalletService;

/// Business logic constants
pub mod constants {
    use std::time::Duration;

    /// Grace minutes applied when neither rule nor site configures one
    pub const DEFAULT_FREE_MINUTES: i64 = 30;

    /// Settlement lock TTL in seconds
    pub const SETTLEMENT_LOCK_TTL_SECS: u64 = 30;

    /// How long a settlement waits for a contended lock
    pub const SETTLEMENT_LOCK_WAIT: Duration = Duration::from_secs(10);

    /// Wallet lock TTL in seconds
    pub const WALLET_LOCK_TTL_SECS: u64 = 10;

    /// How long a wallet operation waits for a contended lock
    pub const WALLET_LOCK_WAIT: Duration = Duration::from_secs(5);

    /// Business order number prefix
    pub const ORDER_NO_PREFIX: &str = "CO";

    /// Payment channel recorded for wallet-paid settlements
    pub const CHANNEL_WALLET: &str = "WALLET";

    /// Payment channel recorded for zero-amount orders
    pub const CHANNEL_AUTO: &str = "AUTO";

    /// Lock resource for settling one session
    pub fn settle_lock_resource(session_id: i64) -> String {
        format!("settle:{}", session_id)
    }

    /// Lock resource for one user's wallet
    pub fn wallet_lock_resource(user_id: i64) -> String {
        format!("wallet:{}", user_id)
    }
}
