//! Common traits for repositories and services
//!
//! Defines abstractions for database access and business logic.

use crate::error::AppError;
use crate::models::{
    BillingRule, ChargeOrder, DiscountKind, DiscountLineItem, DiscountSource, Membership,
    ModificationStatus, OrderModification, ParkingSession, ParkingSite, PayStatus,
    PromotionalRule, Wallet,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Generic repository trait for CRUD operations
#[async_trait]
pub trait Repository<T, ID>: Send + Sync {
    /// Find entity by ID
    async fn find_by_id(&self, id: ID) -> Result<Option<T>, AppError>;

    /// Find all entities with pagination
    async fn find_all(&self, limit: i64, offset: i64) -> Result<Vec<T>, AppError>;

    /// Count total entities
    async fn count(&self) -> Result<i64, AppError>;

    /// Create a new entity
    async fn create(&self, entity: &T) -> Result<T, AppError>;

    /// Update an existing entity
    async fn update(&self, entity: &T) -> Result<T, AppError>;

    /// Delete entity by ID
    async fn delete(&self, id: ID) -> Result<bool, AppError>;
}

/// Parking session repository trait with specialized methods
#[async_trait]
pub trait SessionRepository: Repository<ParkingSession, i64> {
    /// Find the open session for a plate at a site
    async fn find_active_by_plate(
        &self,
        site_id: i64,
        plate_number: &str,
    ) -> Result<Option<ParkingSession>, AppError>;

    /// List sessions for a site with pagination
    async fn list_by_site(
        &self,
        site_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ParkingSession>, i64), AppError>;
}

/// Parking site repository trait with specialized methods
#[async_trait]
pub trait SiteRepository: Repository<ParkingSite, i64> {
    /// Find site by its short code
    async fn find_by_code(&self, code: &str) -> Result<Option<ParkingSite>, AppError>;
}

/// Billing rule repository trait with specialized methods
#[async_trait]
pub trait RuleRepository: Repository<BillingRule, i64> {
    /// Find the applicable rule for a site on a given day.
    ///
    /// Returns the highest-priority enabled rule whose effective date range
    /// covers `on`, or `None` when the site has no applicable rule.
    async fn find_applicable(
        &self,
        site_id: i64,
        on: NaiveDate,
    ) -> Result<Option<BillingRule>, AppError>;

    /// List rules for a site ordered by priority descending
    async fn list_by_site(&self, site_id: i64) -> Result<Vec<BillingRule>, AppError>;

    /// Enable or disable a rule
    async fn update_status(&self, id: i64, status: i32) -> Result<BillingRule, AppError>;
}

/// Promotional rule repository trait with specialized methods
#[async_trait]
pub trait PromoRepository: Repository<PromotionalRule, i64> {
    /// Find promotional rule by its code
    async fn find_by_code(&self, code: &str) -> Result<Option<PromotionalRule>, AppError>;

    /// Enable or disable a promotional rule
    async fn update_status(&self, id: i64, status: i32) -> Result<PromotionalRule, AppError>;
}

/// Membership repository trait with specialized methods
#[async_trait]
pub trait MemberRepository: Repository<Membership, i64> {
    /// Find the membership owned by a user
    async fn find_by_user(&self, user_id: i64) -> Result<Option<Membership>, AppError>;

    /// Enable or disable a membership
    async fn update_status(&self, id: i64, status: i32) -> Result<Membership, AppError>;
}

/// Charge order repository trait with specialized methods
#[async_trait]
pub trait OrderRepository: Repository<ChargeOrder, i64> {
    /// Find order by its business number
    async fn find_by_order_no(&self, order_no: &str) -> Result<Option<ChargeOrder>, AppError>;

    /// Find the order settling a (session, exit-time) pair.
    ///
    /// This is the idempotency lookup and always reads storage directly.
    async fn find_by_session_and_exit(
        &self,
        session_id: i64,
        exit_time: DateTime<Utc>,
    ) -> Result<Option<ChargeOrder>, AppError>;

    /// Load the discount line items of an order
    async fn find_line_items(&self, order_id: i64) -> Result<Vec<DiscountLineItem>, AppError>;

    /// Transition an order from UNPAID to PAID.
    ///
    /// The transition is conditional at the storage layer; a second confirm
    /// finds zero rows updated and surfaces as `None`.
    async fn mark_paid(
        &self,
        id: i64,
        channel: &str,
        pay_time: DateTime<Utc>,
    ) -> Result<Option<ChargeOrder>, AppError>;

    /// Adjust the payable amount of an order
    async fn update_amount(&self, id: i64, amount: i64) -> Result<ChargeOrder, AppError>;

    /// Transition an order to REFUNDED
    async fn mark_refunded(&self, id: i64) -> Result<ChargeOrder, AppError>;
}

/// Wallet repository trait
#[async_trait]
pub trait WalletRepository: Send + Sync {
    /// Find wallet by owning user
    async fn find_by_user(&self, user_id: i64) -> Result<Option<Wallet>, AppError>;

    /// Create an empty wallet for a user
    async fn create_for_user(&self, user_id: i64) -> Result<Wallet, AppError>;

    /// Add funds and bump the lifetime recharge total
    async fn credit(&self, user_id: i64, amount: i64) -> Result<Wallet, AppError>;

    /// Deduct funds only if the balance covers `amount`.
    ///
    /// The balance check and the deduction are a single conditional update,
    /// so the balance can never go negative. Returns the updated wallet or
    /// `None` when funds were insufficient.
    async fn debit_if_sufficient(
        &self,
        user_id: i64,
        amount: i64,
    ) -> Result<Option<Wallet>, AppError>;
}

/// Order modification repository trait with specialized methods
#[async_trait]
pub trait ModificationRepository: Repository<OrderModification, i64> {
    /// List requests awaiting review
    async fn list_pending(&self, limit: i64, offset: i64)
        -> Result<Vec<OrderModification>, AppError>;

    /// Record the review verdict on a pending request.
    ///
    /// The transition is conditional on PENDING at the storage layer;
    /// a concurrent review finds zero rows updated and surfaces as `None`.
    async fn review(
        &self,
        id: i64,
        status: ModificationStatus,
        reviewed_by: i64,
        note: Option<&str>,
    ) -> Result<Option<OrderModification>, AppError>;
}

/// Wallet debit executed inside a settlement transaction
#[derive(Debug, Clone, Copy)]
pub struct WalletDebit {
    pub user_id: i64,
    pub amount: i64,
}

/// Transactional writer for settlement results
///
/// Persisting a settlement touches the order, its line items, the session
/// row and optionally a wallet, and must be all-or-nothing. The
/// implementation runs everything in one database transaction.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Persist an order with its discount line items, mark the session
    /// finished and apply an optional wallet debit, atomically.
    ///
    /// A duplicate (session, exit-time) pair surfaces as
    /// [`AppError::Conflict`]; an uncovered wallet debit as
    /// [`AppError::InsufficientBalance`].
    async fn persist_settlement(
        &self,
        order: &ChargeOrder,
        line_items: &[DiscountLineItem],
        wallet_debit: Option<WalletDebit>,
    ) -> Result<ChargeOrder, AppError>;
}

/// One discount applied during settlement, in wire form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppliedDiscount {
    /// MEMBER or RULE
    pub source: DiscountSource,

    /// Promotional code, when source is RULE
    pub code: Option<String>,

    /// Display name
    pub name: String,

    /// FREE, PERCENT or FIXED
    pub kind: DiscountKind,

    /// Raw discount value as configured
    pub value: i32,

    /// Absolute discount amount in minor currency units
    pub amount: i64,
}

/// Result of running the discount stages over an original amount
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscountOutcome {
    /// Remaining payable amount, never negative
    pub payable: i64,

    /// Discounts applied, in application order
    pub applied: Vec<AppliedDiscount>,
}

impl DiscountOutcome {
    /// Total discounted amount
    pub fn total_discount(&self) -> i64 {
        self.applied.iter().map(|d| d.amount).sum()
    }
}

/// Settlement request
#[derive(Debug, Clone, Deserialize)]
pub struct SettleRequest {
    /// Session to settle
    pub session_id: i64,

    /// Exit time; half of the idempotency key
    pub exit_time: DateTime<Utc>,

    /// User whose membership and wallet apply, if known
    pub user_id: Option<i64>,

    /// Promotional code to redeem
    pub promo_code: Option<String>,

    /// Pay immediately from the user's wallet
    #[serde(default)]
    pub pay_from_wallet: bool,
}

/// Settlement response
#[derive(Debug, Clone, Serialize)]
pub struct SettlementResponse {
    /// Persisted order id
    pub order_id: i64,

    /// Business order number
    pub order_no: String,

    /// Settled session
    pub session_id: i64,

    /// Parked duration in whole minutes
    pub parked_minutes: i64,

    /// Exit time the order settled
    pub exit_time: DateTime<Utc>,

    /// Pre-discount amount in minor currency units
    pub original_amount: i64,

    /// Sum of all applied discounts
    pub discount_amount: i64,

    /// Final payable amount
    pub payable_amount: i64,

    /// Payment status after settlement
    pub pay_status: PayStatus,

    /// Billing rule the amount came from
    pub rule_name: String,

    /// Discounts in application order
    pub discounts: Vec<AppliedDiscount>,

    /// True when an earlier settlement was replayed instead of recomputed
    pub replayed: bool,
}

/// Settlement preview, never persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementPreview {
    /// Session being previewed
    pub session_id: i64,

    /// Parked duration in whole minutes
    pub parked_minutes: i64,

    /// Pre-discount amount
    pub original_amount: i64,

    /// Sum of all applicable discounts
    pub discount_amount: i64,

    /// Amount the customer would pay now
    pub payable_amount: i64,

    /// Billing rule the amount came from
    pub rule_name: String,

    /// Discounts in application order
    pub discounts: Vec<AppliedDiscount>,
}

/// Settlement service trait
#[async_trait]
pub trait SettlementService: Send + Sync {
    /// Settle a finished session into a charge order, idempotently
    async fn settle(&self, request: SettleRequest) -> Result<SettlementResponse, AppError>;

    /// Quote the cost of an open session at a given exit time without
    /// persisting anything
    async fn preview(
        &self,
        session_id: i64,
        exit_time: DateTime<Utc>,
        user_id: Option<i64>,
        promo_code: Option<&str>,
    ) -> Result<SettlementPreview, AppError>;

    /// Confirm payment of an unpaid order
    async fn confirm_payment(
        &self,
        order_id: i64,
        channel: &str,
    ) -> Result<SettlementResponse, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discount_outcome_total() {
        let outcome = DiscountOutcome {
            payable: 400,
            applied: vec![
                AppliedDiscount {
                    source: DiscountSource::Member,
                    code: None,
                    name: "Member discount".into(),
                    kind: DiscountKind::Percent,
                    value: 80,
                    amount: 200,
                },
                AppliedDiscount {
                    source: DiscountSource::Rule,
                    code: Some("SUMMER".into()),
                    name: "Summer promo".into(),
                    kind: DiscountKind::Fixed,
                    value: 400,
                    amount: 400,
                },
            ],
        };
        assert_eq!(outcome.total_discount(), 600);
    }
}
