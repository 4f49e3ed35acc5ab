//! Repository implementations
//!
//! This module contains concrete implementations of all repository traits
//! defined in parkbill-core, using sqlx for PostgreSQL access.

pub mod member_repo;
pub mod modification_repo;
pub mod order_repo;
pub mod promo_repo;
pub mod rule_repo;
pub mod session_repo;
pub mod settlement_store;
pub mod site_repo;
pub mod wallet_repo;

pub use member_repo::PgMemberRepository;
pub use modification_repo::PgModificationRepository;
pub use order_repo::PgOrderRepository;
pub use promo_repo::PgPromoRepository;
pub use rule_repo::PgRuleRepository;
pub use session_repo::PgSessionRepository;
pub use settlement_store::PgSettlementStore;
pub use site_repo::PgSiteRepository;
pub use wallet_repo::PgWalletRepository;
