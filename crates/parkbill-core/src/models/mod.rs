//! Domain models for the parking billing service
//!
//! This module contains all the core domain models used throughout the application.

pub mod member;
pub mod modification;
pub mod order;
pub mod promo;
pub mod rule;
pub mod session;
pub mod site;
pub mod wallet;

pub use member::Membership;
pub use modification::{ModificationStatus, ModificationType, OrderModification};
pub use order::{ChargeOrder, DiscountLineItem, DiscountSource, PayStatus};
pub use promo::{DiscountKind, PromotionalRule};
pub use rule::BillingRule;
pub use session::{ParkingSession, SessionStatus};
pub use site::ParkingSite;
pub use wallet::Wallet;
