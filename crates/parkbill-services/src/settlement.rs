//! Exit settlement service
//!
//! Turns a finished parking session into a charge order: resolve the
//! applicable pricing, compute the pre-discount amount, run the discount
//! stages, then persist everything atomically.
//!
//! Settlement is idempotent by (session, exit-time). The lookup for an
//! existing order always reads storage directly, never the cache; replaying
//! a settlement must see exactly what was persisted, and exit gates retry
//! aggressively on slow networks. The distributed lock narrows the
//! concurrency window, but the storage unique constraint is what guarantees
//! that at most one order wins.

use parkbill_cache::{keys, DistributedLock, EntryCache, LockManager, RedisCache};
use parkbill_core::{
    models::{ChargeOrder, DiscountLineItem, ParkingSession, PayStatus, SessionStatus},
    traits::{
        AppliedDiscount, OrderRepository, SessionRepository, SettleRequest, SettlementPreview,
        SettlementResponse, SettlementService, SettlementStore, WalletDebit,
    },
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::constants::{
    settle_lock_resource, CHANNEL_AUTO, CHANNEL_WALLET, ORDER_NO_PREFIX,
    SETTLEMENT_LOCK_TTL_SECS, SETTLEMENT_LOCK_WAIT,
};
use crate::discounts::DiscountEngine;
use crate::membership::MembershipService;
use crate::promotions::PromotionService;
use crate::rules::RuleService;

/// Settlement orchestration
pub struct SettlementServiceImpl<C = RedisCache, L = DistributedLock> {
    session_repo: Arc<dyn SessionRepository>,
    order_repo: Arc<dyn OrderRepository>,
    store: Arc<dyn SettlementStore>,
    rules: Arc<RuleService<C>>,
    members: Arc<MembershipService<C>>,
    promos: Arc<PromotionService<C>>,
    lock: L,
    cache: Arc<C>,
}

impl<C: EntryCache, L: LockManager> SettlementServiceImpl<C, L> {
    /// Create a new settlement service
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_repo: Arc<dyn SessionRepository>,
        order_repo: Arc<dyn OrderRepository>,
        store: Arc<dyn SettlementStore>,
        rules: Arc<RuleService<C>>,
        members: Arc<MembershipService<C>>,
        promos: Arc<PromotionService<C>>,
        lock: L,
        cache: Arc<C>,
    ) -> Self {
        Self {
            session_repo,
            order_repo,
            store,
            rules,
            members,
            promos,
            lock,
            cache,
        }
    }

    /// Rebuild a response from an already-persisted order.
    ///
    /// The original amount is not stored on the order; it is the payable
    /// amount plus everything the line items discounted.
    async fn replay(&self, order: ChargeOrder) -> AppResult<SettlementResponse> {
        let items = self.order_repo.find_line_items(order.id).await?;
        let discount_amount: i64 = items.iter().map(|i| i.amount).sum();

        let parked_minutes = match self.session_repo.find_by_id(order.session_id).await? {
            Some(session) => session.parked_minutes(order.exit_time),
            None => {
                warn!(
                    "Session {} missing while replaying order {}",
                    order.session_id, order.order_no
                );
                0
            }
        };

        debug!(
            "Replaying settlement for session {}: order {}",
            order.session_id, order.order_no
        );

        Ok(SettlementResponse {
            order_id: order.id,
            order_no: order.order_no,
            session_id: order.session_id,
            parked_minutes,
            exit_time: order.exit_time,
            original_amount: order.amount + discount_amount,
            discount_amount,
            payable_amount: order.amount,
            pay_status: order.pay_status,
            rule_name: order.rule_name,
            discounts: items.into_iter().map(applied_from_item).collect(),
            replayed: true,
        })
    }

    /// Resolve pricing and discounts for a session at a given exit instant
    async fn compute(
        &self,
        session: &ParkingSession,
        exit_time: DateTime<Utc>,
        user_id: Option<i64>,
        promo_code: Option<&str>,
    ) -> AppResult<Computation> {
        let rule = self.rules.resolve_pricing(session.site_id, exit_time).await?;

        let minutes = session.parked_minutes(exit_time);
        let original_amount = rule.calculate_amount(minutes);

        let member = match user_id {
            Some(uid) => self.members.find_active_by_user(uid).await?,
            None => None,
        };

        // An unknown or expired code is skipped, not an error; the customer
        // still settles at the undiscounted price
        let promo = match promo_code {
            Some(code) => {
                let found = self.promos.find_effective(code, exit_time).await?;
                if found.is_none() {
                    warn!("Promo code {} not redeemable; settling without it", code);
                }
                found
            }
            None => None,
        };

        let outcome =
            DiscountEngine::apply(original_amount, member.as_ref(), promo.as_ref(), exit_time);

        Ok(Computation {
            rule_name: rule.rule_name,
            parked_minutes: minutes,
            original_amount,
            payable: outcome.payable,
            discounts: outcome.applied,
        })
    }

    /// The locked section of [`settle`](SettlementService::settle)
    async fn settle_locked(&self, request: &SettleRequest) -> AppResult<SettlementResponse> {
        // Second lookup inside the lock; a concurrent settlement may have
        // won while this one waited
        if let Some(existing) = self
            .order_repo
            .find_by_session_and_exit(request.session_id, request.exit_time)
            .await?
        {
            return self.replay(existing).await;
        }

        let session = self
            .session_repo
            .find_by_id(request.session_id)
            .await?
            .ok_or_else(|| AppError::SessionNotFound(request.session_id.to_string()))?;

        if request.exit_time < session.entry_time {
            return Err(AppError::InvalidInput(format!(
                "exit time {} precedes entry time {}",
                request.exit_time, session.entry_time
            )));
        }

        let computed = self
            .compute(
                &session,
                request.exit_time,
                request.user_id,
                request.promo_code.as_deref(),
            )
            .await?;

        let mut pay_status = PayStatus::Unpaid;
        let mut pay_channel = None;
        let mut pay_time = None;
        let mut wallet_debit = None;

        if computed.payable == 0 {
            pay_status = PayStatus::Paid;
            pay_channel = Some(CHANNEL_AUTO.to_string());
            pay_time = Some(request.exit_time);
        } else if request.pay_from_wallet {
            let uid = request.user_id.ok_or_else(|| {
                AppError::Validation("wallet payment requires a user".to_string())
            })?;
            wallet_debit = Some(WalletDebit {
                user_id: uid,
                amount: computed.payable,
            });
            pay_status = PayStatus::Paid;
            pay_channel = Some(CHANNEL_WALLET.to_string());
            pay_time = Some(Utc::now());
        }

        let order = ChargeOrder {
            order_no: generate_order_no(),
            session_id: session.id,
            user_id: request.user_id,
            amount: computed.payable,
            pay_status,
            pay_channel,
            pay_time,
            rule_name: computed.rule_name.clone(),
            exit_time: request.exit_time,
            ..Default::default()
        };

        let line_items: Vec<DiscountLineItem> = computed
            .discounts
            .iter()
            .map(|d| DiscountLineItem {
                source: d.source,
                promo_code: d.code.clone(),
                name: d.name.clone(),
                kind: d.kind,
                value: d.value,
                amount: d.amount,
                ..Default::default()
            })
            .collect();

        let persisted = match self
            .store
            .persist_settlement(&order, &line_items, wallet_debit)
            .await
        {
            Ok(persisted) => persisted,
            // A writer outside the lock window got there first; its order
            // is the settlement of record
            Err(AppError::Conflict(_)) => {
                let existing = self
                    .order_repo
                    .find_by_session_and_exit(request.session_id, request.exit_time)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "settlement conflict for session {} but no order found",
                            request.session_id
                        ))
                    })?;
                return self.replay(existing).await;
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = self
            .cache
            .evict(&keys::preview_key(session.id, request.exit_time))
            .await
        {
            warn!("Failed to evict preview for session {}: {}", session.id, e);
        }

        info!(
            "Settled session {}: order {} payable {} ({} discounts)",
            session.id,
            persisted.order_no,
            persisted.amount,
            computed.discounts.len()
        );

        Ok(SettlementResponse {
            order_id: persisted.id,
            order_no: persisted.order_no,
            session_id: session.id,
            parked_minutes: computed.parked_minutes,
            exit_time: request.exit_time,
            original_amount: computed.original_amount,
            discount_amount: computed.original_amount - computed.payable,
            payable_amount: computed.payable,
            pay_status: persisted.pay_status,
            rule_name: computed.rule_name,
            discounts: computed.discounts,
            replayed: false,
        })
    }
}

#[async_trait]
impl<C: EntryCache, L: LockManager> SettlementService for SettlementServiceImpl<C, L> {
    #[instrument(skip(self, request), fields(session_id = request.session_id))]
    async fn settle(&self, request: SettleRequest) -> AppResult<SettlementResponse> {
        // First lookup outside the lock; retries of an already-settled exit
        // replay without ever contending
        if let Some(existing) = self
            .order_repo
            .find_by_session_and_exit(request.session_id, request.exit_time)
            .await?
        {
            return self.replay(existing).await;
        }

        let resource = settle_lock_resource(request.session_id);
        self.lock
            .with_lock(
                &resource,
                SETTLEMENT_LOCK_TTL_SECS,
                SETTLEMENT_LOCK_WAIT,
                || self.settle_locked(&request),
            )
            .await
    }

    #[instrument(skip(self))]
    async fn preview(
        &self,
        session_id: i64,
        exit_time: DateTime<Utc>,
        user_id: Option<i64>,
        promo_code: Option<&str>,
    ) -> AppResult<SettlementPreview> {
        let plain = user_id.is_none() && promo_code.is_none();
        let key = keys::preview_key(session_id, exit_time);

        // Only the anonymous quote is cached; personalized quotes would
        // leak across users
        if plain {
            if let Ok(parkbill_cache::CacheOutcome::Hit(preview)) =
                self.cache.get_entry::<SettlementPreview>(&key).await
            {
                return Ok(preview);
            }
        }

        let session = self
            .session_repo
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))?;

        if session.status == SessionStatus::Finished {
            return Err(AppError::InvalidState(format!(
                "session {} is already finished",
                session_id
            )));
        }
        if exit_time < session.entry_time {
            return Err(AppError::InvalidInput(format!(
                "exit time {} precedes entry time {}",
                exit_time, session.entry_time
            )));
        }

        let computed = self.compute(&session, exit_time, user_id, promo_code).await?;

        let preview = SettlementPreview {
            session_id,
            parked_minutes: computed.parked_minutes,
            original_amount: computed.original_amount,
            discount_amount: computed.original_amount - computed.payable,
            payable_amount: computed.payable,
            rule_name: computed.rule_name,
            discounts: computed.discounts,
        };

        if plain {
            if let Err(e) = self.cache.put(&key, &preview, keys::PREVIEW_TTL_SECS).await {
                warn!("Failed to cache preview for session {}: {}", session_id, e);
            }
        }

        Ok(preview)
    }

    #[instrument(skip(self))]
    async fn confirm_payment(
        &self,
        order_id: i64,
        channel: &str,
    ) -> AppResult<SettlementResponse> {
        let order = self
            .order_repo
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| AppError::OrderNotFound(order_id.to_string()))?;

        if !order.can_confirm_payment() {
            return Err(AppError::InvalidState(format!(
                "order {} is {}, only unpaid orders can be confirmed",
                order.order_no, order.pay_status
            )));
        }

        let paid = self
            .order_repo
            .mark_paid(order_id, channel, Utc::now())
            .await?
            .ok_or_else(|| {
                // Lost a confirm race after the status check
                AppError::InvalidState(format!(
                    "order {} was confirmed concurrently",
                    order.order_no
                ))
            })?;

        // Close out the session; best-effort ordering, the order row is the
        // financial source of truth
        if let Some(mut session) = self.session_repo.find_by_id(paid.session_id).await? {
            session.paid_amount = Some(paid.amount);
            session.status = SessionStatus::Finished;
            self.session_repo.update(&session).await?;
        }

        info!("Order {} paid via {}", paid.order_no, channel);
        self.replay(paid).await.map(|mut r| {
            r.replayed = false;
            r
        })
    }
}

/// Generate a business order number: prefix, timestamp, random suffix.
///
/// Collisions within one second are possible; the order number's unique
/// index rejects them and the caller retries through the conflict path.
fn generate_order_no() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!(
        "{}{}{:06}",
        ORDER_NO_PREFIX,
        Utc::now().format("%Y%m%d%H%M%S"),
        suffix
    )
}

/// Internal result of pricing plus discounts
struct Computation {
    rule_name: String,
    parked_minutes: i64,
    original_amount: i64,
    payable: i64,
    discounts: Vec<AppliedDiscount>,
}

fn applied_from_item(item: DiscountLineItem) -> AppliedDiscount {
    AppliedDiscount {
        source: item.source,
        code: item.promo_code,
        name: item.name,
        kind: item.kind,
        value: item.value,
        amount: item.amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MapCache, MapLock};
    use chrono::Duration;
    use parkbill_core::models::{BillingRule, Membership, ParkingSite, PromotionalRule};
    use parkbill_core::traits::{
        MemberRepository, PromoRepository, Repository, RuleRepository, SiteRepository,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Session storage holding exactly one session
    struct OneSession {
        session: ParkingSession,
    }

    #[async_trait]
    impl Repository<ParkingSession, i64> for OneSession {
        async fn find_by_id(&self, id: i64) -> AppResult<Option<ParkingSession>> {
            Ok((id == self.session.id).then(|| self.session.clone()))
        }
        async fn find_all(&self, _limit: i64, _offset: i64) -> AppResult<Vec<ParkingSession>> {
            unimplemented!()
        }
        async fn count(&self) -> AppResult<i64> {
            unimplemented!()
        }
        async fn create(&self, _session: &ParkingSession) -> AppResult<ParkingSession> {
            unimplemented!()
        }
        async fn update(&self, session: &ParkingSession) -> AppResult<ParkingSession> {
            Ok(session.clone())
        }
        async fn delete(&self, _id: i64) -> AppResult<bool> {
            unimplemented!()
        }
    }

    #[async_trait]
    impl SessionRepository for OneSession {
        async fn find_active_by_plate(
            &self,
            _site_id: i64,
            _plate_number: &str,
        ) -> AppResult<Option<ParkingSession>> {
            unimplemented!()
        }
        async fn list_by_site(
            &self,
            _site_id: i64,
            _limit: i64,
            _offset: i64,
        ) -> AppResult<(Vec<ParkingSession>, i64)> {
            unimplemented!()
        }
    }

    /// In-memory order storage acting as both the read repository and the
    /// transactional writer; counts persisted settlements
    #[derive(Default)]
    struct OrderBook {
        orders: Mutex<Vec<ChargeOrder>>,
        items: Mutex<Vec<DiscountLineItem>>,
        persists: AtomicUsize,
    }

    #[async_trait]
    impl Repository<ChargeOrder, i64> for OrderBook {
        async fn find_by_id(&self, id: i64) -> AppResult<Option<ChargeOrder>> {
            Ok(self
                .orders
                .lock()
                .unwrap()
                .iter()
                .find(|o| o.id == id)
                .cloned())
        }
        async fn find_all(&self, _limit: i64, _offset: i64) -> AppResult<Vec<ChargeOrder>> {
            unimplemented!()
        }
        async fn count(&self) -> AppResult<i64> {
            unimplemented!()
        }
        async fn create(&self, _order: &ChargeOrder) -> AppResult<ChargeOrder> {
            unimplemented!()
        }
        async fn update(&self, _order: &ChargeOrder) -> AppResult<ChargeOrder> {
            unimplemented!()
        }
        async fn delete(&self, _id: i64) -> AppResult<bool> {
            unimplemented!()
        }
    }

    #[async_trait]
    impl OrderRepository for OrderBook {
        async fn find_by_order_no(&self, _order_no: &str) -> AppResult<Option<ChargeOrder>> {
            unimplemented!()
        }
        async fn find_by_session_and_exit(
            &self,
            session_id: i64,
            exit_time: DateTime<Utc>,
        ) -> AppResult<Option<ChargeOrder>> {
            Ok(self
                .orders
                .lock()
                .unwrap()
                .iter()
                .find(|o| o.session_id == session_id && o.exit_time == exit_time)
                .cloned())
        }
        async fn find_line_items(&self, order_id: i64) -> AppResult<Vec<DiscountLineItem>> {
            Ok(self
                .items
                .lock()
                .unwrap()
                .iter()
                .filter(|i| i.order_id == order_id)
                .cloned()
                .collect())
        }
        async fn mark_paid(
            &self,
            _id: i64,
            _channel: &str,
            _pay_time: DateTime<Utc>,
        ) -> AppResult<Option<ChargeOrder>> {
            unimplemented!()
        }
        async fn update_amount(&self, _id: i64, _amount: i64) -> AppResult<ChargeOrder> {
            unimplemented!()
        }
        async fn mark_refunded(&self, _id: i64) -> AppResult<ChargeOrder> {
            unimplemented!()
        }
    }

    #[async_trait]
    impl SettlementStore for OrderBook {
        async fn persist_settlement(
            &self,
            order: &ChargeOrder,
            line_items: &[DiscountLineItem],
            _wallet_debit: Option<WalletDebit>,
        ) -> AppResult<ChargeOrder> {
            let mut orders = self.orders.lock().unwrap();
            if orders
                .iter()
                .any(|o| o.session_id == order.session_id && o.exit_time == order.exit_time)
            {
                return Err(AppError::Conflict(format!(
                    "duplicate settlement for session {}",
                    order.session_id
                )));
            }

            self.persists.fetch_add(1, Ordering::SeqCst);
            let mut persisted = order.clone();
            persisted.id = orders.len() as i64 + 1;
            orders.push(persisted.clone());

            let mut items = self.items.lock().unwrap();
            for item in line_items {
                let mut item = item.clone();
                item.id = items.len() as i64 + 1;
                item.order_id = persisted.id;
                items.push(item);
            }
            Ok(persisted)
        }
    }

    /// Rule storage where every site resolves to the same rule
    struct OneRule {
        rule: BillingRule,
    }

    #[async_trait]
    impl Repository<BillingRule, i64> for OneRule {
        async fn find_by_id(&self, _id: i64) -> AppResult<Option<BillingRule>> {
            unimplemented!()
        }
        async fn find_all(&self, _limit: i64, _offset: i64) -> AppResult<Vec<BillingRule>> {
            unimplemented!()
        }
        async fn count(&self) -> AppResult<i64> {
            unimplemented!()
        }
        async fn create(&self, _rule: &BillingRule) -> AppResult<BillingRule> {
            unimplemented!()
        }
        async fn update(&self, _rule: &BillingRule) -> AppResult<BillingRule> {
            unimplemented!()
        }
        async fn delete(&self, _id: i64) -> AppResult<bool> {
            unimplemented!()
        }
    }

    #[async_trait]
    impl RuleRepository for OneRule {
        async fn find_applicable(
            &self,
            _site_id: i64,
            _on: chrono::NaiveDate,
        ) -> AppResult<Option<BillingRule>> {
            Ok(Some(self.rule.clone()))
        }
        async fn list_by_site(&self, _site_id: i64) -> AppResult<Vec<BillingRule>> {
            unimplemented!()
        }
        async fn update_status(&self, _id: i64, _status: i32) -> AppResult<BillingRule> {
            unimplemented!()
        }
    }

    /// Site storage that is never consulted
    struct NoSites;

    #[async_trait]
    impl Repository<ParkingSite, i64> for NoSites {
        async fn find_by_id(&self, _id: i64) -> AppResult<Option<ParkingSite>> {
            unimplemented!()
        }
        async fn find_all(&self, _limit: i64, _offset: i64) -> AppResult<Vec<ParkingSite>> {
            unimplemented!()
        }
        async fn count(&self) -> AppResult<i64> {
            unimplemented!()
        }
        async fn create(&self, _site: &ParkingSite) -> AppResult<ParkingSite> {
            unimplemented!()
        }
        async fn update(&self, _site: &ParkingSite) -> AppResult<ParkingSite> {
            unimplemented!()
        }
        async fn delete(&self, _id: i64) -> AppResult<bool> {
            unimplemented!()
        }
    }

    #[async_trait]
    impl SiteRepository for NoSites {
        async fn find_by_code(&self, _code: &str) -> AppResult<Option<ParkingSite>> {
            unimplemented!()
        }
    }

    /// Membership storage with no members
    struct NoMembers;

    #[async_trait]
    impl Repository<Membership, i64> for NoMembers {
        async fn find_by_id(&self, _id: i64) -> AppResult<Option<Membership>> {
            unimplemented!()
        }
        async fn find_all(&self, _limit: i64, _offset: i64) -> AppResult<Vec<Membership>> {
            unimplemented!()
        }
        async fn count(&self) -> AppResult<i64> {
            unimplemented!()
        }
        async fn create(&self, _m: &Membership) -> AppResult<Membership> {
            unimplemented!()
        }
        async fn update(&self, _m: &Membership) -> AppResult<Membership> {
            unimplemented!()
        }
        async fn delete(&self, _id: i64) -> AppResult<bool> {
            unimplemented!()
        }
    }

    #[async_trait]
    impl MemberRepository for NoMembers {
        async fn find_by_user(&self, _user_id: i64) -> AppResult<Option<Membership>> {
            Ok(None)
        }
        async fn update_status(&self, _id: i64, _status: i32) -> AppResult<Membership> {
            unimplemented!()
        }
    }

    /// Promo storage with no rules
    struct NoPromos;

    #[async_trait]
    impl Repository<PromotionalRule, i64> for NoPromos {
        async fn find_by_id(&self, _id: i64) -> AppResult<Option<PromotionalRule>> {
            unimplemented!()
        }
        async fn find_all(&self, _limit: i64, _offset: i64) -> AppResult<Vec<PromotionalRule>> {
            unimplemented!()
        }
        async fn count(&self) -> AppResult<i64> {
            unimplemented!()
        }
        async fn create(&self, _p: &PromotionalRule) -> AppResult<PromotionalRule> {
            unimplemented!()
        }
        async fn update(&self, _p: &PromotionalRule) -> AppResult<PromotionalRule> {
            unimplemented!()
        }
        async fn delete(&self, _id: i64) -> AppResult<bool> {
            unimplemented!()
        }
    }

    #[async_trait]
    impl PromoRepository for NoPromos {
        async fn find_by_code(&self, _code: &str) -> AppResult<Option<PromotionalRule>> {
            Ok(None)
        }
        async fn update_status(&self, _id: i64, _status: i32) -> AppResult<PromotionalRule> {
            unimplemented!()
        }
    }

    fn in_memory_service(
        session: ParkingSession,
        rule: BillingRule,
    ) -> (SettlementServiceImpl<MapCache, MapLock>, Arc<OrderBook>) {
        let cache = Arc::new(MapCache::default());
        let book = Arc::new(OrderBook::default());

        let rules = Arc::new(RuleService::new(
            Arc::new(OneRule { rule }),
            Arc::new(NoSites),
            cache.clone(),
        ));
        let members = Arc::new(MembershipService::new(Arc::new(NoMembers), cache.clone()));
        let promos = Arc::new(PromotionService::new(Arc::new(NoPromos), cache.clone()));

        let service = SettlementServiceImpl::new(
            Arc::new(OneSession { session }),
            book.clone(),
            book.clone(),
            rules,
            members,
            promos,
            MapLock::default(),
            cache,
        );
        (service, book)
    }

    fn open_session(id: i64, entry_time: DateTime<Utc>) -> ParkingSession {
        ParkingSession {
            id,
            site_id: 3,
            plate_number: "B-1234".to_string(),
            entry_time,
            ..Default::default()
        }
    }

    fn hourly_rule() -> BillingRule {
        BillingRule {
            site_id: 3,
            rule_name: "Standard hourly".to_string(),
            free_minutes: 30,
            unit_price: 500,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_settling_twice_replays_the_same_order() {
        let entry = Utc::now() - Duration::minutes(90);
        let exit = entry + Duration::minutes(90);
        let (service, book) = in_memory_service(open_session(7, entry), hourly_rule());

        let request = SettleRequest {
            session_id: 7,
            exit_time: exit,
            user_id: None,
            promo_code: None,
            pay_from_wallet: false,
        };

        let first = service.settle(request.clone()).await.unwrap();
        assert!(!first.replayed);
        assert_eq!(first.parked_minutes, 90);
        assert_eq!(first.exit_time, exit);
        // 60 chargeable minutes at 500 per hour
        assert_eq!(first.payable_amount, 500);
        assert_eq!(first.pay_status, PayStatus::Unpaid);

        let second = service.settle(request).await.unwrap();
        assert!(second.replayed);
        assert_eq!(second.order_no, first.order_no);
        assert_eq!(second.order_id, first.order_id);
        assert_eq!(second.payable_amount, first.payable_amount);
        assert_eq!(second.parked_minutes, 90);
        assert_eq!(second.exit_time, exit);

        // Exactly one order was ever written
        assert_eq!(book.persists.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_preview_rejects_backwards_exit_time() {
        let entry = Utc::now();
        let (service, _) = in_memory_service(open_session(7, entry), hourly_rule());

        let result = service
            .preview(7, entry - Duration::minutes(1), None, None)
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_order_no_format() {
        let order_no = generate_order_no();

        assert!(order_no.starts_with(ORDER_NO_PREFIX));
        // CO + 14 timestamp digits + 6 random digits
        assert_eq!(order_no.len(), 22);
        assert!(order_no[2..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_order_no_suffix_varies() {
        let numbers: std::collections::HashSet<String> = (0..50)
            .map(|_| generate_order_no())
            .collect();
        // 50 draws with a one-in-a-million suffix should not all collide
        assert!(numbers.len() > 1);
    }

    #[test]
    fn test_replay_reconstructs_original_amount() {
        // The arithmetic the replay path relies on: payable + discounts
        let items = [200_i64, 400];
        let payable = 400_i64;
        let original: i64 = payable + items.iter().sum::<i64>();
        assert_eq!(original, 1000);
    }
}
