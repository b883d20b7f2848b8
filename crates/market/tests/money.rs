//! Deposit, transfer and payout integration tests.
//!
//! Every gateway-backed flow must leave no local record unless the gateway
//! returned a transaction id, and must never call the gateway for a request
//! that fails local validation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley_market::{
    DepositRequest, FeeSchedule, GatewayAction, GatewayError, GatewayReceipt, GatewayRequest,
    HttpCallbackTransport, Market, MarketConfig, MarketError, NewQuery, NewResponse,
    PaymentGateway, SandboxGateway, WithdrawRequest,
};
use parley_storage::{
    AttributeRecord, MarketStorage, MemorySnapshot, MemoryStorage, MoneyEventKind,
    MoneyEventRecord, ProfileRecord, QueryFilter, QueryRecord, RatingRecord, ResponseRecord,
    StorageError,
};

// ──────────────────────────────────────────────
// Test fixtures
// ──────────────────────────────────────────────

fn market_with(
    gateway: Arc<SandboxGateway>,
    config: MarketConfig,
) -> Market<MemoryStorage> {
    Market::with_callback_transport(
        MemoryStorage::new(),
        gateway,
        HttpCallbackTransport::new(Duration::from_secs(1)),
        config,
    )
}

fn fee_free() -> MarketConfig {
    MarketConfig {
        fees: FeeSchedule::zero(),
        ..MarketConfig::default()
    }
}

fn deposit(amount: u64) -> DepositRequest {
    DepositRequest {
        amount,
        source_token: "tok_visa".to_string(),
        idempotency_key: None,
    }
}

async fn user_with_balance(market: &Market<MemoryStorage>, user_id: &str, amount: u64) {
    market.register_user(user_id).await.unwrap();
    market.deposit(user_id, deposit(amount)).await.unwrap();
    market
        .register_payout_account(user_id, &format!("acct_{user_id}"))
        .await
        .unwrap();
}

// ──────────────────────────────────────────────
// Deposits
// ──────────────────────────────────────────────

#[tokio::test]
async fn deposit_credits_net_of_fees() {
    let gateway = Arc::new(SandboxGateway::new());
    let market = market_with(gateway.clone(), MarketConfig::default());
    market.register_user("alice").await.unwrap();

    let movement = market.deposit("alice", deposit(1000)).await.unwrap();
    assert_eq!(movement.gross_amount, 1000);
    assert_eq!(movement.fees, 69);
    assert_eq!(movement.amount, 931);
    assert!(movement.external_ref.starts_with("sbx_charge_"));
    assert_eq!(movement.balance.balance, 931);

    let calls = gateway.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].action, GatewayAction::Charge);
    assert_eq!(calls[0].request.amount, 1000);
    assert_eq!(calls[0].request.counterparty, "tok_visa");

    let events = market.list_money_events("alice", None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, MoneyEventKind::Deposit);
    assert_eq!(events[0].amount, 931);
    assert_eq!(events[0].external_ref.as_deref(), Some(movement.external_ref.as_str()));
}

#[tokio::test]
async fn deposit_below_minimum_never_reaches_gateway() {
    let gateway = Arc::new(SandboxGateway::new());
    let market = market_with(gateway.clone(), MarketConfig::default());
    market.register_user("alice").await.unwrap();

    let err = market.deposit("alice", deposit(40)).await.unwrap_err();
    assert!(matches!(err, MarketError::AmountTooSmall { amount: 40, .. }));
    assert!(gateway.calls().await.is_empty());
    assert!(market
        .list_money_events("alice", None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn deposit_eaten_by_fees_rejected() {
    // 50 clears the minimum but leaves only 17 after fees; 31 would leave 0.
    let gateway = Arc::new(SandboxGateway::new());
    let config = MarketConfig {
        min_transfer_amount: 1,
        ..MarketConfig::default()
    };
    let market = market_with(gateway.clone(), config);
    market.register_user("alice").await.unwrap();

    let err = market.deposit("alice", deposit(31)).await.unwrap_err();
    assert!(matches!(err, MarketError::AmountTooSmall { .. }));
    assert!(gateway.calls().await.is_empty());

    let movement = market.deposit("alice", deposit(50)).await.unwrap();
    assert_eq!(movement.amount, 17);
}

#[tokio::test]
async fn declined_charge_records_nothing() {
    let gateway = Arc::new(SandboxGateway::decline_above(500));
    let market = market_with(gateway.clone(), fee_free());
    market.register_user("alice").await.unwrap();

    let err = market.deposit("alice", deposit(600)).await.unwrap_err();
    assert!(matches!(
        err,
        MarketError::Gateway(GatewayError::Declined { status: 402, .. })
    ));
    assert_eq!(market.balance("alice").await.unwrap().balance, 0);
    assert!(market
        .list_money_events("alice", None)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(market.metrics().snapshot().gateway_failures, 1);
}

// ──────────────────────────────────────────────
// Transfers and payouts
// ──────────────────────────────────────────────

#[tokio::test]
async fn payout_beyond_balance_never_reaches_gateway() {
    let gateway = Arc::new(SandboxGateway::new());
    let config = MarketConfig {
        min_transfer_amount: 1,
        ..fee_free()
    };
    let market = market_with(gateway.clone(), config);
    user_with_balance(&market, "alice", 30).await;
    let calls_before = gateway.calls().await.len();

    let err = market.payout("alice", WithdrawRequest::new(100)).await.unwrap_err();
    assert!(matches!(
        err,
        MarketError::InsufficientBalance {
            required: 100,
            available: 30,
            ..
        }
    ));
    assert_eq!(gateway.calls().await.len(), calls_before);

    let balance = market.balance("alice").await.unwrap();
    assert_eq!(balance.balance, 30);
    assert_eq!(balance.reserved, 0);
}

#[tokio::test]
async fn payout_settles_with_gateway_id() {
    let gateway = Arc::new(SandboxGateway::new());
    let market = market_with(gateway.clone(), fee_free());
    user_with_balance(&market, "alice", 200).await;

    let movement = market.payout("alice", WithdrawRequest::new(120)).await.unwrap();
    assert_eq!(movement.kind, MoneyEventKind::Payout);
    assert!(movement.external_ref.starts_with("sbx_payout_"));
    assert_eq!(movement.balance.balance, 80);
    assert_eq!(movement.balance.reserved, 0);

    let last = gateway.calls().await.pop().unwrap();
    assert_eq!(last.action, GatewayAction::Payout);
    assert_eq!(last.request.counterparty, "acct_alice");

    let payouts = market
        .list_money_events("alice", Some(MoneyEventKind::Payout))
        .await
        .unwrap();
    assert_eq!(payouts.len(), 1);
    assert_eq!(payouts[0].amount, 120);
    assert!(market.audit_balance("alice").await.unwrap().consistent);
}

#[tokio::test]
async fn transfer_requires_payout_account() {
    let gateway = Arc::new(SandboxGateway::new());
    let market = market_with(gateway.clone(), fee_free());
    market.register_user("alice").await.unwrap();
    market.deposit("alice", deposit(100)).await.unwrap();

    let err = market.transfer("alice", WithdrawRequest::new(60)).await.unwrap_err();
    assert!(matches!(err, MarketError::PayoutAccountMissing { .. }));
    assert_eq!(gateway.calls().await.len(), 1);
}

#[tokio::test]
async fn withdrawal_below_minimum_rejected() {
    let gateway = Arc::new(SandboxGateway::new());
    let market = market_with(gateway.clone(), fee_free());
    user_with_balance(&market, "alice", 100).await;

    let err = market.transfer("alice", WithdrawRequest::new(49)).await.unwrap_err();
    assert!(matches!(err, MarketError::AmountTooSmall { amount: 49, .. }));
    assert_eq!(gateway.calls().await.len(), 1);
}

#[tokio::test]
async fn failed_transfer_releases_reservation() {
    let gateway = Arc::new(SandboxGateway::new());
    let market = market_with(gateway.clone(), fee_free());
    user_with_balance(&market, "alice", 100).await;
    let events_before = market.list_money_events("alice", None).await.unwrap();

    gateway.set_offline(true);
    let err = market.transfer("alice", WithdrawRequest::new(60)).await.unwrap_err();
    assert!(matches!(
        err,
        MarketError::Gateway(GatewayError::Transport { .. })
    ));

    let balance = market.balance("alice").await.unwrap();
    assert_eq!(balance.balance, 100);
    assert_eq!(balance.reserved, 0);
    assert_eq!(balance.available, 100);
    assert_eq!(
        market.list_money_events("alice", None).await.unwrap(),
        events_before
    );
    assert_eq!(market.metrics().snapshot().gateway_failures, 1);

    // The caller may retry once the gateway is back.
    gateway.set_offline(false);
    let movement = market.transfer("alice", WithdrawRequest::new(60)).await.unwrap();
    assert!(movement.external_ref.starts_with("sbx_transfer_"));
    assert_eq!(movement.balance.balance, 40);
}

#[tokio::test]
async fn unkeyed_withdrawals_get_distinct_idempotency_keys() {
    let gateway = Arc::new(SandboxGateway::new());
    let market = market_with(gateway.clone(), fee_free());
    user_with_balance(&market, "alice", 200).await;
    market.payout("alice", WithdrawRequest::new(50)).await.unwrap();
    market.payout("alice", WithdrawRequest::new(50)).await.unwrap();

    let calls = gateway.calls().await;
    let mut keys: Vec<_> = calls.iter().map(|c| c.request.idempotency_key.clone()).collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), calls.len());
}

#[tokio::test]
async fn payout_retried_after_lost_reply_is_paid_once() {
    let gateway = Arc::new(SandboxGateway::new());
    let market = market_with(gateway.clone(), fee_free());
    user_with_balance(&market, "alice", 200).await;
    let calls_before = gateway.calls().await.len();

    // The processor pays out but the reply never arrives.
    gateway.set_lose_replies(true);
    let err = market
        .payout("alice", WithdrawRequest::keyed(60, "payout-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::Gateway(GatewayError::Transport { .. })));
    assert_eq!(market.balance("alice").await.unwrap().reserved, 0);

    gateway.set_lose_replies(false);
    let first = market
        .payout("alice", WithdrawRequest::keyed(60, "payout-1"))
        .await
        .unwrap();
    assert_eq!(first.balance.balance, 140);

    // A second retry after success replays without moving money again.
    let again = market
        .payout("alice", WithdrawRequest::keyed(60, "payout-1"))
        .await
        .unwrap();
    assert_eq!(again.external_ref, first.external_ref);
    assert_eq!(again.amount, 60);
    assert_eq!(again.balance.balance, 140);
    assert_eq!(again.balance.reserved, 0);

    let calls = gateway.calls().await.split_off(calls_before);
    assert_eq!(calls.len(), 3);
    for call in &calls {
        assert_eq!(call.request.idempotency_key, "payout-1");
        assert_eq!(call.external_id.as_deref(), Some(first.external_ref.as_str()));
    }
    let payouts = market
        .list_money_events("alice", Some(MoneyEventKind::Payout))
        .await
        .unwrap();
    assert_eq!(payouts.len(), 1);
    assert!(market.audit_balance("alice").await.unwrap().consistent);
}

#[tokio::test]
async fn deposit_retried_with_same_key_credits_once() {
    let gateway = Arc::new(SandboxGateway::new());
    let market = market_with(gateway.clone(), fee_free());
    market.register_user("alice").await.unwrap();
    let keyed = || DepositRequest {
        idempotency_key: Some("dep-1".to_string()),
        ..deposit(500)
    };

    let first = market.deposit("alice", keyed()).await.unwrap();
    let second = market.deposit("alice", keyed()).await.unwrap();
    assert_eq!(second.external_ref, first.external_ref);
    assert_eq!(second.amount, 500);
    assert_eq!(second.balance.balance, 500);

    let calls = gateway.calls().await;
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.request.idempotency_key == "dep-1"));
    let deposits = market
        .list_money_events("alice", Some(MoneyEventKind::Deposit))
        .await
        .unwrap();
    assert_eq!(deposits.len(), 1);
}

#[tokio::test]
async fn blank_idempotency_key_rejected_before_gateway() {
    let gateway = Arc::new(SandboxGateway::new());
    let market = market_with(gateway.clone(), fee_free());
    user_with_balance(&market, "alice", 200).await;
    let calls_before = gateway.calls().await.len();

    let err = market
        .payout("alice", WithdrawRequest::keyed(60, "  "))
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::InvalidInput(_)));
    let err = market
        .deposit(
            "alice",
            DepositRequest {
                idempotency_key: Some(String::new()),
                ..deposit(100)
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::InvalidInput(_)));
    assert_eq!(gateway.calls().await.len(), calls_before);
}

#[tokio::test]
async fn earnings_can_be_paid_out() {
    let gateway = Arc::new(SandboxGateway::new());
    let market = market_with(gateway.clone(), fee_free());
    user_with_balance(&market, "alice", 100).await;
    market.register_user("bob").await.unwrap();
    market.register_payout_account("bob", "acct_bob").await.unwrap();

    let query = market
        .create_query(
            "alice",
            NewQuery {
                text: "Name a prime above 50".to_string(),
                regex: Some(r"\d+".to_string()),
                bid: Some(60),
                callback_url: None,
            },
        )
        .await
        .unwrap();
    market
        .create_response(
            "bob",
            NewResponse {
                query_id: query.id,
                text: "53".to_string(),
            },
        )
        .await
        .unwrap();

    let movement = market.payout("bob", WithdrawRequest::new(60)).await.unwrap();
    assert_eq!(movement.balance.balance, 0);

    let kinds: Vec<MoneyEventKind> = market
        .list_money_events("bob", None)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(kinds, vec![MoneyEventKind::Earning, MoneyEventKind::Payout]);
    assert!(market.audit_balance("bob").await.unwrap().consistent);
    assert!(market.storage().get_profile("bob").await.unwrap().reserved == 0);
}

// ──────────────────────────────────────────────
// Local write failures after the gateway succeeded
// ──────────────────────────────────────────────

#[derive(Default)]
struct Faults {
    fail_begin: AtomicBool,
    fail_commit: AtomicBool,
}

#[derive(Clone, Copy)]
enum Fault {
    Begin,
    Commit,
}

impl Faults {
    fn arm(&self, fault: Fault) {
        match fault {
            Fault::Begin => self.fail_begin.store(true, Ordering::SeqCst),
            Fault::Commit => self.fail_commit.store(true, Ordering::SeqCst),
        }
    }
}

/// `MemoryStorage` that fails snapshot begin or commit once armed.
struct FlakyStorage {
    inner: MemoryStorage,
    faults: Arc<Faults>,
}

fn injected(stage: &str) -> StorageError {
    StorageError::Backend(format!("injected {stage} failure"))
}

#[async_trait]
impl MarketStorage for FlakyStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        if self.faults.fail_begin.load(Ordering::SeqCst) {
            return Err(injected("begin"));
        }
        self.inner.begin_snapshot().await
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        if self.faults.fail_commit.load(Ordering::SeqCst) {
            self.inner.abort_snapshot(snapshot).await?;
            return Err(injected("commit"));
        }
        self.inner.commit_snapshot(snapshot).await
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        self.inner.abort_snapshot(snapshot).await
    }

    async fn insert_profile(
        &self,
        snapshot: &mut MemorySnapshot,
        record: ProfileRecord,
    ) -> Result<(), StorageError> {
        self.inner.insert_profile(snapshot, record).await
    }

    async fn get_profile_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        user_id: &str,
    ) -> Result<ProfileRecord, StorageError> {
        self.inner.get_profile_for_update(snapshot, user_id).await
    }

    async fn update_profile(
        &self,
        snapshot: &mut MemorySnapshot,
        record: ProfileRecord,
    ) -> Result<(), StorageError> {
        self.inner.update_profile(snapshot, record).await
    }

    async fn insert_query(
        &self,
        snapshot: &mut MemorySnapshot,
        record: QueryRecord,
    ) -> Result<(), StorageError> {
        self.inner.insert_query(snapshot, record).await
    }

    async fn get_query_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        query_id: &str,
    ) -> Result<QueryRecord, StorageError> {
        self.inner.get_query_for_update(snapshot, query_id).await
    }

    async fn list_queries_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        filter: &QueryFilter,
    ) -> Result<Vec<QueryRecord>, StorageError> {
        self.inner.list_queries_for_update(snapshot, filter).await
    }

    async fn update_query(
        &self,
        snapshot: &mut MemorySnapshot,
        record: QueryRecord,
    ) -> Result<(), StorageError> {
        self.inner.update_query(snapshot, record).await
    }

    async fn insert_response(
        &self,
        snapshot: &mut MemorySnapshot,
        record: ResponseRecord,
    ) -> Result<(), StorageError> {
        self.inner.insert_response(snapshot, record).await
    }

    async fn get_response_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        response_id: &str,
    ) -> Result<ResponseRecord, StorageError> {
        self.inner.get_response_for_update(snapshot, response_id).await
    }

    async fn insert_rating(
        &self,
        snapshot: &mut MemorySnapshot,
        record: RatingRecord,
    ) -> Result<(), StorageError> {
        self.inner.insert_rating(snapshot, record).await
    }

    async fn insert_money_event(
        &self,
        snapshot: &mut MemorySnapshot,
        record: MoneyEventRecord,
    ) -> Result<(), StorageError> {
        self.inner.insert_money_event(snapshot, record).await
    }

    async fn upsert_attribute(
        &self,
        snapshot: &mut MemorySnapshot,
        record: AttributeRecord,
    ) -> Result<AttributeRecord, StorageError> {
        self.inner.upsert_attribute(snapshot, record).await
    }

    async fn delete_attribute(
        &self,
        snapshot: &mut MemorySnapshot,
        user_id: &str,
        key: &str,
    ) -> Result<(), StorageError> {
        self.inner.delete_attribute(snapshot, user_id, key).await
    }

    async fn get_profile(&self, user_id: &str) -> Result<ProfileRecord, StorageError> {
        self.inner.get_profile(user_id).await
    }

    async fn get_query(&self, query_id: &str) -> Result<QueryRecord, StorageError> {
        self.inner.get_query(query_id).await
    }

    async fn get_response(&self, response_id: &str) -> Result<ResponseRecord, StorageError> {
        self.inner.get_response(response_id).await
    }

    async fn get_rating_for_response(
        &self,
        response_id: &str,
    ) -> Result<Option<RatingRecord>, StorageError> {
        self.inner.get_rating_for_response(response_id).await
    }

    async fn list_queries(&self, filter: &QueryFilter) -> Result<Vec<QueryRecord>, StorageError> {
        self.inner.list_queries(filter).await
    }

    async fn list_responses(
        &self,
        owner_id: Option<&str>,
    ) -> Result<Vec<ResponseRecord>, StorageError> {
        self.inner.list_responses(owner_id).await
    }

    async fn list_money_events(
        &self,
        user_id: &str,
        kind: Option<MoneyEventKind>,
    ) -> Result<Vec<MoneyEventRecord>, StorageError> {
        self.inner.list_money_events(user_id, kind).await
    }

    async fn list_attributes(&self, user_id: &str) -> Result<Vec<AttributeRecord>, StorageError> {
        self.inner.list_attributes(user_id).await
    }
}

/// Sandbox gateway that arms a storage fault right after a successful call.
struct TrippingGateway {
    inner: Arc<SandboxGateway>,
    faults: Arc<Faults>,
    trip: Fault,
    armed: AtomicBool,
}

impl TrippingGateway {
    fn after(
        &self,
        result: Result<GatewayReceipt, GatewayError>,
    ) -> Result<GatewayReceipt, GatewayError> {
        if result.is_ok() && self.armed.load(Ordering::SeqCst) {
            self.faults.arm(self.trip);
        }
        result
    }
}

#[async_trait]
impl PaymentGateway for TrippingGateway {
    async fn charge(&self, request: GatewayRequest) -> Result<GatewayReceipt, GatewayError> {
        let result = self.inner.charge(request).await;
        self.after(result)
    }

    async fn transfer(&self, request: GatewayRequest) -> Result<GatewayReceipt, GatewayError> {
        let result = self.inner.transfer(request).await;
        self.after(result)
    }

    async fn payout(&self, request: GatewayRequest) -> Result<GatewayReceipt, GatewayError> {
        let result = self.inner.payout(request).await;
        self.after(result)
    }

    fn gateway_id(&self) -> &str {
        self.inner.gateway_id()
    }
}

struct FlakyMarket {
    market: Market<FlakyStorage>,
    sandbox: Arc<SandboxGateway>,
    tripping: Arc<TrippingGateway>,
}

impl FlakyMarket {
    fn new(trip: Fault) -> Self {
        let faults = Arc::new(Faults::default());
        let sandbox = Arc::new(SandboxGateway::new());
        let tripping = Arc::new(TrippingGateway {
            inner: sandbox.clone(),
            faults: faults.clone(),
            trip,
            armed: AtomicBool::new(false),
        });
        let storage = FlakyStorage {
            inner: MemoryStorage::new(),
            faults,
        };
        let market = Market::with_callback_transport(
            storage,
            tripping.clone(),
            HttpCallbackTransport::new(Duration::from_secs(1)),
            fee_free(),
        );
        FlakyMarket {
            market,
            sandbox,
            tripping,
        }
    }

    /// Storage fails from the next successful gateway call on.
    fn fail_storage_after_gateway(&self) {
        self.tripping.armed.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn charge_without_local_write_surfaces_storage_error() {
    let flaky = FlakyMarket::new(Fault::Commit);
    let market = &flaky.market;
    market.register_user("alice").await.unwrap();
    flaky.fail_storage_after_gateway();

    let err = market.deposit("alice", deposit(1000)).await.unwrap_err();
    assert!(matches!(err, MarketError::Storage(StorageError::Backend(_))));

    let balance = market.balance("alice").await.unwrap();
    assert_eq!(balance.balance, 0);
    assert_eq!(balance.reserved, 0);
    assert!(market.list_money_events("alice", None).await.unwrap().is_empty());

    let calls = flaky.sandbox.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].action, GatewayAction::Charge);
    assert!(calls[0].external_id.is_some());
}

#[tokio::test]
async fn payout_without_settlement_keeps_funds_held() {
    let flaky = FlakyMarket::new(Fault::Begin);
    let market = &flaky.market;
    market.register_user("alice").await.unwrap();
    market.deposit("alice", deposit(200)).await.unwrap();
    market
        .register_payout_account("alice", "acct_alice")
        .await
        .unwrap();
    flaky.fail_storage_after_gateway();

    let err = market
        .payout("alice", WithdrawRequest::new(120))
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::Storage(StorageError::Backend(_))));

    // Paid at the gateway but not settled: the reservation stays held for
    // reconciliation instead of being released back to spendable funds.
    let balance = market.balance("alice").await.unwrap();
    assert_eq!(balance.balance, 200);
    assert_eq!(balance.reserved, 120);
    assert_eq!(balance.available, 80);
    assert!(market
        .list_money_events("alice", Some(MoneyEventKind::Payout))
        .await
        .unwrap()
        .is_empty());

    let payouts: Vec<_> = flaky
        .sandbox
        .calls()
        .await
        .into_iter()
        .filter(|c| c.action == GatewayAction::Payout)
        .collect();
    assert_eq!(payouts.len(), 1);
    assert!(payouts[0].external_id.is_some());
}
