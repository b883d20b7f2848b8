//! The market service.
//!
//! [`Market`] ties storage, the payment gateway, the callback notifier and
//! the configuration together. Each public method is one use case; it opens
//! at most one storage snapshot at a time, and never holds a snapshot while
//! waiting on the payment gateway.

use std::sync::Arc;
use std::time::Duration;

use parley_storage::{
    AttributeRecord, MarketStorage, MoneyEventKind, MoneyEventRecord, ProfileRecord, QueryFilter,
    QueryRecord, RatingRecord, ResponseRecord, StorageError,
};
use tracing::{debug, error, info, instrument, warn};

use crate::config::MarketConfig;
use crate::error::MarketError;
use crate::gateway::{GatewayAction, GatewayRequest, PaymentGateway};
use crate::ledger::{self, Balance, LedgerAudit, Posting};
use crate::lifecycle;
use crate::metrics::MarketMetrics;
use crate::notify::{CallbackTransport, HttpCallbackTransport, Notifier, ResponseNotification};
use crate::operation::{
    AttributeInput, DepositRequest, MoneyMovement, NewQuery, NewRating, NewResponse, Operation,
    Outcome, ProfileView, QueryListing, WithdrawRequest,
};
use crate::pool::{self, PoolFilter};
use crate::{new_id, now_rfc3339};

pub struct Market<S: MarketStorage> {
    storage: Arc<S>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Notifier,
    config: MarketConfig,
    metrics: Arc<MarketMetrics>,
}

impl<S: MarketStorage> Clone for Market<S> {
    fn clone(&self) -> Self {
        Market {
            storage: self.storage.clone(),
            gateway: self.gateway.clone(),
            notifier: self.notifier.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: MarketStorage> Market<S> {
    /// Build a market that delivers callbacks over HTTP.
    ///
    /// Must be called from within a tokio runtime: the callback worker is
    /// spawned immediately.
    pub fn new(storage: S, gateway: Arc<dyn PaymentGateway>, config: MarketConfig) -> Self {
        let transport =
            HttpCallbackTransport::new(Duration::from_secs(config.notify.timeout_secs));
        Self::with_callback_transport(storage, gateway, transport, config)
    }

    pub fn with_callback_transport<T: CallbackTransport>(
        storage: S,
        gateway: Arc<dyn PaymentGateway>,
        transport: T,
        config: MarketConfig,
    ) -> Self {
        let metrics = Arc::new(MarketMetrics::new());
        let notifier = Notifier::spawn(transport, metrics.clone());
        Market {
            storage: Arc::new(storage),
            gateway,
            notifier,
            config,
            metrics,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MarketMetrics {
        &self.metrics
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn gateway_id(&self) -> &str {
        self.gateway.gateway_id()
    }

    // ── Dispatch ──────────────────────────────────────────────────────────

    /// Run `operation` on behalf of `actor`.
    pub async fn execute(&self, actor: &str, operation: Operation) -> Result<Outcome, MarketError> {
        debug!(actor, op = operation.name(), "executing operation");
        match operation {
            Operation::RegisterUser => self.register_user(actor).await.map(Outcome::Profile),
            Operation::GetProfile => self.profile(actor).await.map(Outcome::Profile),
            Operation::RegisterPayoutAccount(input) => self
                .register_payout_account(actor, &input.account)
                .await
                .map(Outcome::Profile),
            Operation::CreateQuery(input) => {
                self.create_query(actor, input).await.map(Outcome::Query)
            }
            Operation::ServeQuery(filter) => {
                self.serve_query(actor, &filter).await.map(Outcome::Query)
            }
            Operation::CreateResponse(input) => self
                .create_response(actor, input)
                .await
                .map(Outcome::Response),
            Operation::CreateRating(input) => {
                self.create_rating(actor, input).await.map(Outcome::Rating)
            }
            Operation::Deposit(input) => self.deposit(actor, input).await.map(Outcome::Money),
            Operation::Transfer(input) => self.transfer(actor, input).await.map(Outcome::Money),
            Operation::Payout(input) => self.payout(actor, input).await.map(Outcome::Money),
            Operation::ListQueries(listing) => {
                self.list_queries(actor, &listing).await.map(Outcome::Queries)
            }
            Operation::ListResponses => self.list_responses(actor).await.map(Outcome::Responses),
            Operation::ListMoneyEvents(listing) => self
                .list_money_events(actor, listing.kind)
                .await
                .map(Outcome::MoneyEvents),
            Operation::SetAttribute(input) => {
                self.set_attribute(actor, input).await.map(Outcome::Attribute)
            }
            Operation::ListAttributes => {
                self.list_attributes(actor).await.map(Outcome::Attributes)
            }
            Operation::DeleteAttribute(input) => {
                self.delete_attribute(actor, &input.key).await?;
                Ok(Outcome::Deleted(input))
            }
            Operation::AuditBalance => self.audit_balance(actor).await.map(Outcome::Audit),
        }
    }

    // ── Users ─────────────────────────────────────────────────────────────

    /// Create the profile for a newly authenticated user.
    #[instrument(skip(self))]
    pub async fn register_user(&self, user_id: &str) -> Result<ProfileView, MarketError> {
        if user_id.trim().is_empty() {
            return Err(MarketError::InvalidInput(
                "user id must not be empty".to_string(),
            ));
        }
        let profile = ProfileRecord {
            user_id: user_id.to_string(),
            balance: 0,
            reserved: 0,
            payout_account: None,
            created_at: now_rfc3339(),
        };

        let mut snapshot = self.storage.begin_snapshot().await?;
        let result = self
            .storage
            .insert_profile(&mut snapshot, profile.clone())
            .await
            .map_err(|e| match e {
                StorageError::AlreadyExists { .. } => MarketError::AlreadyRegistered {
                    user_id: user_id.to_string(),
                },
                other => other.into(),
            });
        self.finish(snapshot, result).await?;

        info!(user_id, "user registered");
        Ok(profile.into())
    }

    pub async fn profile(&self, user_id: &str) -> Result<ProfileView, MarketError> {
        Ok(self.storage.get_profile(user_id).await?.into())
    }

    pub async fn balance(&self, user_id: &str) -> Result<Balance, MarketError> {
        ledger::get_balance(self.storage.as_ref(), user_id).await
    }

    /// Record where transfers and payouts for this user are sent.
    #[instrument(skip(self))]
    pub async fn register_payout_account(
        &self,
        user_id: &str,
        account: &str,
    ) -> Result<ProfileView, MarketError> {
        if account.trim().is_empty() {
            return Err(MarketError::InvalidInput(
                "payout account must not be empty".to_string(),
            ));
        }
        let mut snapshot = self.storage.begin_snapshot().await?;
        let result = async {
            let mut profile = self
                .storage
                .get_profile_for_update(&mut snapshot, user_id)
                .await?;
            profile.payout_account = Some(account.to_string());
            self.storage
                .update_profile(&mut snapshot, profile.clone())
                .await?;
            Ok::<_, MarketError>(profile)
        }
        .await;
        let profile = self.finish(snapshot, result).await?;

        info!(user_id, "payout account registered");
        Ok(profile.into())
    }

    // ── Queries and responses ─────────────────────────────────────────────

    /// Post a query and debit its bid from the owner.
    pub async fn create_query(
        &self,
        user_id: &str,
        input: NewQuery,
    ) -> Result<QueryRecord, MarketError> {
        self.require_user(user_id).await?;
        let mut snapshot = self.storage.begin_snapshot().await?;
        let result = lifecycle::create_query(
            self.storage.as_ref(),
            &mut snapshot,
            user_id,
            input,
            &self.config,
        )
        .await;
        let query = self.finish(snapshot, result).await?;

        info!(
            user_id,
            query_id = %query.id,
            bid = query.bid,
            "query created"
        );
        Ok(query)
    }

    /// Serve a random open query to a responder.
    pub async fn serve_query(
        &self,
        user_id: &str,
        filter: &PoolFilter,
    ) -> Result<QueryRecord, MarketError> {
        self.require_user(user_id).await?;
        let mut snapshot = self.storage.begin_snapshot().await?;
        let result =
            pool::next_unclaimed(self.storage.as_ref(), &mut snapshot, user_id, filter).await;
        let query = self.finish(snapshot, result).await?;

        debug!(user_id, query_id = %query.id, "query served");
        Ok(query)
    }

    /// Submit a response. The first valid response to a query wins and earns
    /// its bid; later ones fail with `AlreadyAnswered`.
    pub async fn create_response(
        &self,
        user_id: &str,
        input: NewResponse,
    ) -> Result<ResponseRecord, MarketError> {
        self.require_user(user_id).await?;
        let query_id = input.query_id.clone();
        let mut snapshot = self.storage.begin_snapshot().await?;
        let result =
            lifecycle::create_response(self.storage.as_ref(), &mut snapshot, user_id, input).await;
        let (response, query) = match self.finish(snapshot, result).await {
            Ok(accepted) => accepted,
            Err(e) if e.is_race_loss() => {
                self.metrics.record_race_lost();
                debug!(user_id, query_id = %query_id, "response lost answer race");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        info!(
            user_id,
            query_id = %query.id,
            response_id = %response.id,
            earning = query.bid,
            "response accepted"
        );

        if let Some(url) = &query.callback_url {
            self.notifier.dispatch(
                url.clone(),
                ResponseNotification {
                    query_id: query.id.clone(),
                    response_id: response.id.clone(),
                    user_id: response.owner_id.clone(),
                    text: response.text.clone(),
                },
            );
        }
        Ok(response)
    }

    /// Rate a response to one of the caller's queries.
    pub async fn create_rating(
        &self,
        user_id: &str,
        input: NewRating,
    ) -> Result<RatingRecord, MarketError> {
        self.require_user(user_id).await?;
        let mut snapshot = self.storage.begin_snapshot().await?;
        let result =
            lifecycle::create_rating(self.storage.as_ref(), &mut snapshot, user_id, input).await;
        let rating = self.finish(snapshot, result).await?;

        info!(
            user_id,
            response_id = %rating.response_id,
            satisfactory = rating.satisfactory,
            "response rated"
        );
        Ok(rating)
    }

    pub async fn list_queries(
        &self,
        user_id: &str,
        listing: &QueryListing,
    ) -> Result<Vec<QueryRecord>, MarketError> {
        self.require_user(user_id).await?;
        let filter = QueryFilter {
            owner_id: Some(user_id.to_string()),
            open: listing.open,
            min_bid: None,
        };
        Ok(self.storage.list_queries(&filter).await?)
    }

    pub async fn list_responses(&self, user_id: &str) -> Result<Vec<ResponseRecord>, MarketError> {
        self.require_user(user_id).await?;
        Ok(self.storage.list_responses(Some(user_id)).await?)
    }

    /// Rating attached to a response, if the query owner has rated it.
    pub async fn rating_for(
        &self,
        user_id: &str,
        response_id: &str,
    ) -> Result<Option<RatingRecord>, MarketError> {
        self.require_user(user_id).await?;
        self.storage.get_response(response_id).await?;
        Ok(self.storage.get_rating_for_response(response_id).await?)
    }

    // ── Money ─────────────────────────────────────────────────────────────

    /// Charge a payment source and credit the amount net of fees.
    #[instrument(skip(self, input), fields(amount = input.amount))]
    pub async fn deposit(
        &self,
        user_id: &str,
        input: DepositRequest,
    ) -> Result<MoneyMovement, MarketError> {
        self.require_user(user_id).await?;
        if input.source_token.trim().is_empty() {
            return Err(MarketError::InvalidInput(
                "source token must not be empty".to_string(),
            ));
        }
        let idempotency_key = idempotency_key(input.idempotency_key)?;
        self.check_minimum(input.amount)?;
        let net = self.config.fees.net_of_fees(input.amount)?;

        let request = GatewayRequest {
            amount: input.amount,
            currency: self.config.currency.clone(),
            counterparty: input.source_token,
            idempotency_key,
        };
        let receipt = match self.gateway.charge(request).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.metrics.record_gateway_failure();
                warn!(user_id, error = %e, "deposit charge failed");
                return Err(e.into());
            }
        };

        let recorded = async {
            let mut snapshot = self.storage.begin_snapshot().await?;
            let result = async {
                let kind = MoneyEventKind::Deposit;
                if let Some(event) = self
                    .recorded_event(user_id, kind, &receipt.external_id)
                    .await?
                {
                    let profile = self
                        .storage
                        .get_profile_for_update(&mut snapshot, user_id)
                        .await?;
                    return Ok((event.amount, profile, true));
                }
                let posting = Posting::external(kind, net, &receipt.external_id);
                let profile =
                    ledger::credit(self.storage.as_ref(), &mut snapshot, user_id, posting).await?;
                Ok::<_, MarketError>((net, profile, false))
            }
            .await;
            self.finish(snapshot, result).await
        }
        .await;
        let (credited, profile, replayed) = match recorded {
            Ok(recorded) => recorded,
            Err(e) => {
                error!(
                    user_id,
                    external_ref = %receipt.external_id,
                    gross = input.amount,
                    net,
                    error = %e,
                    "charge succeeded but deposit was not recorded; needs reconciliation"
                );
                return Err(e);
            }
        };

        if replayed {
            info!(user_id, external_ref = %receipt.external_id, "deposit already recorded");
        } else {
            info!(
                user_id,
                external_ref = %receipt.external_id,
                gross = input.amount,
                net,
                "deposit recorded"
            );
        }
        Ok(MoneyMovement {
            kind: MoneyEventKind::Deposit,
            gross_amount: input.amount,
            fees: input.amount.saturating_sub(credited),
            amount: credited,
            external_ref: receipt.external_id,
            balance: Balance::from(&profile),
        })
    }

    /// Move funds to the user's connected account.
    pub async fn transfer(
        &self,
        user_id: &str,
        request: WithdrawRequest,
    ) -> Result<MoneyMovement, MarketError> {
        self.withdraw(user_id, request, GatewayAction::Transfer, MoneyEventKind::Transfer)
            .await
    }

    /// Pay funds out to the user's registered destination.
    pub async fn payout(
        &self,
        user_id: &str,
        request: WithdrawRequest,
    ) -> Result<MoneyMovement, MarketError> {
        self.withdraw(user_id, request, GatewayAction::Payout, MoneyEventKind::Payout)
            .await
    }

    /// Reserve, call the gateway with no snapshot held, then settle or release.
    #[instrument(skip(self, request), fields(amount = request.amount))]
    async fn withdraw(
        &self,
        user_id: &str,
        request: WithdrawRequest,
        action: GatewayAction,
        kind: MoneyEventKind,
    ) -> Result<MoneyMovement, MarketError> {
        let amount = request.amount;
        self.check_minimum(amount)?;
        let idempotency_key = idempotency_key(request.idempotency_key)?;

        let mut snapshot = self.storage.begin_snapshot().await?;
        let result = async {
            let profile = self
                .storage
                .get_profile_for_update(&mut snapshot, user_id)
                .await?;
            let account = profile
                .payout_account
                .ok_or_else(|| MarketError::PayoutAccountMissing {
                    user_id: user_id.to_string(),
                })?;
            ledger::reserve(self.storage.as_ref(), &mut snapshot, user_id, amount).await?;
            Ok::<_, MarketError>(account)
        }
        .await;
        let account = self.finish(snapshot, result).await?;

        let request = GatewayRequest {
            amount,
            currency: self.config.currency.clone(),
            counterparty: account,
            idempotency_key,
        };
        let receipt = match self.gateway.execute(action, request).await {
            Ok(receipt) => receipt,
            Err(gateway_error) => {
                self.metrics.record_gateway_failure();
                warn!(
                    user_id,
                    %action,
                    amount,
                    error = %gateway_error,
                    "gateway call failed; releasing reservation"
                );
                let released = async {
                    let mut snapshot = self.storage.begin_snapshot().await?;
                    let result =
                        ledger::release(self.storage.as_ref(), &mut snapshot, user_id, amount)
                            .await;
                    self.finish(snapshot, result).await
                }
                .await;
                if let Err(e) = released {
                    error!(
                        user_id,
                        %action,
                        amount,
                        error = %e,
                        "reservation could not be released; needs reconciliation"
                    );
                }
                return Err(gateway_error.into());
            }
        };

        let settled = async {
            let mut snapshot = self.storage.begin_snapshot().await?;
            let result = async {
                if let Some(event) = self
                    .recorded_event(user_id, kind, &receipt.external_id)
                    .await?
                {
                    let profile =
                        ledger::release(self.storage.as_ref(), &mut snapshot, user_id, amount)
                            .await?;
                    return Ok((event.amount, profile, true));
                }
                let posting = Posting::external(kind, amount, &receipt.external_id);
                let profile =
                    ledger::settle(self.storage.as_ref(), &mut snapshot, user_id, posting).await?;
                Ok::<_, MarketError>((amount, profile, false))
            }
            .await;
            self.finish(snapshot, result).await
        }
        .await;
        let (moved, profile, replayed) = match settled {
            Ok(settled) => settled,
            Err(e) => {
                error!(
                    user_id,
                    %action,
                    external_ref = %receipt.external_id,
                    amount,
                    error = %e,
                    "gateway call succeeded but was not settled; needs reconciliation"
                );
                return Err(e);
            }
        };

        if replayed {
            info!(
                user_id,
                %action,
                external_ref = %receipt.external_id,
                "withdrawal already settled"
            );
        } else {
            info!(
                user_id,
                %action,
                external_ref = %receipt.external_id,
                amount,
                "withdrawal settled"
            );
        }
        Ok(MoneyMovement {
            kind,
            gross_amount: moved,
            fees: 0,
            amount: moved,
            external_ref: receipt.external_id,
            balance: Balance::from(&profile),
        })
    }

    pub async fn list_money_events(
        &self,
        user_id: &str,
        kind: Option<MoneyEventKind>,
    ) -> Result<Vec<MoneyEventRecord>, MarketError> {
        self.require_user(user_id).await?;
        Ok(self.storage.list_money_events(user_id, kind).await?)
    }

    pub async fn audit_balance(&self, user_id: &str) -> Result<LedgerAudit, MarketError> {
        let audit = ledger::audit(self.storage.as_ref(), user_id).await?;
        if !audit.consistent {
            error!(
                user_id,
                stored = audit.stored_balance,
                derived = %audit.event_sum,
                "balance does not match money events"
            );
        }
        Ok(audit)
    }

    // ── Attributes ────────────────────────────────────────────────────────

    pub async fn set_attribute(
        &self,
        user_id: &str,
        input: AttributeInput,
    ) -> Result<AttributeRecord, MarketError> {
        if input.key.trim().is_empty() {
            return Err(MarketError::InvalidInput(
                "attribute key must not be empty".to_string(),
            ));
        }
        self.require_user(user_id).await?;
        let record = AttributeRecord {
            id: new_id(),
            user_id: user_id.to_string(),
            key: input.key,
            value: input.value,
        };
        let mut snapshot = self.storage.begin_snapshot().await?;
        let result = self
            .storage
            .upsert_attribute(&mut snapshot, record)
            .await
            .map_err(MarketError::from);
        self.finish(snapshot, result).await
    }

    pub async fn list_attributes(&self, user_id: &str) -> Result<Vec<AttributeRecord>, MarketError> {
        self.require_user(user_id).await?;
        Ok(self.storage.list_attributes(user_id).await?)
    }

    pub async fn delete_attribute(&self, user_id: &str, key: &str) -> Result<(), MarketError> {
        self.require_user(user_id).await?;
        let mut snapshot = self.storage.begin_snapshot().await?;
        let result = self
            .storage
            .delete_attribute(&mut snapshot, user_id, key)
            .await
            .map_err(MarketError::from);
        self.finish(snapshot, result).await
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    /// Money event already booked for a processor transaction. A retry that
    /// reuses an idempotency key gets the original receipt back.
    async fn recorded_event(
        &self,
        user_id: &str,
        kind: MoneyEventKind,
        external_ref: &str,
    ) -> Result<Option<MoneyEventRecord>, MarketError> {
        Ok(self
            .storage
            .list_money_events(user_id, Some(kind))
            .await?
            .into_iter()
            .find(|e| e.external_ref.as_deref() == Some(external_ref)))
    }

    async fn require_user(&self, user_id: &str) -> Result<(), MarketError> {
        self.storage.get_profile(user_id).await?;
        Ok(())
    }

    fn check_minimum(&self, amount: u64) -> Result<(), MarketError> {
        if amount < self.config.min_transfer_amount {
            return Err(MarketError::AmountTooSmall {
                amount,
                reason: format!(
                    "minimum amount is {}",
                    self.config.min_transfer_amount
                ),
            });
        }
        Ok(())
    }

    /// Commit on success, abort on failure.
    async fn finish<T>(
        &self,
        snapshot: S::Snapshot,
        result: Result<T, MarketError>,
    ) -> Result<T, MarketError> {
        match result {
            Ok(value) => {
                self.storage.commit_snapshot(snapshot).await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort_err) = self.storage.abort_snapshot(snapshot).await {
                    warn!(error = %abort_err, "snapshot abort failed");
                }
                Err(e)
            }
        }
    }
}

/// Caller-supplied idempotency key, or a fresh one for a first attempt.
fn idempotency_key(supplied: Option<String>) -> Result<String, MarketError> {
    match supplied {
        Some(key) if key.trim().is_empty() => Err(MarketError::InvalidInput(
            "idempotency key must not be empty".to_string(),
        )),
        Some(key) => Ok(key),
        None => Ok(new_id()),
    }
}
