use std::{fmt::Debug, future::Future, sync::Arc, time::Duration};

use log::*;

use crate::{
    db_types::{Actor, GatewayKind, Order, OrderStatus, PaymentMethod, ReconciliationStep},
    errors::{GatewayError, LifecycleError},
    events::{EventProducers, OrderPaidEvent},
    integrations::{
        CurrencyConverter,
        FixedRateConverter,
        GatewayPaymentStatus,
        PaymentGateway,
        PaymentRequest,
        PaymentResult,
    },
    lifecycle_api::{
        order_objects::{ensure_buyer, ensure_participant},
        payment_objects::{CompletionResult, GatewayConfirmation, PaymentInitiation, PaymentStatusReport, StepOutcome},
        transition_api::TransitionApi,
    },
    traits::{CreditOutcome, OrderManagement, ProductCatalog, ReconciliationLog, StatusChange, WalletLedger},
};

pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

/// The only code path that confirms payments.
///
/// Completion signals can arrive from a gateway webhook, a status poll and an immediate gateway approval, in any order
/// and any number of times. The status transition to `paid`/`funds_held` sets the order's completion flag in the same
/// version-checked write, so exactly one signal wins. Only the winner performs the downstream effects:
///
/// 1. credit the seller's wallet with the payout,
/// 2. mark the product sold,
/// 3. create the fulfillment record the seller ships from.
///
/// A failed effect never undoes the status change. It is logged, flagged for reconciliation and reported as a warning
/// in the [`CompletionResult`].
pub struct PaymentCoordinator<B, G> {
    db: B,
    gateway: G,
    transitions: TransitionApi<B>,
    fx: Arc<dyn CurrencyConverter>,
    gateway_timeout: Duration,
}

impl<B, G> Debug for PaymentCoordinator<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentCoordinator (timeout {:?})", self.gateway_timeout)
    }
}

impl<B: Clone, G> PaymentCoordinator<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers) -> Self {
        let transitions = TransitionApi::new(db.clone(), producers);
        Self {
            db,
            gateway,
            transitions,
            fx: Arc::new(FixedRateConverter::default()),
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    pub fn with_currency_converter(mut self, fx: Arc<dyn CurrencyConverter>) -> Self {
        self.fx = fx;
        self
    }

    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }
}

enum Unsuccessful {
    Failed(String),
    Cancelled,
}

impl<B, G> PaymentCoordinator<B, G>
where
    B: OrderManagement + ProductCatalog + WalletLedger + ReconciliationLog,
    G: PaymentGateway,
{
    /// Confirms the payment for an order and runs the downstream effects, at most once per order.
    ///
    /// If the order is already past payment, nothing is done and `already_processed` is set. If the order was
    /// terminated before the payment arrived, the payment is flagged for reconciliation and
    /// [`LifecycleError::TerminalState`] is returned. Losing a race against another completion signal is retried once,
    /// and the re-read then finds the order already processed.
    pub async fn complete_payment(
        &self,
        order_id: i64,
        confirmation: GatewayConfirmation,
    ) -> Result<CompletionResult, LifecycleError> {
        let mut attempt = 0;
        let order = loop {
            attempt += 1;
            let order = self.transitions.fetch_order(order_id).await?;
            if order.payment_completed || order.status.is_post_payment() {
                info!("💳️ Payment for order {order_id} was already processed. Ignoring repeat confirmation");
                return Ok(CompletionResult::already_processed(order));
            }
            if order.status.is_terminal() {
                let message = format!(
                    "{} confirmed payment {} for order {} after it was {}. The funds must be returned manually",
                    confirmation.gateway, confirmation.gateway_transaction_id, order.transaction_id, order.status
                );
                self.flag(order.id, ReconciliationStep::PaymentAfterTermination, &message).await;
                return Err(LifecycleError::TerminalState(order.id, order.status));
            }
            let change = Self::completion_change(&order, &confirmation);
            match self.transitions.apply_transition(&order, change).await {
                Ok(updated) => break updated,
                Err(LifecycleError::ConcurrentModification(_)) if attempt < 2 => {
                    debug!("💳️ Order {order_id} changed while completing its payment. Re-reading");
                },
                Err(e) => return Err(e),
            }
        };
        info!(
            "💳️ Payment {} confirmed for order {} [{}]. Status is now {}",
            confirmation.gateway_transaction_id, order.id, order.transaction_id, order.status
        );
        let mut warnings = Vec::new();
        if let Some(warning) = self.check_settled_amount(&order, &confirmation).await {
            warnings.push(warning);
        }
        let wallet_credit = self.credit_seller(&order, &mut warnings).await;
        let product_status = self.mark_product_sold(&order, &mut warnings).await;
        let fulfillment = self.materialize_fulfillment(&order, &mut warnings).await;
        debug!("💳️ Notifying order paid hook subscribers");
        self.transitions.producers().publish_order_paid(OrderPaidEvent::new(order.clone())).await;
        Ok(CompletionResult { order, already_processed: false, wallet_credit, product_status, fulfillment, warnings })
    }

    fn completion_change(order: &Order, confirmation: &GatewayConfirmation) -> StatusChange {
        let target = match order.payment_method {
            PaymentMethod::Escrow => OrderStatus::FundsHeld,
            PaymentMethod::Standard => OrderStatus::Paid,
        };
        let mut note = format!("Payment {} confirmed by {}", confirmation.gateway_transaction_id, confirmation.gateway);
        // The first gateway reference recorded for an order is kept; later ones only show up in the history
        let txid = match &order.gateway_transaction_id {
            None => Some(confirmation.gateway_transaction_id.clone()),
            Some(existing) if existing == &confirmation.gateway_transaction_id => None,
            Some(existing) => {
                note.push_str(&format!(" (initiated as {existing})"));
                None
            },
        };
        StatusChange::new(target, Actor::Gateway(confirmation.gateway))
            .completing_payment()
            .with_gateway_reference(txid, confirmation.raw.clone())
            .with_note(note)
    }

    async fn check_settled_amount(&self, order: &Order, confirmation: &GatewayConfirmation) -> Option<String> {
        let amount = confirmation.amount?;
        let expected = order.amounts.total_amount;
        let order_currency = order.amounts.currency.as_str();
        let currency = confirmation.currency.as_deref().unwrap_or(order_currency);
        let same_currency = currency.eq_ignore_ascii_case(order_currency);
        let message = match self.fx.convert(amount, currency, order_currency) {
            Ok(converted) => {
                // Conversions are allowed 1% of slack for rate drift between the gateway and our table
                let tolerance = if same_currency { 0 } else { (expected.value().abs() / 100).max(1) };
                if (converted.amount - expected).value().abs() <= tolerance {
                    return None;
                }
                format!(
                    "Gateway settled {amount} {currency} ({} {order_currency}) but the order total is {expected} \
                     {order_currency}",
                    converted.amount
                )
            },
            Err(e) => format!("Could not compare settled amount {amount} {currency} with the order total. {e}"),
        };
        self.flag(order.id, ReconciliationStep::AmountMismatch, &message).await;
        Some(message)
    }

    async fn credit_seller(&self, order: &Order, warnings: &mut Vec<String>) -> StepOutcome {
        let payout = order.amounts.seller_payout;
        if !payout.is_positive() {
            warn!("💳️ Seller payout for order {} is {payout}. No wallet credit is made", order.id);
            warnings.push(format!("Seller payout is {payout}. The wallet was not credited"));
            return StepOutcome::Skipped;
        }
        let reason = match order.payment_method {
            PaymentMethod::Escrow => format!("Escrow funds held for order {}", order.transaction_id),
            PaymentMethod::Standard => format!("Payment received for order {}", order.transaction_id),
        };
        let currency = order.amounts.currency.as_str();
        match self.db.credit_wallet(&order.seller_id, payout, currency, &reason, order.id).await {
            Ok(CreditOutcome::Credited(credit)) => {
                info!("💳️ Credited {} {} to {} for order {}", credit.amount, credit.currency, credit.user_id, order.id);
                StepOutcome::Done
            },
            Ok(CreditOutcome::AlreadyCredited(credit)) => {
                warn!("💳️ Wallet credit #{} for order {} already exists. Not crediting again", credit.id, order.id);
                StepOutcome::AlreadyDone
            },
            Err(e) => {
                let message = format!("Crediting {payout} {currency} to seller {} failed. {e}", order.seller_id);
                self.flag(order.id, ReconciliationStep::WalletCredit, &message).await;
                warnings.push(message);
                StepOutcome::Failed
            },
        }
    }

    async fn mark_product_sold(&self, order: &Order, warnings: &mut Vec<String>) -> StepOutcome {
        match self.db.mark_product_sold(&order.product_id).await {
            Ok(true) => {
                debug!("💳️ Product {} marked as sold", order.product_id);
                StepOutcome::Done
            },
            Ok(false) => {
                debug!("💳️ Product {} was already sold", order.product_id);
                StepOutcome::AlreadyDone
            },
            Err(e) => {
                let message = format!("Could not mark product {} as sold. {e}", order.product_id);
                self.flag(order.id, ReconciliationStep::ProductStatus, &message).await;
                warnings.push(message);
                StepOutcome::Failed
            },
        }
    }

    async fn materialize_fulfillment(&self, order: &Order, warnings: &mut Vec<String>) -> StepOutcome {
        match self.db.insert_fulfillment(order).await {
            Ok((record, true)) => {
                debug!("💳️ Fulfillment record #{} created for order {}", record.id, order.id);
                StepOutcome::Done
            },
            Ok((_, false)) => StepOutcome::AlreadyDone,
            Err(e) => {
                let message = format!("Could not create the fulfillment record. {e}");
                self.flag(order.id, ReconciliationStep::FulfillmentRecord, &message).await;
                warnings.push(message);
                StepOutcome::Failed
            },
        }
    }

    async fn flag(&self, order_id: i64, step: ReconciliationStep, message: &str) {
        warn!("💳️ Order {order_id} flagged for reconciliation ({step}): {message}");
        if let Err(e) = self.db.flag_for_reconciliation(order_id, step, message).await {
            error!("💳️ Could not write reconciliation flag for order {order_id} ({step}): {e}. Message was: {message}");
        }
    }

    /// Bounds a gateway call. A timeout leaves the order untouched and is reported as [`GatewayError::Timeout`].
    async fn call_gateway<T>(&self, call: impl Future<Output = Result<T, GatewayError>>) -> Result<T, LifecycleError> {
        match tokio::time::timeout(self.gateway_timeout, call).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => {
                warn!("💳️ Gateway call failed: {e}");
                Err(e.into())
            },
            Err(_) => {
                warn!("💳️ Gateway call timed out after {:?}. The outcome is unknown", self.gateway_timeout);
                Err(GatewayError::Timeout.into())
            },
        }
    }

    /// The buyer starts paying for an order.
    ///
    /// The order moves to `processing` with the gateway's reference. If the gateway approves on the spot, the payment
    /// is completed right away; an immediate decline moves the order to `payment_failed`.
    pub async fn initiate_payment(&self, order_id: i64, buyer_id: &str) -> Result<PaymentInitiation, LifecycleError> {
        let order = self.transitions.fetch_order(order_id).await?;
        ensure_buyer(&order, buyer_id)?;
        if order.payment_completed || order.status.is_post_payment() {
            return Err(LifecycleError::invalid_state(order.id, order.status, "The order has already been paid"));
        }
        if order.status.is_terminal() {
            return Err(LifecycleError::TerminalState(order.id, order.status));
        }
        if order.status == OrderStatus::Processing {
            return Err(LifecycleError::invalid_state(
                order.id,
                order.status,
                "A payment is already in progress. Check its status instead",
            ));
        }
        let request = PaymentRequest {
            order_id: order.id,
            transaction_id: order.transaction_id.clone(),
            gateway: order.gateway,
            payment_method: order.payment_method,
            amount: order.amounts.total_amount,
            currency: order.amounts.currency.clone(),
            buyer_id: order.buyer_id.clone(),
            description: format!("Order {} for product {}", order.transaction_id, order.product_id),
        };
        info!("💳️ Initiating {} payment of {} {} for order {order_id}", order.gateway, request.amount, request.currency);
        let result = self.call_gateway(self.gateway.process_payment(request)).await?;
        let processing = self.record_processing(&order, &result, buyer_id).await?;
        let gateway_status = result.status.clone();
        let redirect_url = result.redirect_url.clone();
        match result.status {
            GatewayPaymentStatus::Succeeded { amount, currency } => {
                let confirmation = Self::confirmation_from(order.gateway, &result.gateway_transaction_id, amount, currency);
                let completion = self.complete_payment(order_id, confirmation).await?;
                Ok(PaymentInitiation {
                    order: completion.order.clone(),
                    gateway_status,
                    redirect_url,
                    completion: Some(completion),
                })
            },
            GatewayPaymentStatus::Pending => {
                Ok(PaymentInitiation { order: processing, gateway_status, redirect_url, completion: None })
            },
            GatewayPaymentStatus::Failed { reason } => {
                let order = self.settle_unsuccessful(order_id, order.gateway, Unsuccessful::Failed(reason)).await?;
                Ok(PaymentInitiation { order, gateway_status, redirect_url, completion: None })
            },
            GatewayPaymentStatus::Cancelled => {
                let order = self.settle_unsuccessful(order_id, order.gateway, Unsuccessful::Cancelled).await?;
                Ok(PaymentInitiation { order, gateway_status, redirect_url, completion: None })
            },
        }
    }

    async fn record_processing(
        &self,
        order: &Order,
        result: &PaymentResult,
        buyer_id: &str,
    ) -> Result<Order, LifecycleError> {
        let raw = (!result.raw.is_null()).then(|| result.raw.to_string());
        let change = StatusChange::new(OrderStatus::Processing, Actor::Buyer(buyer_id.to_string()))
            .with_gateway_reference(Some(result.gateway_transaction_id.clone()), raw)
            .with_note(format!("Payment {} initiated with {}", result.gateway_transaction_id, order.gateway));
        self.transitions.apply_transition(order, change).await
    }

    fn confirmation_from(
        gateway: GatewayKind,
        txid: &str,
        amount: Option<mkp_common::Money>,
        currency: Option<String>,
    ) -> GatewayConfirmation {
        let confirmation = GatewayConfirmation::new(gateway, txid);
        match (amount, currency) {
            (Some(a), Some(c)) => confirmation.with_amount(a, &c),
            (Some(a), None) => GatewayConfirmation { amount: Some(a), ..confirmation },
            _ => confirmation,
        }
    }

    /// Asks the gateway about a payment that has not settled yet, and acts on the answer through the same idempotent
    /// paths the webhooks use. Settled orders are reported without contacting the gateway.
    pub async fn check_payment_status(
        &self,
        order_id: i64,
        user_id: &str,
        is_admin: bool,
    ) -> Result<PaymentStatusReport, LifecycleError> {
        let order = self.transitions.fetch_order(order_id).await?;
        ensure_participant(&order, user_id, is_admin)?;
        if order.payment_completed || order.status.is_post_payment() || order.status.is_terminal() {
            return Ok(PaymentStatusReport { order, gateway_status: None, completion: None });
        }
        let Some(txid) = order.gateway_transaction_id.clone() else {
            debug!("💳️ Order {order_id} has no gateway reference yet. Nothing to verify");
            return Ok(PaymentStatusReport { order, gateway_status: None, completion: None });
        };
        let result = self.call_gateway(self.gateway.verify_payment(order.gateway, &txid)).await?;
        debug!("💳️ Gateway reports {:?} for order {order_id}", result.status);
        let gateway_status = Some(result.status.clone());
        match result.status {
            GatewayPaymentStatus::Succeeded { amount, currency } => {
                let confirmation = Self::confirmation_from(order.gateway, &txid, amount, currency);
                let completion = self.complete_payment(order_id, confirmation).await?;
                Ok(PaymentStatusReport { order: completion.order.clone(), gateway_status, completion: Some(completion) })
            },
            GatewayPaymentStatus::Failed { reason } => {
                let order = self.fail_payment(order_id, order.gateway, &reason).await?;
                Ok(PaymentStatusReport { order, gateway_status, completion: None })
            },
            GatewayPaymentStatus::Cancelled => {
                let order = self.cancel_payment(order_id, order.gateway).await?;
                Ok(PaymentStatusReport { order, gateway_status, completion: None })
            },
            GatewayPaymentStatus::Pending => Ok(PaymentStatusReport { order, gateway_status, completion: None }),
        }
    }

    /// The gateway declined the payment. Ignored if the payment was already confirmed or the order is closed.
    pub async fn fail_payment(&self, order_id: i64, gateway: GatewayKind, reason: &str) -> Result<Order, LifecycleError> {
        self.settle_unsuccessful(order_id, gateway, Unsuccessful::Failed(reason.to_string())).await
    }

    /// The buyer abandoned the payment at the gateway. Ignored if the payment was already confirmed.
    pub async fn cancel_payment(&self, order_id: i64, gateway: GatewayKind) -> Result<Order, LifecycleError> {
        self.settle_unsuccessful(order_id, gateway, Unsuccessful::Cancelled).await
    }

    /// The gateway opened a dispute (chargeback) on the payment. Repeat notifications leave the order as it is.
    pub async fn record_dispute(
        &self,
        order_id: i64,
        gateway: GatewayKind,
        reason: &str,
    ) -> Result<Order, LifecycleError> {
        let reason = match reason.trim() {
            "" => format!("Dispute opened at {gateway}"),
            r => r.to_string(),
        };
        let mut attempt = 0;
        loop {
            attempt += 1;
            let order = self.transitions.fetch_order(order_id).await?;
            if order.status == OrderStatus::Disputed {
                debug!("💳️ Order {order_id} is already disputed");
                return Ok(order);
            }
            let change = StatusChange::new(OrderStatus::Disputed, Actor::Gateway(gateway))
                .with_dispute_reason(reason.clone())
                .with_note(format!("Dispute opened at {gateway}: {reason}"));
            match self.transitions.apply_transition(&order, change).await {
                Ok(updated) => {
                    warn!("💳️ {gateway} opened a dispute on order {order_id}: {reason}");
                    return Ok(updated);
                },
                Err(LifecycleError::ConcurrentModification(_)) if attempt < 2 => continue,
                Err(e) => return Err(e),
            }
        }
    }

    async fn settle_unsuccessful(
        &self,
        order_id: i64,
        gateway: GatewayKind,
        outcome: Unsuccessful,
    ) -> Result<Order, LifecycleError> {
        let (target, note) = match &outcome {
            Unsuccessful::Failed(reason) => (OrderStatus::PaymentFailed, format!("Payment failed: {reason}")),
            Unsuccessful::Cancelled => (OrderStatus::Cancelled, "Payment cancelled at the gateway".to_string()),
        };
        let mut attempt = 0;
        loop {
            attempt += 1;
            let order = self.transitions.fetch_order(order_id).await?;
            if order.payment_completed || order.status.is_post_payment() {
                info!("💳️ Ignoring late {target} signal for order {order_id}. Its payment was already confirmed");
                return Ok(order);
            }
            if order.status.is_terminal() || order.status == target {
                debug!("💳️ Order {order_id} is already {}. Ignoring {target} signal", order.status);
                return Ok(order);
            }
            let change = StatusChange::new(target, Actor::Gateway(gateway)).with_note(note.clone());
            match self.transitions.apply_transition(&order, change).await {
                Ok(updated) => return Ok(updated),
                Err(LifecycleError::ConcurrentModification(_)) if attempt < 2 => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
