use mkp_common::Money;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{GatewayKind, Order},
    integrations::GatewayPaymentStatus,
};

/// A gateway's claim that a payment went through, from a webhook, a status poll or an immediate approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfirmation {
    pub gateway: GatewayKind,
    pub gateway_transaction_id: String,
    /// The settled amount, when the gateway reports one.
    pub amount: Option<Money>,
    pub currency: Option<String>,
    /// Raw gateway state, stored on the order as-is.
    pub raw: Option<String>,
}

impl GatewayConfirmation {
    pub fn new<S: Into<String>>(gateway: GatewayKind, gateway_transaction_id: S) -> Self {
        Self { gateway, gateway_transaction_id: gateway_transaction_id.into(), amount: None, currency: None, raw: None }
    }

    pub fn with_amount(mut self, amount: Money, currency: &str) -> Self {
        self.amount = Some(amount);
        self.currency = Some(currency.to_ascii_uppercase());
        self
    }

    pub fn with_raw(mut self, raw: String) -> Self {
        self.raw = Some(raw);
        self
    }
}

/// The result of one downstream effect of payment completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Done,
    /// A previous completion signal already performed this effect.
    AlreadyDone,
    /// Deliberately not performed, e.g. a zero payout, or the whole completion was an idempotent repeat.
    Skipped,
    /// Failed and flagged for reconciliation.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    pub order: Order,
    pub already_processed: bool,
    pub wallet_credit: StepOutcome,
    pub product_status: StepOutcome,
    pub fulfillment: StepOutcome,
    pub warnings: Vec<String>,
}

impl CompletionResult {
    pub fn already_processed(order: Order) -> Self {
        Self {
            order,
            already_processed: true,
            wallet_credit: StepOutcome::Skipped,
            product_status: StepOutcome::Skipped,
            fulfillment: StepOutcome::Skipped,
            warnings: Vec::new(),
        }
    }

    /// "Processed with warnings": the payment is confirmed, but something downstream needs attention.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiation {
    pub order: Order,
    pub gateway_status: GatewayPaymentStatus,
    pub redirect_url: Option<String>,
    pub completion: Option<CompletionResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusReport {
    pub order: Order,
    /// `None` when the gateway was not asked, because the order is already settled or has no gateway reference.
    pub gateway_status: Option<GatewayPaymentStatus>,
    pub completion: Option<CompletionResult>,
}
