use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Actor, OrderStatus, WalletCredit};

/// A single, already validated, status write.
///
/// Everything in here is applied in the same atomic write as the status change and its history entry.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub target: OrderStatus,
    pub actor: Actor,
    pub note: Option<String>,
    pub dispute_reason: Option<String>,
    /// Sets the order's completion flag. The write fails if the flag is already set.
    pub completes_payment: bool,
    pub gateway_transaction_id: Option<String>,
    pub gateway_response: Option<String>,
}

impl StatusChange {
    pub fn new(target: OrderStatus, actor: Actor) -> Self {
        Self {
            target,
            actor,
            note: None,
            dispute_reason: None,
            completes_payment: false,
            gateway_transaction_id: None,
            gateway_response: None,
        }
    }

    pub fn with_note<S: Into<String>>(mut self, note: S) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_dispute_reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.dispute_reason = Some(reason.into());
        self
    }

    pub fn completing_payment(mut self) -> Self {
        self.completes_payment = true;
        self
    }

    pub fn with_gateway_reference(mut self, txid: Option<String>, response: Option<String>) -> Self {
        self.gateway_transaction_id = txid;
        self.gateway_response = response;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQueryFilter {
    pub buyer_id: Option<String>,
    pub seller_id: Option<String>,
    /// Matches orders where the user is either the buyer or the seller.
    pub participant_id: Option<String>,
    pub status: Option<Vec<OrderStatus>>,
    pub delivered_before: Option<DateTime<Utc>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl OrderQueryFilter {
    pub fn with_buyer_id<S: Into<String>>(mut self, id: S) -> Self {
        self.buyer_id = Some(id.into());
        self
    }

    pub fn with_seller_id<S: Into<String>>(mut self, id: S) -> Self {
        self.seller_id = Some(id.into());
        self
    }

    pub fn with_participant<S: Into<String>>(mut self, id: S) -> Self {
        self.participant_id = Some(id.into());
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn delivered_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.delivered_before = Some(cutoff);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.buyer_id.is_none() &&
            self.seller_id.is_none() &&
            self.participant_id.is_none() &&
            self.status.as_ref().map(|s| s.is_empty()).unwrap_or(true) &&
            self.delivered_before.is_none() &&
            self.since.is_none() &&
            self.until.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    Credited(WalletCredit),
    /// A credit for this order already exists. Carries the existing entry.
    AlreadyCredited(WalletCredit),
}
