//! The order status transition table.
//!
//! Every legal move between two [`OrderStatus`] values is listed in [`OrderStatus::allowed_targets`]. Anything not
//! listed is rejected. Terminal states have no outgoing edges at all.
use crate::{db_types::OrderStatus, errors::LifecycleError};

use OrderStatus::*;

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Completed | Cancelled | Refunded | Returned)
    }

    /// True once a payment has been confirmed for the order, i.e. the order is at or beyond `paid`/`funds_held`.
    pub fn is_post_payment(&self) -> bool {
        matches!(
            self,
            FundsHeld | Paid | Shipped | InTransit | OutForDelivery | Delivered | Completed | Disputed | Refunded | Returned
        )
    }

    pub fn allowed_targets(&self) -> &'static [OrderStatus] {
        match self {
            Pending => &[Processing, FundsHeld, Paid, PaymentFailed, Cancelled],
            Processing => &[FundsHeld, Paid, PaymentFailed, Cancelled],
            PaymentFailed => &[Processing, FundsHeld, Paid, Cancelled],
            FundsHeld | Paid => &[Shipped, Cancelled, Refunded, Disputed],
            Shipped => &[InTransit, OutForDelivery, Delivered, Disputed, Returned],
            InTransit => &[OutForDelivery, Delivered, Disputed, Returned],
            OutForDelivery => &[Delivered, InTransit, Disputed, Returned],
            Delivered => &[Completed, Disputed, Returned],
            Disputed => &[Completed, Refunded, Returned],
            Completed | Cancelled | Refunded | Returned => &[],
        }
    }
}

pub fn can_transition(current: OrderStatus, target: OrderStatus) -> bool {
    current.allowed_targets().contains(&target)
}

/// Checks a transition against the table, distinguishing "already terminal" from "not whitelisted".
pub fn validate_transition(order_id: i64, current: OrderStatus, target: OrderStatus) -> Result<(), LifecycleError> {
    if current.is_terminal() {
        return Err(LifecycleError::TerminalState(order_id, current));
    }
    if can_transition(current, target) {
        Ok(())
    } else {
        Err(LifecycleError::InvalidTransition { from: current, to: target })
    }
}
