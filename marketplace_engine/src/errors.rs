use thiserror::Error;

use crate::db_types::OrderStatus;

/// The error taxonomy shared by every lifecycle operation.
///
/// Each variant corresponds to one class of failure that callers handle differently: validation and authorization
/// failures end the request, [`LifecycleError::ConcurrentModification`] asks the caller to re-read and retry, and
/// [`LifecycleError::Gateway`] means the upstream outcome is unknown.
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    #[error("Invalid request. {0}")]
    Validation(String),
    #[error("Not authorized. {0}")]
    Authorization(String),
    #[error("Cannot move an order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Order {0} is in terminal state {1}. No further transitions are possible")]
    TerminalState(i64, OrderStatus),
    #[error("Order {order_id} is {status}, which does not allow this action. {message}")]
    InvalidState { order_id: i64, status: OrderStatus, message: String },
    #[error("Order {0} was modified by another request. Re-read the order and try again")]
    ConcurrentModification(i64),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(String),
    #[error("The requested tracking record {0} does not exist")]
    TrackingNotFound(String),
    #[error("Payment gateway error. {0}")]
    Gateway(#[from] GatewayError),
    #[error("Order {0} already has an active tracking record")]
    DuplicateTracking(i64),
    #[error("'{tracking_number}' is not a valid {carrier} tracking number")]
    InvalidTrackingFormat { carrier: String, tracking_number: String },
    #[error("Webhook signature could not be verified. {0}")]
    Unauthorized(String),
    #[error("Database error. {0}")]
    Database(String),
}

impl LifecycleError {
    pub fn invalid_state<S: Into<String>>(order_id: i64, status: OrderStatus, message: S) -> Self {
        Self::InvalidState { order_id, status, message: message.into() }
    }

    /// Storage-level busy errors do not know which order they belong to. This fills in the id.
    pub fn for_order(self, order_id: i64) -> Self {
        match self {
            Self::ConcurrentModification(_) => Self::ConcurrentModification(order_id),
            e => e,
        }
    }
}

// SQLite reports lock contention as SQLITE_BUSY (5) or one of its extended codes (e.g. 517, BUSY_SNAPSHOT).
fn is_busy(code: &str) -> bool {
    code.parse::<i32>().map(|c| c & 0xff == 5 || c & 0xff == 6).unwrap_or(false)
}

impl From<sqlx::Error> for LifecycleError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.code().map(|c| is_busy(c.as_ref())).unwrap_or(false) {
                return LifecycleError::ConcurrentModification(-1);
            }
        }
        LifecycleError::Database(e.to_string())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("The gateway did not answer in time. The payment outcome is unknown; retry verification later")]
    Timeout,
    #[error("The gateway rejected the request. {0}")]
    Rejected(String),
    #[error("Could not reach the gateway. {0}")]
    Unavailable(String),
    #[error("The gateway returned an unexpected response. {0}")]
    InvalidResponse(String),
    #[error("Gateway is not configured. {0}")]
    NotConfigured(String),
}
