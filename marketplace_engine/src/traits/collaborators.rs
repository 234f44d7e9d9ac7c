use mkp_common::Money;

use crate::{
    db_types::{NewProduct, Product, ReconciliationFlag, ReconciliationStep, WalletCredit},
    errors::LifecycleError,
    traits::data_objects::CreditOutcome,
};

/// The slice of the product listing service that the order lifecycle depends on.
#[allow(async_fn_in_trait)]
pub trait ProductCatalog {
    async fn fetch_product(&self, product_id: &str) -> Result<Option<Product>, LifecycleError>;

    async fn upsert_product(&self, product: NewProduct) -> Result<Product, LifecycleError>;

    /// Check-then-set. Returns `true` if this call changed the product to `sold`, `false` if it already was.
    async fn mark_product_sold(&self, product_id: &str) -> Result<bool, LifecycleError>;
}

/// Append-only seller wallet ledger. At most one credit entry may exist per order.
#[allow(async_fn_in_trait)]
pub trait WalletLedger {
    async fn credit_wallet(
        &self,
        user_id: &str,
        amount: Money,
        currency: &str,
        reason: &str,
        order_id: i64,
    ) -> Result<CreditOutcome, LifecycleError>;

    async fn fetch_credit_for_order(&self, order_id: i64) -> Result<Option<WalletCredit>, LifecycleError>;

    async fn fetch_wallet_credits(&self, user_id: &str) -> Result<Vec<WalletCredit>, LifecycleError>;
}

/// Side-effect failures that need a human to look at them.
#[allow(async_fn_in_trait)]
pub trait ReconciliationLog {
    async fn flag_for_reconciliation(
        &self,
        order_id: i64,
        step: ReconciliationStep,
        message: &str,
    ) -> Result<ReconciliationFlag, LifecycleError>;

    async fn fetch_open_flags(&self) -> Result<Vec<ReconciliationFlag>, LifecycleError>;

    async fn fetch_flags_for_order(&self, order_id: i64) -> Result<Vec<ReconciliationFlag>, LifecycleError>;

    async fn resolve_flag(&self, flag_id: i64, note: &str) -> Result<ReconciliationFlag, LifecycleError>;
}
