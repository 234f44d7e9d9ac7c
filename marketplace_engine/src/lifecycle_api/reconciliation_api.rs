use std::fmt::Debug;

use log::*;

use crate::{db_types::ReconciliationFlag, errors::LifecycleError, traits::ReconciliationLog};

/// Read and close out the side-effect failures that payment completion could not finish on its own.
pub struct ReconciliationApi<B> {
    db: B,
}

impl<B> Debug for ReconciliationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B> ReconciliationApi<B>
where B: ReconciliationLog
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn open_flags(&self) -> Result<Vec<ReconciliationFlag>, LifecycleError> {
        self.db.fetch_open_flags().await
    }

    pub async fn flags_for_order(&self, order_id: i64) -> Result<Vec<ReconciliationFlag>, LifecycleError> {
        self.db.fetch_flags_for_order(order_id).await
    }

    /// Closes a flag once an admin has dealt with it. Resolving a flag twice overwrites the note.
    pub async fn resolve_flag(
        &self,
        flag_id: i64,
        admin_id: &str,
        note: &str,
    ) -> Result<ReconciliationFlag, LifecycleError> {
        if note.trim().is_empty() {
            return Err(LifecycleError::Validation("A resolution note is required".to_string()));
        }
        let note = format!("{note} (resolved by {admin_id})");
        let flag = self.db.resolve_flag(flag_id, &note).await?;
        info!("🔄️ Reconciliation flag {flag_id} ({}) on order {} resolved by {admin_id}", flag.step, flag.order_id);
        Ok(flag)
    }
}
