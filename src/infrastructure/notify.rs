use crate::domain::ports::Notifier;
use crate::domain::transaction::{TransactionRecord, TransactionStatus};
use crate::domain::user::UserId;
use crate::error::Result;
use async_trait::async_trait;

/// Notifier that emits settlement outcomes as structured log events.
///
/// Stands in for push/SMS delivery; embedders swap in their own
/// [`Notifier`](crate::domain::ports::Notifier) implementation.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, user: UserId, record: &TransactionRecord) -> Result<()> {
        match record.status {
            TransactionStatus::Completed => tracing::info!(
                %user,
                transaction = %record.id,
                kind = record.kind.label(),
                amount = %record.amount,
                "settlement completed"
            ),
            TransactionStatus::Failed => tracing::info!(
                %user,
                transaction = %record.id,
                kind = record.kind.label(),
                reason = record.failure_reason.as_deref().unwrap_or("unknown"),
                "settlement failed"
            ),
            TransactionStatus::Pending => tracing::debug!(
                %user,
                transaction = %record.id,
                "settlement pending"
            ),
        }
        Ok(())
    }
}
