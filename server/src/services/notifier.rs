//! Outbound notifications sent after lifecycle transitions.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::models::User;

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn ticket_issued(&self, user: &User) -> Result<(), NotifyError>;

    async fn receipt_received(&self, user: &User) -> Result<(), NotifyError>;

    async fn registration_rejected(&self, user: &User, reason: &str) -> Result<(), NotifyError>;
}

/// Writes each notification to the log instead of delivering it.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn ticket_issued(&self, user: &User) -> Result<(), NotifyError> {
        info!(
            user_id = %user.id,
            email = %user.email,
            ticket_id = user.ticket_id.as_deref().unwrap_or_default(),
            "Ticket issued notification"
        );
        Ok(())
    }

    async fn receipt_received(&self, user: &User) -> Result<(), NotifyError> {
        info!(user_id = %user.id, email = %user.email, "Receipt received notification");
        Ok(())
    }

    async fn registration_rejected(&self, user: &User, reason: &str) -> Result<(), NotifyError> {
        info!(
            user_id = %user.id,
            email = %user.email,
            reason = %reason,
            "Registration rejected notification"
        );
        Ok(())
    }
}
