//! Persistence ports. Every state-changing method is a single conditional update:
//! the precondition travels with the write so concurrent callers cannot both pass it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Admin, AdminRole, Level, PaymentCheckout, QrPayload, RegistrationStatus, User};

pub mod postgres;

pub use postgres::{PgAdminStore, PgUserStore};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write. Carries the logical field name.
    #[error("duplicate {0}")]
    Duplicate(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub level: Level,
    pub amount: Decimal,
}

/// Field set written when a ticket is issued.
#[derive(Debug, Clone)]
pub struct TicketIssue {
    pub ticket_id: String,
    pub qr_code_data: QrPayload,
    pub qr_code_image: String,
    /// Gateway-reported amount. `None` keeps the registered amount.
    pub amount: Option<Decimal>,
    /// Replaces any stored date, such as the receipt upload time.
    pub payment_date: DateTime<Utc>,
    pub approved_by: String,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Rejection {
    pub reason: String,
    pub rejected_by: String,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserSearch {
    pub term: Option<String>,
    pub offset: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending_payment: i64,
    pub pending_verification: i64,
    pub approved: i64,
    pub rejected: i64,
    pub paid: i64,
    pub total_revenue: Decimal,
}

impl StatusCounts {
    pub fn total(&self) -> i64 {
        self.pending_payment + self.pending_verification + self.approved + self.rejected
    }

    pub fn add(&mut self, status: RegistrationStatus, count: i64) {
        match status {
            RegistrationStatus::PendingPayment => self.pending_payment += count,
            RegistrationStatus::PendingVerification => self.pending_verification += count,
            RegistrationStatus::Approved => self.approved += count,
            RegistrationStatus::Rejected => self.rejected += count,
        }
    }
}

/// Conditional updates return `Ok(None)` when the row is missing or the guard did not hold.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: NewUser) -> StoreResult<User>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_by_reference(&self, reference: &str) -> StoreResult<Option<User>>;

    async fn find_by_ticket_id(&self, ticket_id: &str) -> StoreResult<Option<User>>;

    /// Stores the checkout only if the user is unpaid, has no reference yet and is in
    /// one of `from`.
    async fn attach_checkout(
        &self,
        id: Uuid,
        from: &[RegistrationStatus],
        checkout: &PaymentCheckout,
    ) -> StoreResult<Option<User>>;

    /// Records a receipt and moves the user to `pending_verification`.
    async fn attach_receipt(
        &self,
        id: Uuid,
        from: &[RegistrationStatus],
        receipt_url: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<User>>;

    /// Marks the user paid and approved with the given ticket, guarded by `paid = false`
    /// and a status in `from`. A colliding ticket id yields `StoreError::Duplicate`.
    async fn issue_ticket(
        &self,
        id: Uuid,
        from: &[RegistrationStatus],
        issue: &TicketIssue,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<User>>;

    async fn reject(
        &self,
        id: Uuid,
        from: &[RegistrationStatus],
        rejection: &Rejection,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<User>>;

    /// Users in `status`, oldest payment first.
    async fn list_by_status(&self, status: RegistrationStatus) -> StoreResult<Vec<User>>;

    /// Case-insensitive substring search over name, email, ticket id, payment reference
    /// and phone. Returns the page and the total match count.
    async fn search(&self, query: &UserSearch) -> StoreResult<(Vec<User>, i64)>;

    async fn list_all(&self) -> StoreResult<Vec<User>>;

    async fn status_counts(&self) -> StoreResult<StatusCounts>;

    async fn recently_updated(&self, limit: i64) -> StoreResult<Vec<User>>;
}

#[derive(Debug, Clone)]
pub struct NewAdmin {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: AdminRole,
    pub created_by: Option<Uuid>,
}

#[async_trait]
pub trait AdminStore: Send + Sync {
    async fn insert(&self, admin: NewAdmin) -> StoreResult<Admin>;

    async fn count(&self) -> StoreResult<i64>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Admin>>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Admin>>;

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;

    async fn set_active(&self, id: Uuid, active: bool) -> StoreResult<Option<Admin>>;

    async fn create_session(
        &self,
        token_hash: &str,
        admin_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Admin owning an unexpired session, whether or not the account is still active.
    async fn find_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Admin>>;

    async fn delete_session(&self, token_hash: &str) -> StoreResult<()>;

    async fn delete_sessions_for(&self, admin_id: Uuid) -> StoreResult<()>;
}
