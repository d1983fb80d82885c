//! Admin review queue and reporting.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Admin, RegistrationStatus, User};
use crate::services::lifecycle::{transition, Action};
use crate::services::notifier::Notifier;
use crate::services::tickets::{IssueRequest, TicketIssuer};
use crate::store::{Rejection, StatusCounts, UserSearch, UserStore};
use crate::utils::error::{AppError, AppResult};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;
pub const MAX_SEARCH_RESULTS: i64 = 50;
pub const MAX_BULK_ITEMS: usize = 100;
const RECENT_ACTIVITY_LIMIT: i64 = 10;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone)]
pub struct UserPage {
    pub stats: StatusCounts,
    pub users: Vec<User>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItem {
    pub user_id: Uuid,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BulkItem>,
}

impl BulkReport {
    fn from_results(results: Vec<BulkItem>) -> Self {
        let succeeded = results.iter().filter(|item| item.success).count();
        Self {
            processed: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub user_id: Uuid,
    pub name: String,
    pub status: RegistrationStatus,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl From<&User> for ActivityEntry {
    fn from(user: &User) -> Self {
        let message = match user.status {
            RegistrationStatus::PendingPayment => format!("{} registered", user.name),
            RegistrationStatus::PendingVerification => {
                format!("{} uploaded a payment receipt", user.name)
            }
            RegistrationStatus::Approved => format!("{}'s ticket was issued", user.name),
            RegistrationStatus::Rejected => format!("{}'s payment was rejected", user.name),
        };
        Self {
            user_id: user.id,
            name: user.name.clone(),
            status: user.status,
            message,
            at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total: i64,
    pub pending_payment: i64,
    pub pending_verification: i64,
    pub approved: i64,
    pub rejected: i64,
    pub paid: i64,
    pub total_revenue: Decimal,
    pub recent_activity: Vec<ActivityEntry>,
}

/// One row of the registration export, keyed by human-readable column names.
#[derive(Debug, Clone, Serialize)]
pub struct ExportRow {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Phone")]
    pub phone: Option<String>,
    #[serde(rename = "Level")]
    pub level: String,
    #[serde(rename = "Amount")]
    pub amount: Decimal,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Paid")]
    pub paid: bool,
    #[serde(rename = "Payment Reference")]
    pub payment_reference: Option<String>,
    #[serde(rename = "Ticket ID")]
    pub ticket_id: Option<String>,
    #[serde(rename = "Payment Date")]
    pub payment_date: Option<DateTime<Utc>>,
    #[serde(rename = "Approved At")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(rename = "Approved By")]
    pub approved_by: Option<String>,
    #[serde(rename = "Rejection Reason")]
    pub rejection_reason: Option<String>,
    #[serde(rename = "Registered At")]
    pub registered_at: DateTime<Utc>,
}

impl From<User> for ExportRow {
    fn from(user: User) -> Self {
        Self {
            name: user.name,
            email: user.email,
            phone: user.phone,
            level: user.level.to_string(),
            amount: user.amount,
            status: user.status.to_string(),
            paid: user.paid,
            payment_reference: user.payment_reference,
            ticket_id: user.ticket_id,
            payment_date: user.payment_date,
            approved_at: user.approved_at,
            approved_by: user.approved_by,
            rejection_reason: user.rejection_reason,
            registered_at: user.created_at,
        }
    }
}

/// Renders export rows as CSV with a header line.
pub fn rows_to_csv(rows: &[ExportRow]) -> AppResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| AppError::InternalServerError(e.to_string()))
}

#[derive(Clone)]
pub struct ReviewService {
    users: Arc<dyn UserStore>,
    notifier: Arc<dyn Notifier>,
    issuer: TicketIssuer,
}

impl ReviewService {
    pub fn new(
        users: Arc<dyn UserStore>,
        notifier: Arc<dyn Notifier>,
        issuer: TicketIssuer,
    ) -> Self {
        Self {
            users,
            notifier,
            issuer,
        }
    }

    async fn get(&self, user_id: Uuid) -> AppResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn user(&self, user_id: Uuid) -> AppResult<User> {
        self.get(user_id).await
    }

    pub async fn list_pending(&self) -> AppResult<Vec<User>> {
        Ok(self
            .users
            .list_by_status(RegistrationStatus::PendingVerification)
            .await?)
    }

    /// Accepts a submitted receipt and issues the ticket.
    pub async fn approve(
        &self,
        user_id: Uuid,
        admin: &Admin,
        admin_notes: Option<String>,
    ) -> AppResult<User> {
        let user = self.get(user_id).await?;
        transition(user.status, Action::Approve)?;

        let request = IssueRequest {
            action: Action::Approve,
            verified_by: admin.email.clone(),
            amount: None,
            payment_date: user.payment_date.unwrap_or_else(Utc::now),
            admin_notes: clean(admin_notes),
        };

        let Some(updated) = self.issuer.issue(&user, &request).await? else {
            let current = self.get(user_id).await?;
            transition(current.status, Action::Approve)?;
            return Err(AppError::Conflict(
                "Registration changed while being reviewed".to_string(),
            ));
        };

        info!(user_id = %updated.id, admin = %admin.email, "Payment approved");
        if let Err(e) = self.notifier.ticket_issued(&updated).await {
            warn!(user_id = %updated.id, error = %e, "Notification failed");
        }
        Ok(updated)
    }

    /// Declines a submitted receipt. `reason` must contain more than whitespace.
    pub async fn reject(
        &self,
        user_id: Uuid,
        admin: &Admin,
        reason: &str,
        admin_notes: Option<String>,
    ) -> AppResult<User> {
        let reason = require_reason(reason)?;
        let user = self.get(user_id).await?;
        transition(user.status, Action::Reject)?;

        let rejection = Rejection {
            reason: reason.to_string(),
            rejected_by: admin.email.clone(),
            admin_notes: clean(admin_notes),
        };

        let Some(updated) = self
            .users
            .reject(user.id, Action::Reject.sources(), &rejection, Utc::now())
            .await?
        else {
            let current = self.get(user_id).await?;
            transition(current.status, Action::Reject)?;
            return Err(AppError::Conflict(
                "Registration changed while being reviewed".to_string(),
            ));
        };

        info!(user_id = %updated.id, admin = %admin.email, reason = %reason, "Payment rejected");
        if let Err(e) = self.notifier.registration_rejected(&updated, reason).await {
            warn!(user_id = %updated.id, error = %e, "Notification failed");
        }
        Ok(updated)
    }

    /// Best effort: every id is approved independently and reported on its own.
    pub async fn bulk_approve(
        &self,
        user_ids: &[Uuid],
        admin: &Admin,
        admin_notes: Option<String>,
    ) -> AppResult<BulkReport> {
        let ids = bulk_ids(user_ids)?;
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = self.approve(id, admin, admin_notes.clone()).await;
            results.push(bulk_item(id, outcome));
        }
        Ok(BulkReport::from_results(results))
    }

    pub async fn bulk_reject(
        &self,
        user_ids: &[Uuid],
        admin: &Admin,
        reason: &str,
    ) -> AppResult<BulkReport> {
        let ids = bulk_ids(user_ids)?;
        require_reason(reason)?;
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = self.reject(id, admin, reason, None).await;
            results.push(bulk_item(id, outcome));
        }
        Ok(BulkReport::from_results(results))
    }

    pub async fn list_users(
        &self,
        page: Option<i64>,
        limit: Option<i64>,
        search: Option<&str>,
    ) -> AppResult<UserPage> {
        let term = search
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(String::from);

        let cap = if term.is_some() {
            MAX_SEARCH_RESULTS
        } else {
            MAX_PAGE_SIZE
        };
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, cap);
        let offset = (page - 1)
            .checked_mul(limit)
            .ok_or_else(|| AppError::ValidationError("page is out of range".to_string()))?;

        let query = UserSearch {
            term,
            offset,
            limit,
        };
        let (users, total) = self.users.search(&query).await?;
        let stats = self.users.status_counts().await?;

        Ok(UserPage {
            stats,
            users,
            pagination: Pagination {
                page,
                limit,
                total,
                total_pages: (total + limit - 1) / limit,
            },
        })
    }

    pub async fn export(&self) -> AppResult<Vec<ExportRow>> {
        let users = self.users.list_all().await?;
        Ok(users.into_iter().map(ExportRow::from).collect())
    }

    pub async fn stats(&self) -> AppResult<DashboardStats> {
        let counts = self.users.status_counts().await?;
        let recent = self.users.recently_updated(RECENT_ACTIVITY_LIMIT).await?;

        Ok(DashboardStats {
            total: counts.total(),
            pending_payment: counts.pending_payment,
            pending_verification: counts.pending_verification,
            approved: counts.approved,
            rejected: counts.rejected,
            paid: counts.paid,
            total_revenue: counts.total_revenue,
            recent_activity: recent.iter().map(ActivityEntry::from).collect(),
        })
    }
}

fn clean(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

fn require_reason(reason: &str) -> AppResult<&str> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::ValidationError(
            "Rejection reason is required".to_string(),
        ));
    }
    Ok(reason)
}

/// De-duplicated ids in request order.
fn bulk_ids(user_ids: &[Uuid]) -> AppResult<Vec<Uuid>> {
    if user_ids.is_empty() {
        return Err(AppError::ValidationError(
            "At least one user id is required".to_string(),
        ));
    }
    if user_ids.len() > MAX_BULK_ITEMS {
        return Err(AppError::ValidationError(format!(
            "At most {} users can be processed at once",
            MAX_BULK_ITEMS
        )));
    }
    let mut seen = HashSet::new();
    Ok(user_ids.iter().copied().filter(|id| seen.insert(*id)).collect())
}

fn bulk_item(user_id: Uuid, outcome: AppResult<User>) -> BulkItem {
    match outcome {
        Ok(_) => BulkItem {
            user_id,
            success: true,
            error: None,
        },
        Err(e) => BulkItem {
            user_id,
            success: false,
            error: Some(e.public_message()),
        },
    }
}
