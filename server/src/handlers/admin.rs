use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::extractor::{
    ApiJson, ApiPath, ApiQuery, AuthenticatedAdmin, MaybeAdmin, OptionalJson,
};
use crate::handlers::users::TicketPayload;
use crate::handlers::validation;
use crate::models::{AdminRole, AdminSummary, Level, QrPayload, RegistrationStatus, User};
use crate::services::admin_auth::AdminRegistration;
use crate::services::review::{rows_to_csv, Pagination};
use crate::state::AppState;
use crate::store::StatusCounts;
use crate::utils::error::{AppError, AppResult};
use crate::utils::response::{created, empty_success, success};

#[derive(Debug, Deserialize)]
pub struct RegisterAdminRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<AdminRole>,
}

pub async fn register(
    State(state): State<AppState>,
    MaybeAdmin(actor): MaybeAdmin,
    ApiJson(body): ApiJson<RegisterAdminRequest>,
) -> AppResult<Response> {
    let registration = AdminRegistration {
        name: validation::required("name", &body.name)?,
        email: validation::email(&body.email)?,
        password: body.password,
        role: body.role.unwrap_or(AdminRole::Admin),
    };
    let admin = state
        .admin_auth
        .register(registration, actor.as_ref())
        .await?;

    Ok(created(admin.summary(), "Admin account created"))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginPayload {
    token: String,
    expires_at: DateTime<Utc>,
    admin: AdminSummary,
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> AppResult<Response> {
    let session = state.admin_auth.login(&body.email, &body.password).await?;

    let payload = LoginPayload {
        token: session.token,
        expires_at: session.expires_at,
        admin: session.admin.summary(),
    };
    Ok(success(payload, "Login successful"))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthenticatedAdmin,
) -> AppResult<Response> {
    state.admin_auth.logout(&auth.token).await?;
    Ok(empty_success("Logged out"))
}

pub async fn me(auth: AuthenticatedAdmin) -> Response {
    success(auth.admin.summary(), "Admin profile retrieved")
}

pub async fn deactivate_admin(
    State(state): State<AppState>,
    auth: AuthenticatedAdmin,
    ApiPath(admin_id): ApiPath<Uuid>,
) -> AppResult<Response> {
    let admin = state.admin_auth.deactivate(&auth.admin, admin_id).await?;
    Ok(success(admin.summary(), "Admin account deactivated"))
}

/// A registration as shown in review queues. QR data is left out.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReviewView {
    id: Uuid,
    name: String,
    email: String,
    phone: Option<String>,
    level: Level,
    amount: Decimal,
    status: RegistrationStatus,
    paid: bool,
    payment_reference: Option<String>,
    payment_date: Option<DateTime<Utc>>,
    receipt_url: Option<String>,
    ticket_id: Option<String>,
    rejection_reason: Option<String>,
    admin_notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<User> for ReviewView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            phone: user.phone,
            level: user.level,
            amount: user.amount,
            status: user.status,
            paid: user.paid,
            payment_reference: user.payment_reference,
            payment_date: user.payment_date,
            receipt_url: user.receipt_url,
            ticket_id: user.ticket_id,
            rejection_reason: user.rejection_reason,
            admin_notes: user.admin_notes,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct PendingPayload {
    count: usize,
    users: Vec<ReviewView>,
}

pub async fn pending_verifications(
    State(state): State<AppState>,
    _auth: AuthenticatedAdmin,
) -> AppResult<Response> {
    let users: Vec<ReviewView> = state
        .review
        .list_pending()
        .await?
        .into_iter()
        .map(ReviewView::from)
        .collect();

    let payload = PendingPayload {
        count: users.len(),
        users,
    };
    Ok(success(payload, "Pending verifications retrieved"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    pub admin_notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TicketDetails {
    ticket_id: Option<String>,
    qr_code_data: Option<QrPayload>,
    qr_code_image: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    approved_by: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApprovalPayload {
    ticket_details: TicketDetails,
    user: ReviewView,
}

/// The body is optional; an approval without notes may send none.
pub async fn approve(
    State(state): State<AppState>,
    auth: AuthenticatedAdmin,
    ApiPath(user_id): ApiPath<Uuid>,
    OptionalJson(body): OptionalJson<ApproveRequest>,
) -> AppResult<Response> {
    let body = body.unwrap_or_default();
    let user = state
        .review
        .approve(user_id, &auth.admin, body.admin_notes)
        .await?;

    let payload = ApprovalPayload {
        ticket_details: TicketDetails {
            ticket_id: user.ticket_id.clone(),
            qr_code_data: user.qr_payload().cloned(),
            qr_code_image: user.qr_code_image.clone(),
            approved_at: user.approved_at,
            approved_by: user.approved_by.clone(),
        },
        user: ReviewView::from(user),
    };
    Ok(success(payload, "Payment approved and ticket issued"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequest {
    #[serde(default)]
    pub rejection_reason: String,
    pub admin_notes: Option<String>,
}

pub async fn reject(
    State(state): State<AppState>,
    auth: AuthenticatedAdmin,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<RejectRequest>,
) -> AppResult<Response> {
    let user = state
        .review
        .reject(
            user_id,
            &auth.admin,
            &body.rejection_reason,
            body.admin_notes,
        )
        .await?;

    Ok(success(ReviewView::from(user), "Payment rejected"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkApproveRequest {
    pub user_ids: Vec<Uuid>,
    pub admin_notes: Option<String>,
}

pub async fn bulk_approve(
    State(state): State<AppState>,
    auth: AuthenticatedAdmin,
    ApiJson(body): ApiJson<BulkApproveRequest>,
) -> AppResult<Response> {
    let report = state
        .review
        .bulk_approve(&body.user_ids, &auth.admin, body.admin_notes)
        .await?;

    let message = format!("{} of {} approved", report.succeeded, report.processed);
    Ok(success(report, message))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRejectRequest {
    pub user_ids: Vec<Uuid>,
    #[serde(default)]
    pub rejection_reason: String,
}

pub async fn bulk_reject(
    State(state): State<AppState>,
    auth: AuthenticatedAdmin,
    ApiJson(body): ApiJson<BulkRejectRequest>,
) -> AppResult<Response> {
    let report = state
        .review
        .bulk_reject(&body.user_ids, &auth.admin, &body.rejection_reason)
        .await?;

    let message = format!("{} of {} rejected", report.succeeded, report.processed);
    Ok(success(report, message))
}

/// Manual gateway re-check, recorded against the admin who asked for it.
pub async fn verify_payment(
    State(state): State<AppState>,
    auth: AuthenticatedAdmin,
    ApiPath(reference): ApiPath<String>,
) -> AppResult<Response> {
    let user = state
        .registration
        .verify_payment(&reference, &auth.admin.email)
        .await?;

    Ok(success(TicketPayload::from(&user), "Payment verified"))
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
struct UserListPayload {
    stats: StatusCounts,
    users: Vec<ReviewView>,
    pagination: Pagination,
}

pub async fn list_users(
    State(state): State<AppState>,
    _auth: AuthenticatedAdmin,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> AppResult<Response> {
    let page = state
        .review
        .list_users(query.page, query.limit, query.search.as_deref())
        .await?;

    let payload = UserListPayload {
        stats: page.stats,
        users: page.users.into_iter().map(ReviewView::from).collect(),
        pagination: page.pagination,
    };
    Ok(success(payload, "Users retrieved"))
}

pub async fn user_detail(
    State(state): State<AppState>,
    _auth: AuthenticatedAdmin,
    ApiPath(user_id): ApiPath<Uuid>,
) -> AppResult<Response> {
    let user = state.review.user(user_id).await?;
    Ok(success(user, "User retrieved"))
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

pub async fn export(
    State(state): State<AppState>,
    _auth: AuthenticatedAdmin,
    ApiQuery(query): ApiQuery<ExportQuery>,
) -> AppResult<Response> {
    let format = query
        .format
        .as_deref()
        .map(|f| f.trim().to_ascii_lowercase())
        .unwrap_or_else(|| "json".to_string());

    let rows = state.review.export().await?;
    match format.as_str() {
        "json" => Ok(success(rows, "Export generated")),
        "csv" => {
            let body = rows_to_csv(&rows)?;
            Ok((
                StatusCode::OK,
                [
                    (CONTENT_TYPE, "text/csv; charset=utf-8"),
                    (
                        CONTENT_DISPOSITION,
                        "attachment; filename=\"registrations.csv\"",
                    ),
                ],
                body,
            )
                .into_response())
        }
        other => Err(AppError::ValidationError(format!(
            "Unsupported export format '{}'; use json or csv",
            other
        ))),
    }
}

pub async fn stats(
    State(state): State<AppState>,
    _auth: AuthenticatedAdmin,
) -> AppResult<Response> {
    let stats = state.review.stats().await?;
    Ok(success(stats, "Dashboard statistics retrieved"))
}
