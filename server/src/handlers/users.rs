use std::str::FromStr;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::handlers::extractor::{ApiJson, ApiPath};
use crate::handlers::validation;
use crate::models::{Level, QrPayload, RegistrationStatus, User};
use crate::services::gateway::SIGNATURE_HEADER;
use crate::services::tickets::GATEWAY_VERIFIER;
use crate::state::AppState;
use crate::store::NewUser;
use crate::utils::error::{AppError, AppResult};
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub level: String,
    /// Accepted as a JSON string (`"3500"`) or number.
    pub amount: Value,
}

impl RegisterRequest {
    fn validate(self) -> AppResult<NewUser> {
        let name = validation::required("name", &self.name)?;
        let email = validation::email(&self.email)?;
        let level = Level::from_str(&self.level).map_err(AppError::ValidationError)?;
        let amount = parse_amount(&self.amount)?;

        Ok(NewUser {
            name,
            email,
            phone: validation::optional(self.phone),
            level,
            amount,
        })
    }
}

fn parse_amount(value: &Value) -> AppResult<Decimal> {
    let raw = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    };
    match Decimal::from_str(&raw) {
        Ok(amount) if amount > Decimal::ZERO => Ok(amount),
        _ => Err(AppError::ValidationError(
            "amount must be a positive number".to_string(),
        )),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisteredPayload {
    id: Uuid,
    ticket_id: Option<String>,
    status: RegistrationStatus,
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> AppResult<Response> {
    let user = state.registration.register(body.validate()?).await?;

    let payload = RegisteredPayload {
        id: user.id,
        ticket_id: user.ticket_id,
        status: user.status,
    };
    Ok(created(
        payload,
        "Registration successful. Proceed to payment to receive your ticket.",
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializePaymentRequest {
    pub user_id: Uuid,
    pub email: Option<String>,
}

pub async fn initialize_payment(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<InitializePaymentRequest>,
) -> AppResult<Response> {
    let email = validation::optional(body.email);
    let checkout = state
        .registration
        .initialize_payment(body.user_id, email.as_deref())
        .await?;

    Ok(success(checkout, "Payment initialized"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserDetails {
    id: Uuid,
    name: String,
    email: String,
    phone: Option<String>,
    level: Level,
    status: RegistrationStatus,
}

impl From<&User> for UserDetails {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            level: user.level,
            status: user.status,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentDetails {
    reference: Option<String>,
    amount: Decimal,
    paid: bool,
    payment_date: Option<DateTime<Utc>>,
}

impl From<&User> for PaymentDetails {
    fn from(user: &User) -> Self {
        Self {
            reference: user.payment_reference.clone(),
            amount: user.amount,
            paid: user.paid,
            payment_date: user.payment_date,
        }
    }
}

/// Ticket as handed back to its holder.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TicketPayload {
    ticket_id: Option<String>,
    qr_code_data: Option<QrPayload>,
    qr_code_image: Option<String>,
    user_details: UserDetails,
    payment_details: PaymentDetails,
}

impl From<&User> for TicketPayload {
    fn from(user: &User) -> Self {
        Self {
            ticket_id: user.ticket_id.clone(),
            qr_code_data: user.qr_payload().cloned(),
            qr_code_image: user.qr_code_image.clone(),
            user_details: UserDetails::from(user),
            payment_details: PaymentDetails::from(user),
        }
    }
}

pub async fn verify_payment(
    State(state): State<AppState>,
    ApiPath(reference): ApiPath<String>,
) -> AppResult<Response> {
    let user = state
        .registration
        .verify_payment(&reference, GATEWAY_VERIFIER)
        .await?;

    Ok(success(TicketPayload::from(&user), "Payment verified"))
}

#[derive(Debug, Serialize)]
struct WebhookAck {
    received: bool,
}

/// Authenticated deliveries are always acknowledged, whatever processing makes of them.
pub async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match state.registration.handle_webhook(&body, signature).await {
        Ok(()) => success(WebhookAck { received: true }, "Webhook received"),
        Err(e) => {
            warn!(error = %e, "Webhook rejected");
            e.into_response()
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TicketVerification {
    valid: bool,
    ticket_id: Option<String>,
    user_details: UserDetails,
    payment_details: PaymentDetails,
    verified_by: Option<String>,
    verification_time: DateTime<Utc>,
}

pub async fn verify_ticket(
    State(state): State<AppState>,
    ApiPath(ticket_id): ApiPath<String>,
) -> AppResult<Response> {
    let check = state.registration.verify_ticket(&ticket_id).await?;
    let user = &check.user;

    let payload = TicketVerification {
        valid: true,
        ticket_id: user.ticket_id.clone(),
        user_details: UserDetails::from(user),
        payment_details: PaymentDetails::from(user),
        verified_by: user.approved_by.clone(),
        verification_time: check.verified_at,
    };
    Ok(success(payload, "Ticket is valid"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusPayload {
    name: String,
    email: String,
    paid: bool,
    ticket_id: Option<String>,
    amount: Decimal,
    level: Level,
    status: RegistrationStatus,
    rejection_reason: Option<String>,
    receipt_url: Option<String>,
}

impl From<User> for StatusPayload {
    fn from(user: User) -> Self {
        Self {
            name: user.name,
            email: user.email,
            paid: user.paid,
            ticket_id: user.ticket_id,
            amount: user.amount,
            level: user.level,
            status: user.status,
            rejection_reason: user.rejection_reason,
            receipt_url: user.receipt_url,
        }
    }
}

pub async fn registration_status(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> AppResult<Response> {
    let user = state.registration.get(user_id).await?;

    Ok(success(StatusPayload::from(user), "Registration status retrieved"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceiptRequest {
    pub user_id: Uuid,
    pub receipt_url: String,
}

pub async fn upload_receipt(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<UploadReceiptRequest>,
) -> AppResult<Response> {
    let receipt_url = validation::http_url("receiptUrl", &body.receipt_url)?;
    let user = state
        .registration
        .upload_receipt(body.user_id, &receipt_url)
        .await?;

    Ok(success(
        StatusPayload::from(user),
        "Receipt received and awaiting review",
    ))
}

pub async fn ticket(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> AppResult<Response> {
    let user = state.registration.ticket(user_id).await?;
    Ok(success(TicketPayload::from(&user), "Ticket retrieved"))
}
