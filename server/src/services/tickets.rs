//! Ticket issuance shared by the gateway confirmation path and admin approval.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::models::ticket::generate_ticket_id;
use crate::models::{EventDetails, QrPayload, User};
use crate::services::lifecycle::{transition, Action};
use crate::store::{StoreError, TicketIssue, UserStore};
use crate::utils::error::{AppError, AppResult};

const MAX_TICKET_ID_ATTEMPTS: usize = 5;

/// Recorded as `approved_by` when the gateway confirmed the charge on its own.
pub const GATEWAY_VERIFIER: &str = "payment-gateway";

/// Inputs for one issuance attempt.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub action: Action,
    pub verified_by: String,
    pub amount: Option<Decimal>,
    pub payment_date: DateTime<Utc>,
    pub admin_notes: Option<String>,
}

#[derive(Clone)]
pub struct TicketIssuer {
    users: Arc<dyn UserStore>,
    event: EventDetails,
}

impl TicketIssuer {
    pub fn new(users: Arc<dyn UserStore>, event: EventDetails) -> Self {
        Self { users, event }
    }

    /// Issues a ticket to `user` if it is still unpaid and in a state `request.action`
    /// accepts. Returns `Ok(None)` when another caller changed the row first.
    pub async fn issue(&self, user: &User, request: &IssueRequest) -> AppResult<Option<User>> {
        transition(user.status, request.action)?;

        for attempt in 1..=MAX_TICKET_ID_ATTEMPTS {
            let ticket_id = generate_ticket_id();
            let payload = self.payload(user, &ticket_id, &request.verified_by);
            let image = payload
                .render()
                .map_err(|e| AppError::InternalServerError(e.to_string()))?;

            let issue = TicketIssue {
                ticket_id,
                qr_code_data: payload,
                qr_code_image: image,
                amount: request.amount,
                payment_date: request.payment_date,
                approved_by: request.verified_by.clone(),
                admin_notes: request.admin_notes.clone(),
            };

            match self
                .users
                .issue_ticket(user.id, request.action.sources(), &issue, Utc::now())
                .await
            {
                Ok(Some(updated)) => {
                    info!(
                        user_id = %updated.id,
                        ticket_id = %issue.ticket_id,
                        verified_by = %request.verified_by,
                        "Ticket issued"
                    );
                    return Ok(Some(updated));
                }
                Ok(None) => return Ok(None),
                Err(StoreError::Duplicate("ticket id")) => {
                    warn!(user_id = %user.id, attempt, "Ticket id collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::InternalServerError(
            "could not allocate a unique ticket id".to_string(),
        ))
    }

    fn payload(&self, user: &User, ticket_id: &str, verified_by: &str) -> QrPayload {
        QrPayload {
            ticket_id: ticket_id.to_string(),
            user_id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            level: user.level.to_string(),
            event: self.event.name.clone(),
            date: self.event.date.clone(),
            verified_by: verified_by.to_string(),
        }
    }
}
