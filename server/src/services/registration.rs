//! Attendee-facing flows: registration, payment, receipts and ticket lookups.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::ticket::generate_payment_reference;
use crate::models::{GatewayTransaction, PaymentCheckout, User};
use crate::services::gateway::{InitializeTransaction, PaymentGateway, WebhookEvent};
use crate::services::lifecycle::{transition, Action};
use crate::services::notifier::Notifier;
use crate::services::tickets::{IssueRequest, TicketIssuer, GATEWAY_VERIFIER};
use crate::store::{NewUser, StoreError, UserStore};
use crate::utils::error::{AppError, AppResult};

/// A scanned ticket that passed verification.
#[derive(Debug, Clone)]
pub struct TicketCheck {
    pub user: User,
    pub verified_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct RegistrationService {
    users: Arc<dyn UserStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    issuer: TicketIssuer,
}

impl RegistrationService {
    pub fn new(
        users: Arc<dyn UserStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        issuer: TicketIssuer,
    ) -> Self {
        Self {
            users,
            gateway,
            notifier,
            issuer,
        }
    }

    pub async fn register(&self, registration: NewUser) -> AppResult<User> {
        let user = self.users.insert(registration).await.map_err(|e| match e {
            StoreError::Duplicate(_) => {
                AppError::ValidationError("This email is already registered".to_string())
            }
            other => other.into(),
        })?;

        info!(user_id = %user.id, level = %user.level, "Registration created");
        Ok(user)
    }

    pub async fn get(&self, user_id: Uuid) -> AppResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Starts a gateway transaction for an unpaid user.
    ///
    /// A user who already has a reference gets the stored checkout back, so the
    /// reference assigned on the first call is the only one the user ever has.
    pub async fn initialize_payment(
        &self,
        user_id: Uuid,
        email: Option<&str>,
    ) -> AppResult<PaymentCheckout> {
        let user = self.get(user_id).await?;

        if let Some(email) = email {
            if !email.trim().eq_ignore_ascii_case(&user.email) {
                return Err(AppError::ValidationError(
                    "Email does not match this registration".to_string(),
                ));
            }
        }

        if user.paid {
            return Err(AppError::Conflict("User has already paid".to_string()));
        }
        if let Some(checkout) = stored_checkout(&user) {
            return Ok(checkout);
        }
        transition(user.status, Action::InitializePayment)?;

        let reference = generate_payment_reference();
        let request = InitializeTransaction {
            email: user.email.clone(),
            amount: user.amount,
            reference: reference.clone(),
            name: user.name.clone(),
            level: user.level.to_string(),
        };

        let mut checkout = self.gateway.initialize(&request).await.map_err(|e| {
            error!(user_id = %user.id, error = %e, "Payment initialization failed");
            AppError::from(e)
        })?;

        if checkout.reference != reference {
            warn!(
                expected = %reference,
                returned = %checkout.reference,
                "Gateway returned a different reference"
            );
            checkout.reference = reference;
        }

        let sources = Action::InitializePayment.sources();
        if self
            .users
            .attach_checkout(user.id, sources, &checkout)
            .await?
            .is_some()
        {
            info!(user_id = %user.id, reference = %checkout.reference, "Payment initialized");
            return Ok(checkout);
        }

        // Lost a race with a concurrent initialization or payment.
        let current = self.get(user_id).await?;
        if current.paid {
            return Err(AppError::Conflict("User has already paid".to_string()));
        }
        match stored_checkout(&current) {
            Some(existing) => {
                warn!(
                    user_id = %current.id,
                    orphaned = %checkout.reference,
                    "Concurrent initialization, keeping the first reference"
                );
                Ok(existing)
            }
            None => {
                transition(current.status, Action::InitializePayment)?;
                Err(AppError::Conflict(
                    "Payment could not be initialized".to_string(),
                ))
            }
        }
    }

    /// Confirms `reference` with the gateway and issues the ticket on success.
    /// Repeated calls for a paid user return the ticket already issued.
    pub async fn verify_payment(&self, reference: &str, verified_by: &str) -> AppResult<User> {
        let user = self
            .users
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("No registration found for this payment reference".to_string())
            })?;

        if user.paid {
            return Ok(user);
        }

        let transaction = self.gateway.verify(reference).await.map_err(|e| {
            error!(reference = %reference, error = %e, "Payment verification failed");
            AppError::from(e)
        })?;

        if !transaction.is_successful() {
            return Err(AppError::ValidationError(format!(
                "Payment has not been completed (gateway status: {:?})",
                transaction.status
            )));
        }

        self.confirm(
            user,
            IssueRequest {
                action: Action::ConfirmPayment,
                verified_by: verified_by.to_string(),
                amount: Some(transaction.amount()),
                payment_date: transaction.paid_at.unwrap_or_else(Utc::now),
                admin_notes: None,
            },
        )
        .await
    }

    /// Authenticates and processes a webhook push.
    ///
    /// Only a bad signature is reported back; every other outcome is logged and the
    /// caller acknowledges the delivery.
    pub async fn handle_webhook(&self, body: &[u8], signature: Option<&str>) -> AppResult<()> {
        self.gateway.authenticate_webhook(body, signature)?;

        let event: WebhookEvent = match serde_json::from_slice(body) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Ignoring unparseable webhook payload");
                return Ok(());
            }
        };

        if !event.is_successful_charge() {
            info!(
                event = %event.event,
                reference = %event.data.reference,
                "Ignoring webhook event"
            );
            return Ok(());
        }

        if let Err(e) = self.process_successful_charge(&event).await {
            error!(
                reference = %event.data.reference,
                error = %e,
                "Webhook processing failed"
            );
        }
        Ok(())
    }

    async fn process_successful_charge(&self, event: &WebhookEvent) -> AppResult<()> {
        let reference = &event.data.reference;
        let Some(user) = self.users.find_by_reference(reference).await? else {
            warn!(reference = %reference, "Webhook for unknown reference");
            return Ok(());
        };

        if user.paid {
            info!(user_id = %user.id, "Webhook for already paid user, nothing to do");
            return Ok(());
        }

        let transaction = GatewayTransaction::from(event.data.clone());
        self.confirm(
            user,
            IssueRequest {
                action: Action::ConfirmPayment,
                verified_by: GATEWAY_VERIFIER.to_string(),
                amount: Some(transaction.amount()),
                payment_date: transaction.paid_at.unwrap_or_else(Utc::now),
                admin_notes: None,
            },
        )
        .await?;
        Ok(())
    }

    async fn confirm(&self, user: User, request: IssueRequest) -> AppResult<User> {
        if let Some(updated) = self.issuer.issue(&user, &request).await? {
            if let Err(e) = self.notifier.ticket_issued(&updated).await {
                warn!(user_id = %updated.id, error = %e, "Notification failed");
            }
            return Ok(updated);
        }

        // Another path got there first; hand back whatever it issued.
        let current = self.get(user.id).await?;
        if current.paid {
            Ok(current)
        } else {
            Err(AppError::Conflict(format!(
                "Registration is {} and cannot be confirmed",
                current.status
            )))
        }
    }

    /// Records proof of an out-of-band payment for admin review.
    pub async fn upload_receipt(&self, user_id: Uuid, receipt_url: &str) -> AppResult<User> {
        let user = self.get(user_id).await?;
        if user.paid {
            return Err(AppError::Conflict("User has already paid".to_string()));
        }
        transition(user.status, Action::SubmitReceipt)?;

        let updated = self
            .users
            .attach_receipt(
                user.id,
                Action::SubmitReceipt.sources(),
                receipt_url,
                Utc::now(),
            )
            .await?
            .ok_or_else(|| {
                AppError::Conflict("Registration changed, please check its status".to_string())
            })?;

        info!(user_id = %updated.id, "Receipt uploaded");
        if let Err(e) = self.notifier.receipt_received(&updated).await {
            warn!(user_id = %updated.id, error = %e, "Notification failed");
        }
        Ok(updated)
    }

    pub async fn ticket(&self, user_id: Uuid) -> AppResult<User> {
        let user = self.get(user_id).await?;
        if user.ticket_id.is_none() {
            return Err(AppError::Conflict(format!(
                "No ticket has been issued, registration is {}",
                user.status
            )));
        }
        Ok(user)
    }

    /// Door check for a scanned ticket.
    pub async fn verify_ticket(&self, ticket_id: &str) -> AppResult<TicketCheck> {
        let user = self
            .users
            .find_by_ticket_id(ticket_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?;

        if !user.paid {
            return Err(AppError::Conflict("Ticket has not been paid for".to_string()));
        }

        info!(ticket_id = %ticket_id, user_id = %user.id, "Ticket verified");
        Ok(TicketCheck {
            user,
            verified_at: Utc::now(),
        })
    }
}

fn stored_checkout(user: &User) -> Option<PaymentCheckout> {
    match (&user.payment_reference, &user.authorization_url, &user.access_code) {
        (Some(reference), Some(url), Some(code)) => Some(PaymentCheckout {
            authorization_url: url.clone(),
            access_code: code.clone(),
            reference: reference.clone(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RegistrationStatus, TransactionStatus};
    use crate::services::gateway::WebhookEvent;
    use crate::testing::{new_user, webhook_signature, TestApp};

    async fn registered(app: &TestApp) -> User {
        app.state
            .registration
            .register(new_user("Ada", "ada@x.com"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn register_starts_pending_payment() {
        let app = TestApp::new();
        let user = registered(&app).await;

        assert_eq!(user.status, RegistrationStatus::PendingPayment);
        assert!(!user.paid);
        assert!(user.ticket_id.is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_a_validation_error() {
        let app = TestApp::new();
        registered(&app).await;

        let err = app
            .state
            .registration
            .register(new_user("Ada Again", "ada@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn initialize_payment_stores_reference_once() {
        let app = TestApp::new();
        let user = registered(&app).await;
        let service = &app.state.registration;

        let first = service.initialize_payment(user.id, None).await.unwrap();
        assert!(first.reference.starts_with("TICKET-"));

        let second = service.initialize_payment(user.id, None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(app.gateway.initialize_calls(), 1);

        let stored = app.users.snapshot(user.id).unwrap();
        assert_eq!(stored.payment_reference, Some(first.reference));
        assert_eq!(stored.status, RegistrationStatus::PendingPayment);
    }

    #[tokio::test]
    async fn initialize_payment_rejects_mismatched_email() {
        let app = TestApp::new();
        let user = registered(&app).await;

        let err = app
            .state
            .registration
            .initialize_payment(user.id, Some("someone@else.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(app.gateway.initialize_calls(), 0);
    }

    #[tokio::test]
    async fn gateway_failure_leaves_user_untouched() {
        let app = TestApp::new();
        let user = registered(&app).await;
        app.gateway.go_down();

        let err = app
            .state
            .registration
            .initialize_payment(user.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExternalServiceError(_)));
        assert!(app.users.snapshot(user.id).unwrap().payment_reference.is_none());
    }

    #[tokio::test]
    async fn initialize_payment_for_unknown_user_is_not_found() {
        let app = TestApp::new();
        let err = app
            .state
            .registration
            .initialize_payment(Uuid::new_v4(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn successful_payment_issues_ticket() {
        let app = TestApp::new();
        let user = registered(&app).await;
        let service = &app.state.registration;
        let checkout = service.initialize_payment(user.id, None).await.unwrap();
        app.gateway.succeed(&checkout.reference, 350_000);

        let paid = service
            .verify_payment(&checkout.reference, GATEWAY_VERIFIER)
            .await
            .unwrap();

        assert!(paid.paid);
        assert_eq!(paid.status, RegistrationStatus::Approved);
        assert_eq!(paid.amount, rust_decimal::Decimal::new(3500, 0));
        let ticket_id = paid.ticket_id.clone().unwrap();
        assert_eq!(paid.qr_payload().unwrap().ticket_id, ticket_id);
        assert_eq!(paid.qr_payload().unwrap().user_id, user.id);
        assert_eq!(app.notifier.events(), vec!["ticket:ada@x.com".to_string()]);
    }

    #[tokio::test]
    async fn verify_payment_is_idempotent() {
        let app = TestApp::new();
        let user = registered(&app).await;
        let service = &app.state.registration;
        let checkout = service.initialize_payment(user.id, None).await.unwrap();
        app.gateway.succeed(&checkout.reference, 350_000);

        let first = service
            .verify_payment(&checkout.reference, GATEWAY_VERIFIER)
            .await
            .unwrap();
        let second = service
            .verify_payment(&checkout.reference, GATEWAY_VERIFIER)
            .await
            .unwrap();

        assert_eq!(first.ticket_id, second.ticket_id);
        assert_eq!(app.gateway.verify_calls(), 1);
        assert_eq!(app.notifier.events().len(), 1);
    }

    #[tokio::test]
    async fn unsuccessful_transaction_is_not_verified() {
        let app = TestApp::new();
        let user = registered(&app).await;
        let service = &app.state.registration;
        let checkout = service.initialize_payment(user.id, None).await.unwrap();
        app.gateway
            .set_status(&checkout.reference, TransactionStatus::Abandoned, 0);

        let err = service
            .verify_payment(&checkout.reference, GATEWAY_VERIFIER)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let stored = app.users.snapshot(user.id).unwrap();
        assert!(!stored.paid);
        assert!(stored.ticket_id.is_none());
    }

    #[tokio::test]
    async fn reinitializing_paid_user_conflicts() {
        let app = TestApp::new();
        let user = registered(&app).await;
        let service = &app.state.registration;
        let checkout = service.initialize_payment(user.id, None).await.unwrap();
        app.gateway.succeed(&checkout.reference, 350_000);
        service
            .verify_payment(&checkout.reference, GATEWAY_VERIFIER)
            .await
            .unwrap();

        let err = service.initialize_payment(user.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(
            app.users.snapshot(user.id).unwrap().payment_reference,
            Some(checkout.reference)
        );
    }

    fn charge_success(reference: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "event": WebhookEvent::CHARGE_SUCCESS,
            "data": {
                "reference": reference,
                "status": "success",
                "amount": 350000,
                "currency": "NGN",
                "channel": "card",
                "paid_at": "2026-10-01T10:00:00Z"
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn signed_webhook_issues_ticket_once() {
        let app = TestApp::new();
        let user = registered(&app).await;
        let service = &app.state.registration;
        let checkout = service.initialize_payment(user.id, None).await.unwrap();

        let body = charge_success(&checkout.reference);
        let signature = webhook_signature(&body);
        service.handle_webhook(&body, Some(&signature)).await.unwrap();
        let after_first = app.users.snapshot(user.id).unwrap();
        service.handle_webhook(&body, Some(&signature)).await.unwrap();
        let after_second = app.users.snapshot(user.id).unwrap();

        assert!(after_first.paid);
        assert_eq!(after_first.approved_by.as_deref(), Some(GATEWAY_VERIFIER));
        assert_eq!(after_first.ticket_id, after_second.ticket_id);
        assert_eq!(app.notifier.events().len(), 1);
    }

    #[tokio::test]
    async fn webhook_then_poll_returns_same_ticket() {
        let app = TestApp::new();
        let user = registered(&app).await;
        let service = &app.state.registration;
        let checkout = service.initialize_payment(user.id, None).await.unwrap();
        app.gateway.succeed(&checkout.reference, 350_000);

        let body = charge_success(&checkout.reference);
        service
            .handle_webhook(&body, Some(&webhook_signature(&body)))
            .await
            .unwrap();
        let polled = service
            .verify_payment(&checkout.reference, GATEWAY_VERIFIER)
            .await
            .unwrap();

        assert_eq!(polled.ticket_id, app.users.snapshot(user.id).unwrap().ticket_id);
    }

    #[tokio::test]
    async fn tampered_webhook_is_rejected_without_mutation() {
        let app = TestApp::new();
        let user = registered(&app).await;
        let service = &app.state.registration;
        let checkout = service.initialize_payment(user.id, None).await.unwrap();

        let signature = webhook_signature(&charge_success(&checkout.reference));
        let mut tampered = charge_success(&checkout.reference);
        tampered.extend_from_slice(b" ");

        let err = service
            .handle_webhook(&tampered, Some(&signature))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SignatureError(_)));

        let err = service.handle_webhook(&tampered, None).await.unwrap_err();
        assert!(matches!(err, AppError::SignatureError(_)));
        assert!(!app.users.snapshot(user.id).unwrap().paid);
    }

    #[tokio::test]
    async fn gateway_payment_time_replaces_receipt_upload_time() {
        let app = TestApp::new();
        let user = app.user_awaiting_review("Ada", "ada@x.com").await;
        let service = &app.state.registration;
        let checkout = service.initialize_payment(user.id, None).await.unwrap();

        let body = charge_success(&checkout.reference);
        service
            .handle_webhook(&body, Some(&webhook_signature(&body)))
            .await
            .unwrap();

        let paid_at: DateTime<Utc> = "2026-10-01T10:00:00Z".parse().unwrap();
        let stored = app.users.snapshot(user.id).unwrap();
        assert_eq!(stored.status, RegistrationStatus::Approved);
        assert_eq!(stored.payment_date, Some(paid_at));
    }

    #[tokio::test]
    async fn webhook_for_unknown_reference_is_acknowledged() {
        let app = TestApp::new();
        let body = charge_success("TICKET-0-deadbeef");
        let result = app
            .state
            .registration
            .handle_webhook(&body, Some(&webhook_signature(&body)))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn receipt_upload_moves_to_pending_verification() {
        let app = TestApp::new();
        let user = app.user_awaiting_review("Ada", "ada@x.com").await;

        assert_eq!(user.status, RegistrationStatus::PendingVerification);
        assert_eq!(user.receipt_url.as_deref(), Some("https://files.test/receipt.jpg"));
        assert!(user.payment_date.is_some());
        assert_eq!(app.notifier.events(), vec!["receipt:ada@x.com".to_string()]);
    }

    #[tokio::test]
    async fn ticket_lookup_requires_issued_ticket() {
        let app = TestApp::new();
        let user = registered(&app).await;

        let err = app.state.registration.ticket(user.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn verify_unknown_ticket_is_not_found() {
        let app = TestApp::new();
        let err = app
            .state
            .registration
            .verify_ticket("UNKNOWN-ID")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn verify_unpaid_ticket_conflicts() {
        let app = TestApp::new();
        let mut user = registered(&app).await;
        user.ticket_id = Some("TKT-1-00000000".to_string());
        app.users.overwrite(user);

        let err = app
            .state
            .registration
            .verify_ticket("TKT-1-00000000")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref msg) if msg.contains("not been paid")));
    }

    #[tokio::test]
    async fn verify_valid_ticket_returns_holder() {
        let app = TestApp::new();
        let user = registered(&app).await;
        let service = &app.state.registration;
        let checkout = service.initialize_payment(user.id, None).await.unwrap();
        app.gateway.succeed(&checkout.reference, 350_000);
        let paid = service
            .verify_payment(&checkout.reference, GATEWAY_VERIFIER)
            .await
            .unwrap();

        let check = service
            .verify_ticket(paid.ticket_id.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(check.user.id, user.id);
    }
}
