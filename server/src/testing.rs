//! In-process doubles for the store, gateway and notifier ports.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use sqlx::types::Json;
use uuid::Uuid;

use crate::config::Config;
use crate::models::{
    Admin, GatewayTransaction, Level, PaymentCheckout, RegistrationStatus, TransactionStatus, User,
};
use crate::services::gateway::{
    sign, verify_signature, GatewayError, GatewayResult, InitializeTransaction, PaymentGateway,
};
use crate::services::notifier::{Notifier, NotifyError};
use crate::state::AppState;
use crate::store::{
    AdminStore, NewAdmin, NewUser, Rejection, StatusCounts, StoreError, StoreResult, TicketIssue,
    UserSearch, UserStore,
};

pub const WEBHOOK_SECRET: &str = "sk_test_secret";

pub fn webhook_signature(body: &[u8]) -> String {
    sign(&SecretString::from(WEBHOOK_SECRET.to_string()), body).unwrap()
}

pub fn new_user(name: &str, email: &str) -> NewUser {
    NewUser {
        name: name.to_string(),
        email: email.to_string(),
        phone: Some("08012345678".to_string()),
        level: Level::L300,
        amount: Decimal::new(3500, 0),
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
    ticket_collisions: AtomicUsize,
}

impl MemoryUserStore {
    /// Makes the next `n` ticket writes fail as if the id were taken.
    pub fn force_ticket_collisions(&self, n: usize) {
        self.ticket_collisions.store(n, Ordering::SeqCst);
    }

    /// Replaces a stored user wholesale, bypassing every guard.
    pub fn overwrite(&self, user: User) {
        let mut users = self.users.lock().unwrap();
        if let Some(slot) = users.iter_mut().find(|u| u.id == user.id) {
            *slot = user;
        } else {
            users.push(user);
        }
    }

    pub fn snapshot(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }

    fn update<F>(&self, id: Uuid, guard: impl Fn(&User) -> bool, apply: F) -> Option<User>
    where
        F: FnOnce(&mut User),
    {
        let mut users = self.users.lock().unwrap();
        let user = users.iter_mut().find(|u| u.id == id)?;
        if !guard(user) {
            return None;
        }
        apply(user);
        Some(user.clone())
    }
}

fn matches(user: &User, term: &str) -> bool {
    let term = term.to_lowercase();
    [
        Some(user.name.as_str()),
        Some(user.email.as_str()),
        user.ticket_id.as_deref(),
        user.payment_reference.as_deref(),
        user.phone.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(&term))
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, new: NewUser) -> StoreResult<User> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == new.email) {
            return Err(StoreError::Duplicate("email"));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            phone: new.phone,
            level: new.level,
            amount: new.amount,
            payment_reference: None,
            authorization_url: None,
            access_code: None,
            payment_date: None,
            paid: false,
            receipt_url: None,
            ticket_id: None,
            qr_code_data: None,
            qr_code_image: None,
            status: RegistrationStatus::PendingPayment,
            approved_at: None,
            approved_by: None,
            rejected_at: None,
            rejected_by: None,
            rejection_reason: None,
            admin_notes: None,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.snapshot(id))
    }

    async fn find_by_reference(&self, reference: &str) -> StoreResult<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .find(|u| u.payment_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn find_by_ticket_id(&self, ticket_id: &str) -> StoreResult<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .find(|u| u.ticket_id.as_deref() == Some(ticket_id))
            .cloned())
    }

    async fn attach_checkout(
        &self,
        id: Uuid,
        from: &[RegistrationStatus],
        checkout: &PaymentCheckout,
    ) -> StoreResult<Option<User>> {
        Ok(self.update(
            id,
            |u| !u.paid && u.payment_reference.is_none() && from.contains(&u.status),
            |u| {
                u.payment_reference = Some(checkout.reference.clone());
                u.authorization_url = Some(checkout.authorization_url.clone());
                u.access_code = Some(checkout.access_code.clone());
                u.updated_at = Utc::now();
            },
        ))
    }

    async fn attach_receipt(
        &self,
        id: Uuid,
        from: &[RegistrationStatus],
        receipt_url: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<User>> {
        Ok(self.update(
            id,
            |u| !u.paid && from.contains(&u.status),
            |u| {
                u.receipt_url = Some(receipt_url.to_string());
                u.payment_date = Some(at);
                u.status = RegistrationStatus::PendingVerification;
                u.updated_at = at;
            },
        ))
    }

    async fn issue_ticket(
        &self,
        id: Uuid,
        from: &[RegistrationStatus],
        issue: &TicketIssue,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<User>> {
        let pending = self.ticket_collisions.load(Ordering::SeqCst);
        if pending > 0 {
            self.ticket_collisions.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Duplicate("ticket id"));
        }
        if self.find_by_ticket_id(&issue.ticket_id).await?.is_some() {
            return Err(StoreError::Duplicate("ticket id"));
        }

        Ok(self.update(
            id,
            |u| !u.paid && u.ticket_id.is_none() && from.contains(&u.status),
            |u| {
                u.paid = true;
                if let Some(amount) = issue.amount {
                    u.amount = amount;
                }
                u.payment_date = Some(issue.payment_date);
                u.ticket_id = Some(issue.ticket_id.clone());
                u.qr_code_data = Some(Json(issue.qr_code_data.clone()));
                u.qr_code_image = Some(issue.qr_code_image.clone());
                u.status = RegistrationStatus::Approved;
                u.approved_at = Some(at);
                u.approved_by = Some(issue.approved_by.clone());
                if issue.admin_notes.is_some() {
                    u.admin_notes = issue.admin_notes.clone();
                }
                u.updated_at = at;
            },
        ))
    }

    async fn reject(
        &self,
        id: Uuid,
        from: &[RegistrationStatus],
        rejection: &Rejection,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<User>> {
        Ok(self.update(
            id,
            |u| from.contains(&u.status),
            |u| {
                u.status = RegistrationStatus::Rejected;
                u.rejected_at = Some(at);
                u.rejected_by = Some(rejection.rejected_by.clone());
                u.rejection_reason = Some(rejection.reason.clone());
                if rejection.admin_notes.is_some() {
                    u.admin_notes = rejection.admin_notes.clone();
                }
                u.updated_at = at;
            },
        ))
    }

    async fn list_by_status(&self, status: RegistrationStatus) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.status == status)
            .cloned()
            .collect();
        users.sort_by_key(|u| (u.payment_date.is_none(), u.payment_date, u.created_at));
        Ok(users)
    }

    async fn search(&self, query: &UserSearch) -> StoreResult<(Vec<User>, i64)> {
        let mut found: Vec<User> = self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| query.term.as_deref().map_or(true, |term| matches(u, term)))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = found.len() as i64;
        let page = found
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_all(&self) -> StoreResult<Vec<User>> {
        Ok(self.users.lock().unwrap().clone())
    }

    async fn status_counts(&self) -> StoreResult<StatusCounts> {
        let mut counts = StatusCounts::default();
        for user in self.users.lock().unwrap().iter() {
            counts.add(user.status, 1);
            if user.paid {
                counts.paid += 1;
                counts.total_revenue += user.amount;
            }
        }
        Ok(counts)
    }

    async fn recently_updated(&self, limit: i64) -> StoreResult<Vec<User>> {
        let mut users = self.users.lock().unwrap().clone();
        users.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        users.truncate(limit as usize);
        Ok(users)
    }
}

#[derive(Default)]
pub struct MemoryAdminStore {
    admins: Mutex<Vec<Admin>>,
    sessions: Mutex<HashMap<String, (Uuid, DateTime<Utc>)>>,
}

impl MemoryAdminStore {
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[async_trait]
impl AdminStore for MemoryAdminStore {
    async fn insert(&self, new: NewAdmin) -> StoreResult<Admin> {
        let mut admins = self.admins.lock().unwrap();
        if admins.iter().any(|a| a.email == new.email) {
            return Err(StoreError::Duplicate("email"));
        }
        let now = Utc::now();
        let admin = Admin {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            is_active: true,
            last_login: None,
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
        };
        admins.push(admin.clone());
        Ok(admin)
    }

    async fn count(&self) -> StoreResult<i64> {
        Ok(self.admins.lock().unwrap().len() as i64)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Admin>> {
        Ok(self.admins.lock().unwrap().iter().find(|a| a.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Admin>> {
        Ok(self
            .admins
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(admin) = self.admins.lock().unwrap().iter_mut().find(|a| a.id == id) {
            admin.last_login = Some(at);
        }
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> StoreResult<Option<Admin>> {
        let mut admins = self.admins.lock().unwrap();
        Ok(admins.iter_mut().find(|a| a.id == id).map(|admin| {
            admin.is_active = active;
            admin.clone()
        }))
    }

    async fn create_session(
        &self,
        token_hash: &str,
        admin_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.sessions
            .lock()
            .unwrap()
            .insert(token_hash.to_string(), (admin_id, expires_at));
        Ok(())
    }

    async fn find_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Admin>> {
        let session = self.sessions.lock().unwrap().get(token_hash).copied();
        match session {
            Some((admin_id, expires_at)) if expires_at > now => self.find_by_id(admin_id).await,
            _ => Ok(None),
        }
    }

    async fn delete_session(&self, token_hash: &str) -> StoreResult<()> {
        self.sessions.lock().unwrap().remove(token_hash);
        Ok(())
    }

    async fn delete_sessions_for(&self, admin_id: Uuid) -> StoreResult<()> {
        self.sessions
            .lock()
            .unwrap()
            .retain(|_, (owner, _)| *owner != admin_id);
        Ok(())
    }
}

/// Gateway whose transactions are scripted by the test.
#[derive(Default)]
pub struct StubGateway {
    transactions: Mutex<HashMap<String, GatewayTransaction>>,
    initialize_calls: AtomicUsize,
    verify_calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl StubGateway {
    /// Records `reference` as successfully charged for `amount_minor`.
    pub fn succeed(&self, reference: &str, amount_minor: i64) {
        self.set_status(reference, TransactionStatus::Success, amount_minor);
    }

    pub fn set_status(&self, reference: &str, status: TransactionStatus, amount_minor: i64) {
        self.transactions.lock().unwrap().insert(
            reference.to_string(),
            GatewayTransaction {
                reference: reference.to_string(),
                status,
                amount_minor,
                currency: "NGN".to_string(),
                channel: Some("card".to_string()),
                paid_at: Some(Utc::now()),
            },
        );
    }

    pub fn go_down(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn initialize(&self, request: &InitializeTransaction) -> GatewayResult<PaymentCheckout> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::Timeout);
        }
        let n = self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        self.set_status(&request.reference, TransactionStatus::Pending, 0);
        Ok(PaymentCheckout {
            authorization_url: format!("https://checkout.test/{}", request.reference),
            access_code: format!("ac_{n}"),
            reference: request.reference.clone(),
        })
    }

    async fn verify(&self, reference: &str) -> GatewayResult<GatewayTransaction> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::Timeout);
        }
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.transactions
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| GatewayError::Api {
                status: 404,
                message: "Transaction reference not found".to_string(),
            })
    }

    fn authenticate_webhook(&self, body: &[u8], signature: Option<&str>) -> GatewayResult<()> {
        let signature = signature.ok_or(GatewayError::InvalidSignature)?;
        verify_signature(&SecretString::from(WEBHOOK_SECRET.to_string()), body, signature)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn ticket_issued(&self, user: &User) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push(format!("ticket:{}", user.email));
        Ok(())
    }

    async fn receipt_received(&self, user: &User) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push(format!("receipt:{}", user.email));
        Ok(())
    }

    async fn registration_rejected(&self, user: &User, _reason: &str) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push(format!("rejected:{}", user.email));
        Ok(())
    }
}

/// Application state wired to in-memory doubles, with handles to inspect them.
pub struct TestApp {
    pub state: AppState,
    pub users: Arc<MemoryUserStore>,
    pub admins: Arc<MemoryAdminStore>,
    pub gateway: Arc<StubGateway>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestApp {
    pub fn new() -> Self {
        let users = Arc::new(MemoryUserStore::default());
        let admins = Arc::new(MemoryAdminStore::default());
        let gateway = Arc::new(StubGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let state = AppState::new(
            Arc::new(Config::for_tests()),
            users.clone(),
            admins.clone(),
            gateway.clone(),
            notifier.clone(),
        );

        Self {
            state,
            users,
            admins,
            gateway,
            notifier,
        }
    }

    /// Registers a user and moves them to `pending_verification` via a receipt.
    pub async fn user_awaiting_review(&self, name: &str, email: &str) -> User {
        let user = self
            .state
            .registration
            .register(new_user(name, email))
            .await
            .unwrap();
        self.state
            .registration
            .upload_receipt(user.id, "https://files.test/receipt.jpg")
            .await
            .unwrap()
    }

    /// Creates an active admin directly in the store.
    pub async fn admin(&self, email: &str) -> Admin {
        self.admins
            .insert(NewAdmin {
                name: "Reviewer".to_string(),
                email: email.to_string(),
                password_hash: String::new(),
                role: crate::models::AdminRole::Admin,
                created_by: None,
            })
            .await
            .unwrap()
    }
}
