use std::sync::Arc;

use crate::config::Config;
use crate::services::{
    AdminAuthService, Notifier, PaymentGateway, RegistrationService, ReviewService, TicketIssuer,
};
use crate::store::{AdminStore, UserStore};

/// Shared handler state. Cloned per request; everything inside is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registration: RegistrationService,
    pub review: ReviewService,
    pub admin_auth: AdminAuthService,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        users: Arc<dyn UserStore>,
        admins: Arc<dyn AdminStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let issuer = TicketIssuer::new(users.clone(), config.event.clone());
        let registration =
            RegistrationService::new(users.clone(), gateway, notifier.clone(), issuer.clone());
        let review = ReviewService::new(users, notifier, issuer);
        let admin_auth = AdminAuthService::new(admins, config.admin_session_ttl);

        Self {
            config,
            registration,
            review,
            admin_auth,
        }
    }
}
