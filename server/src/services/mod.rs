pub mod admin_auth;
pub mod gateway;
pub mod lifecycle;
pub mod notifier;
pub mod registration;
pub mod review;
pub mod tickets;

pub use admin_auth::AdminAuthService;
pub use gateway::{PaymentGateway, PaystackClient};
pub use notifier::{LogNotifier, Notifier};
pub use registration::RegistrationService;
pub use review::ReviewService;
pub use tickets::TicketIssuer;
