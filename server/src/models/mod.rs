pub mod admin;
pub mod event;
pub mod ticket;
pub mod transaction;
pub mod user;

pub use admin::{Admin, AdminRole, AdminSummary};
pub use event::EventDetails;
pub use ticket::QrPayload;
pub use transaction::{GatewayTransaction, PaymentCheckout, TransactionStatus};
pub use user::{Level, RegistrationStatus, User};
