use serde::{Deserialize, Serialize};

/// The event tickets are issued for. Embedded in every QR payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetails {
    pub name: String,
    pub date: String,
    pub venue: String,
}
