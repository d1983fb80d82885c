use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::ticket::QrPayload;

/// Where a registration sits in the payment and review lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "registration_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    PendingPayment,
    PendingVerification,
    Approved,
    Rejected,
}

impl RegistrationStatus {
    pub const ALL: [RegistrationStatus; 4] = [
        RegistrationStatus::PendingPayment,
        RegistrationStatus::PendingVerification,
        RegistrationStatus::Approved,
        RegistrationStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::PendingPayment => "pending_payment",
            RegistrationStatus::PendingVerification => "pending_verification",
            RegistrationStatus::Approved => "approved",
            RegistrationStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attendee category. Drives the ticket price and travels as a string on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attendee_level")]
pub enum Level {
    #[serde(rename = "100")]
    #[sqlx(rename = "100")]
    L100,
    #[serde(rename = "200")]
    #[sqlx(rename = "200")]
    L200,
    #[serde(rename = "300")]
    #[sqlx(rename = "300")]
    L300,
    #[serde(rename = "400")]
    #[sqlx(rename = "400")]
    L400,
    #[serde(rename = "500")]
    #[sqlx(rename = "500")]
    L500,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::L100 => "100",
            Level::L200 => "200",
            Level::L300 => "300",
            Level::L400 => "400",
            Level::L500 => "500",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "100" => Ok(Level::L100),
            "200" => Ok(Level::L200),
            "300" => Ok(Level::L300),
            "400" => Ok(Level::L400),
            "500" => Ok(Level::L500),
            other => Err(format!("'{}' is not a valid level", other)),
        }
    }
}

/// A registrant and everything the system knows about their payment and ticket.
///
/// `ticket_id` and `qr_code_data` are present exactly when `status` is
/// [`RegistrationStatus::Approved`].
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub level: Level,
    pub amount: Decimal,
    pub payment_reference: Option<String>,
    #[serde(skip_serializing)]
    pub authorization_url: Option<String>,
    #[serde(skip_serializing)]
    pub access_code: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub paid: bool,
    pub receipt_url: Option<String>,
    pub ticket_id: Option<String>,
    pub qr_code_data: Option<Json<QrPayload>>,
    pub qr_code_image: Option<String>,
    pub status: RegistrationStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn qr_payload(&self) -> Option<&QrPayload> {
        self.qr_code_data.as_ref().map(|json| &json.0)
    }
}
