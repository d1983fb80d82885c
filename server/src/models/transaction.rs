use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What the attendee needs to complete payment on the gateway's hosted page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCheckout {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Success,
    Failed,
    Abandoned,
    Pending,
    Reversed,
    #[serde(other)]
    Unknown,
}

/// A transaction as reported by the payment gateway.
#[derive(Debug, Clone)]
pub struct GatewayTransaction {
    pub reference: String,
    pub status: TransactionStatus,
    /// Amount in the currency's minor unit (kobo for NGN).
    pub amount_minor: i64,
    pub currency: String,
    pub channel: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl GatewayTransaction {
    pub fn is_successful(&self) -> bool {
        self.status == TransactionStatus::Success
    }

    pub fn amount(&self) -> Decimal {
        Decimal::new(self.amount_minor, 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_minor_units_back_to_major() {
        let tx = GatewayTransaction {
            reference: "TICKET-1-abcdef01".to_string(),
            status: TransactionStatus::Success,
            amount_minor: 350_000,
            currency: "NGN".to_string(),
            channel: None,
            paid_at: None,
        };
        assert_eq!(tx.amount(), Decimal::new(3500, 0));
        assert!(tx.is_successful());
    }

    #[test]
    fn unknown_gateway_status_is_not_success() {
        let status: TransactionStatus = serde_json::from_str("\"queued\"").unwrap();
        assert_eq!(status, TransactionStatus::Unknown);
    }
}
