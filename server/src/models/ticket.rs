use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use qrcode::render::svg;
use qrcode::QrCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const TICKET_PREFIX: &str = "TKT";
const REFERENCE_PREFIX: &str = "TICKET";
const QR_MIN_DIMENSION: u32 = 240;

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("failed to encode QR payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("failed to render QR code: {0}")]
    Render(#[from] qrcode::types::QrError),
}

/// Data scanned at the door. `ticket_id` is what the verifier looks up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub ticket_id: String,
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub level: String,
    pub event: String,
    pub date: String,
    pub verified_by: String,
}

impl QrPayload {
    /// Renders the payload as an SVG QR code wrapped in a `data:` URL.
    pub fn render(&self) -> Result<String, TicketError> {
        let json = serde_json::to_vec(self)?;
        let code = QrCode::new(json)?;
        let image = code
            .render::<svg::Color<'_>>()
            .min_dimensions(QR_MIN_DIMENSION, QR_MIN_DIMENSION)
            .build();

        Ok(format!(
            "data:image/svg+xml;base64,{}",
            STANDARD.encode(image.as_bytes())
        ))
    }
}

/// `TKT-<unix millis>-<8 uppercase hex>`. Uniqueness is enforced by storage.
pub fn generate_ticket_id() -> String {
    format!(
        "{}-{}-{}",
        TICKET_PREFIX,
        Utc::now().timestamp_millis(),
        hex::encode_upper(rand::random::<[u8; 4]>())
    )
}

/// `TICKET-<unix millis>-<8 lowercase hex>`, sent to the gateway as the transaction reference.
pub fn generate_payment_reference() -> String {
    format!(
        "{}-{}-{}",
        REFERENCE_PREFIX,
        Utc::now().timestamp_millis(),
        hex::encode(rand::random::<[u8; 4]>())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> QrPayload {
        QrPayload {
            ticket_id: "TKT-1700000000000-0A1B2C3D".to_string(),
            user_id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: "ada@x.com".to_string(),
            level: "300".to_string(),
            event: "Tech Summit".to_string(),
            date: "2026-11-20".to_string(),
            verified_by: "payment-gateway".to_string(),
        }
    }

    #[test]
    fn ticket_ids_have_expected_shape() {
        let id = generate_ticket_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "TKT");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn references_start_with_ticket_prefix() {
        let reference = generate_payment_reference();
        assert!(reference.starts_with("TICKET-"));
        assert_ne!(reference, generate_payment_reference());
    }

    #[test]
    fn payload_uses_camel_case_keys() {
        let value = serde_json::to_value(payload()).unwrap();
        assert!(value.get("ticketId").is_some());
        assert!(value.get("userId").is_some());
        assert!(value.get("verifiedBy").is_some());
    }

    #[test]
    fn renders_svg_data_url() {
        let image = payload().render().unwrap();
        assert!(image.starts_with("data:image/svg+xml;base64,"));
    }
}
