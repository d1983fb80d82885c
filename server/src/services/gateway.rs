//! Payment gateway integration.
//!
//! [`PaymentGateway`] is the seam the registration service depends on;
//! [`PaystackClient`] implements it against the Paystack REST API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use crate::config::PaymentConfig;
use crate::models::{GatewayTransaction, PaymentCheckout, TransactionStatus};

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Header carrying the gateway's HMAC of the webhook body.
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway is not configured")]
    NotConfigured,

    #[error("payment gateway timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("gateway rejected request: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),

    #[error("webhook signature mismatch")]
    InvalidSignature,
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Http(err)
        }
    }
}

/// A payment intent handed to the gateway.
#[derive(Debug, Clone)]
pub struct InitializeTransaction {
    pub email: String,
    pub amount: Decimal,
    pub reference: String,
    pub name: String,
    pub level: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a remote transaction and returns the hosted checkout for it.
    async fn initialize(&self, request: &InitializeTransaction) -> GatewayResult<PaymentCheckout>;

    /// Fetches the gateway's view of the transaction with `reference`.
    async fn verify(&self, reference: &str) -> GatewayResult<GatewayTransaction>;

    /// Checks the signature on a raw webhook body.
    fn authenticate_webhook(&self, body: &[u8], signature: Option<&str>) -> GatewayResult<()>;
}

/// Converts a major-unit amount into the gateway's minor unit.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED).round().to_i64()
}

/// Lowercase hex HMAC-SHA512 of `body`.
pub fn sign(secret: &SecretString, body: &[u8]) -> GatewayResult<String> {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| GatewayError::NotConfigured)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies `signature` over `body` in constant time.
pub fn verify_signature(secret: &SecretString, body: &[u8], signature: &str) -> GatewayResult<()> {
    let expected = hex::decode(signature.trim()).map_err(|_| GatewayError::InvalidSignature)?;

    let mut mac = Hmac::<Sha512>::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| GatewayError::NotConfigured)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| GatewayError::InvalidSignature)?;

    debug!("Webhook signature verified");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
struct InitializeBody<'a> {
    email: &'a str,
    amount: i64,
    reference: &'a str,
    currency: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    metadata: InitializeMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct InitializeMetadata<'a> {
    name: &'a str,
    level: &'a str,
}

/// Transaction object as it appears in verify responses and webhook payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionData {
    pub reference: String,
    pub status: TransactionStatus,
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    pub channel: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<TransactionData> for GatewayTransaction {
    fn from(data: TransactionData) -> Self {
        GatewayTransaction {
            reference: data.reference,
            status: data.status,
            amount_minor: data.amount,
            currency: data.currency,
            channel: data.channel,
            paid_at: data.paid_at,
        }
    }
}

/// Body of a webhook push.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: TransactionData,
}

impl WebhookEvent {
    pub const CHARGE_SUCCESS: &'static str = "charge.success";

    pub fn is_successful_charge(&self) -> bool {
        self.event == Self::CHARGE_SUCCESS && self.data.status == TransactionStatus::Success
    }
}

#[derive(Clone)]
pub struct PaystackClient {
    client: Client,
    secret_key: Option<SecretString>,
    base_url: String,
    currency: String,
    callback_url: Option<String>,
}

impl std::fmt::Debug for PaystackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaystackClient")
            .field("secret_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("currency", &self.currency)
            .finish_non_exhaustive()
    }
}

impl PaystackClient {
    pub fn new(config: &PaymentConfig) -> GatewayResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            currency: config.currency.clone(),
            callback_url: config.callback_url.clone(),
        })
    }

    fn secret(&self) -> GatewayResult<&SecretString> {
        self.secret_key.as_ref().ok_or(GatewayError::NotConfigured)
    }

    async fn read_envelope<T>(response: reqwest::Response) -> GatewayResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %message, "Payment gateway error");
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        if !envelope.status {
            error!(message = %envelope.message, "Payment gateway reported failure");
            return Err(GatewayError::Api {
                status: StatusCode::OK.as_u16(),
                message: envelope.message,
            });
        }

        envelope
            .data
            .ok_or_else(|| GatewayError::InvalidResponse("missing data".to_string()))
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    #[instrument(skip(self, request), fields(reference = %request.reference))]
    async fn initialize(&self, request: &InitializeTransaction) -> GatewayResult<PaymentCheckout> {
        let secret = self.secret()?;
        let amount = to_minor_units(request.amount)
            .ok_or_else(|| GatewayError::InvalidResponse("amount out of range".to_string()))?;

        let body = InitializeBody {
            email: &request.email,
            amount,
            reference: &request.reference,
            currency: &self.currency,
            callback_url: self.callback_url.as_deref(),
            metadata: InitializeMetadata {
                name: &request.name,
                level: &request.level,
            },
        };

        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(secret.expose_secret())
            .json(&body)
            .send()
            .await?;

        let checkout: PaymentCheckout = Self::read_envelope(response).await?;
        debug!("Transaction initialized");
        Ok(checkout)
    }

    #[instrument(skip(self))]
    async fn verify(&self, reference: &str) -> GatewayResult<GatewayTransaction> {
        let secret = self.secret()?;

        let response = self
            .client
            .get(format!("{}/transaction/verify/{}", self.base_url, reference))
            .bearer_auth(secret.expose_secret())
            .send()
            .await?;

        let data: TransactionData = Self::read_envelope(response).await?;
        Ok(data.into())
    }

    /// Without a secret no delivery can be authenticated, so every one is refused
    /// as unsigned.
    fn authenticate_webhook(&self, body: &[u8], signature: Option<&str>) -> GatewayResult<()> {
        let Some(secret) = self.secret_key.as_ref() else {
            warn!("Webhook received but PAYSTACK_SECRET_KEY is not set");
            return Err(GatewayError::InvalidSignature);
        };
        let signature = signature.ok_or(GatewayError::InvalidSignature)?;
        verify_signature(secret, body, signature)
    }
}
