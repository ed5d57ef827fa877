//! services/api/src/adapters/paypal.rs
//!
//! The PayPal REST adapter. Implements the `PaymentGateway` port with the
//! Orders v2 API: one order per purchase, captured after the buyer approves it.

use async_trait::async_trait;
use blogsmith_core::ports::{CaptureOutcome, CaptureStatus, PaymentGateway, PortError, PortResult, Price};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::PayPalConfig;

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Deserialize)]
struct CreatedOrder {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CapturedOrder {
    status: String,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    payments: Option<Payments>,
}

#[derive(Debug, Deserialize)]
struct Payments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Debug, Deserialize)]
struct Capture {
    amount: Option<Amount>,
}

#[derive(Debug, Deserialize)]
struct Amount {
    value: String,
}

/// PayPal's error body, e.g. for a declined instrument.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    issue: String,
    description: Option<String>,
}

impl From<CapturedOrder> for CaptureOutcome {
    fn from(order: CapturedOrder) -> Self {
        let amount = order
            .purchase_units
            .into_iter()
            .filter_map(|unit| unit.payments)
            .flat_map(|payments| payments.captures)
            .find_map(|capture| capture.amount)
            .map(|amount| amount.value);
        let status = if order.status == "COMPLETED" {
            CaptureStatus::Completed
        } else {
            CaptureStatus::Other(order.status)
        };
        CaptureOutcome {
            status,
            detail: None,
            amount,
        }
    }
}

impl From<ErrorBody> for CaptureOutcome {
    fn from(body: ErrorBody) -> Self {
        let first = body.details.into_iter().next();
        let status = first
            .as_ref()
            .map(|d| d.issue.clone())
            .unwrap_or_else(|| "UNPROCESSABLE_ENTITY".to_string());
        let detail = first.and_then(|d| d.description).or(body.message);
        CaptureOutcome {
            status: CaptureStatus::Other(status),
            detail,
            amount: None,
        }
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct PayPalGateway {
    client: Client,
    config: PayPalConfig,
}

impl PayPalGateway {
    pub fn new(client: Client, config: PayPalConfig) -> Self {
        Self { client, config }
    }

    /// Exchanges the client credentials for a short-lived bearer token.
    async fn access_token(&self) -> PortResult<String> {
        let url = format!("{}/v1/oauth2/token", self.config.api_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to reach PayPal: {}", e)))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::Unexpected(format!(
                "Failed to get PayPal access token: {}",
                body
            )));
        }

        let token: AccessToken = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        debug!("Obtained PayPal access token");
        Ok(token.access_token)
    }
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
    async fn create_order(&self, price: Price) -> PortResult<String> {
        let token = self.access_token().await?;
        let url = format!("{}/v2/checkout/orders", self.config.api_url);
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "amount": {
                    "currency_code": price.currency,
                    "value": price.amount,
                },
            }],
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to reach PayPal: {}", e)))?;

        if !response.status().is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(PortError::Unexpected(format!(
                "Failed to create PayPal order: {}",
                details
            )));
        }

        let order: CreatedOrder = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        info!("PayPal order {} created", order.id);
        Ok(order.id)
    }

    async fn capture_order(&self, order_id: &str) -> PortResult<CaptureOutcome> {
        let token = self.access_token().await?;
        let url = format!("{}/v2/checkout/orders/{}/capture", self.config.api_url, order_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            // The default minimal reply omits the captured amount.
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to reach PayPal: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            // The order exists but could not be captured, e.g. a declined card.
            let body: ErrorBody = response
                .json()
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
            return Ok(body.into());
        }
        if status == StatusCode::NOT_FOUND {
            return Err(PortError::NotFound(format!("PayPal order {}", order_id)));
        }
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(PortError::Unexpected(format!(
                "Failed to capture PayPal order: {}",
                details
            )));
        }

        let order: CapturedOrder = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(order.into())
    }
}
