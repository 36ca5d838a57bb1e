//! HTTP clients for the remote ticket and auth services.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use booking_core::{InventoryKeeper, TicketInfo, UpstreamError, UserDirectory};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

const TICKET_SERVICE: &str = "ticket-service";
const AUTH_SERVICE: &str = "auth-service";

/// Ticket payload as served by the ticket service.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TicketPayload {
    id: i64,
    event_name: Option<String>,
    venue: Option<String>,
    price: serde_json::Value,
}

impl TicketPayload {
    fn into_ticket(self) -> Result<TicketInfo, UpstreamError> {
        let raw = match &self.price {
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let price = BigDecimal::from_str(&raw).map_err(|e| UpstreamError::Unavailable {
            service: TICKET_SERVICE,
            message: format!("unparseable price {:?}: {}", raw, e),
        })?;

        Ok(TicketInfo {
            id: self.id,
            event_name: self.event_name.unwrap_or_default(),
            venue: self.venue.unwrap_or_default(),
            price,
        })
    }
}

fn transport_error(service: &'static str, timeout: Duration, e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout { service, after_ms: timeout.as_millis() as u64 }
    } else {
        UpstreamError::Unavailable { service, message: e.to_string() }
    }
}

async fn rejected(service: &'static str, response: Response) -> UpstreamError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    UpstreamError::Rejected { service, status, message }
}

/// Inventory keeper backed by the ticket service's REST API.
#[derive(Clone)]
pub struct HttpInventoryKeeper {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpInventoryKeeper {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    async fn adjust(
        &self,
        ticket_id: i64,
        action: &str,
        quantity: i32,
    ) -> Result<(), UpstreamError> {
        let response = self
            .client
            .put(format!("{}/api/tickets/{}/{}", self.base_url, ticket_id, action))
            .query(&[("quantity", quantity)])
            .send()
            .await
            .map_err(|e| transport_error(TICKET_SERVICE, self.timeout, e))?;

        if response.status().is_success() {
            debug!(ticket_id, action, quantity, "ticket service acknowledged");
            Ok(())
        } else {
            let err = rejected(TICKET_SERVICE, response).await;
            warn!(ticket_id, action, quantity, error = %err, "ticket service refused");
            Err(err)
        }
    }
}

#[async_trait]
impl InventoryKeeper for HttpInventoryKeeper {
    async fn get_ticket(&self, ticket_id: i64) -> Result<Option<TicketInfo>, UpstreamError> {
        let response = self
            .client
            .get(format!("{}/api/tickets/{}", self.base_url, ticket_id))
            .send()
            .await
            .map_err(|e| transport_error(TICKET_SERVICE, self.timeout, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let payload = response.json::<TicketPayload>().await
                    .map_err(|e| UpstreamError::Unavailable {
                        service: TICKET_SERVICE,
                        message: format!("malformed ticket payload: {}", e),
                    })?;
                payload.into_ticket().map(Some)
            }
            _ => Err(rejected(TICKET_SERVICE, response).await),
        }
    }

    async fn reserve(&self, ticket_id: i64, quantity: i32) -> Result<(), UpstreamError> {
        self.adjust(ticket_id, "reserve", quantity).await
    }

    async fn release(&self, ticket_id: i64, quantity: i32) -> Result<(), UpstreamError> {
        self.adjust(ticket_id, "release", quantity).await
    }
}

/// User directory backed by the auth service.
#[derive(Clone)]
pub struct HttpUserDirectory {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpUserDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn exists(&self, user_id: i64) -> Result<bool, UpstreamError> {
        let response = self
            .client
            .get(format!("{}/api/auth/validate-user/{}", self.base_url, user_id))
            .send()
            .await
            .map_err(|e| transport_error(AUTH_SERVICE, self.timeout, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => response.json::<bool>().await
                .map_err(|e| UpstreamError::Unavailable {
                    service: AUTH_SERVICE,
                    message: format!("malformed validate-user payload: {}", e),
                }),
            _ => Err(rejected(AUTH_SERVICE, response).await),
        }
    }
}
