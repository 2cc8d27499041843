//! Client for a remote extraction gateway.
//!
//! Posts the normalized image to `/api/analyze` and decodes the answer into
//! [`BillData`]. The provider credential stays on the gateway; this side only
//! needs the gateway's URL.

use crate::error::BillError;
use crate::model::BillData;
use crate::server::HealthReport;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

#[derive(Serialize)]
struct AnalyzeBody<'a> {
    image: &'a str,
}

/// HTTP client for `billai serve`.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one image (data URI or bare base64) for analysis.
    ///
    /// A non-2xx answer becomes [`BillError::Gateway`] carrying the status
    /// and the gateway's message.
    pub async fn analyze(&self, image: &str) -> Result<BillData, BillError> {
        let url = format!("{}/api/analyze", self.base_url);
        debug!("POST {} ({} bytes of image)", url, image.len());

        let response = self
            .client
            .post(&url)
            .json(&AnalyzeBody { image })
            .send()
            .await
            .map_err(|e| BillError::Gateway {
                status: 0,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BillError::Gateway {
                status: status.as_u16(),
                message,
            });
        }

        let value: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| BillError::MalformedResponse {
                    detail: e.to_string(),
                })?;
        BillData::from_value(&value)
    }

    /// Fetch `/api/health`.
    pub async fn health(&self) -> Result<HealthReport, BillError> {
        let url = format!("{}/api/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BillError::Gateway {
                status: 0,
                message: e.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(BillError::Gateway {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| BillError::MalformedResponse {
                detail: e.to_string(),
            })
    }
}
