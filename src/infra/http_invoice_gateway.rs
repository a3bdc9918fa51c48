use crate::app::ports::{Invoice, InvoiceRequest, PaymentGatewayPort};
use async_trait::async_trait;
use std::time::Duration;

/// Invoice API client for the hosted payment gateway.
pub struct HttpInvoiceGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl HttpInvoiceGateway {
    pub fn new(base_url: &str, secret_key: &str) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }
}

#[async_trait]
impl PaymentGatewayPort for HttpInvoiceGateway {
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, String> {
        let url = format!("{}/v2/invoices", self.base_url);
        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.secret_key, Some(""))
            .json(request)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("invoice request returned {}: {}", status.as_u16(), body));
        }
        resp.json::<Invoice>().await.map_err(|e| e.to_string())
    }
}
