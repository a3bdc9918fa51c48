use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Invoice the payment gateway should open for a checkout.
#[derive(Clone, Debug, Serialize)]
pub struct InvoiceRequest {
    pub external_id: String,
    pub amount: i64,
    pub payer_email: String,
    pub description: String,
    pub currency: String,
    pub invoice_duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_redirect_url: Option<String>,
}

/// Invoice as created by the gateway.
#[derive(Clone, Debug, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub invoice_url: String,
    pub status: String,
}

// Payment-side ports
#[async_trait]
pub trait PaymentGatewayPort: Send + Sync {
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, String>;
}
