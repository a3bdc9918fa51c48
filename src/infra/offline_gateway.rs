use crate::app::ports::{Invoice, InvoiceRequest, PaymentGatewayPort};
use async_trait::async_trait;

/// Gateway stand-in for local runs: invoices are "opened" without any
/// network call and settled by posting a callback to the webhook by hand.
pub struct OfflineInvoiceGateway {
    pub base_url: String,
}

impl OfflineInvoiceGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PaymentGatewayPort for OfflineInvoiceGateway {
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, String> {
        Ok(Invoice {
            id: format!("offline-{}", request.external_id),
            invoice_url: format!("{}/invoices/{}", self.base_url.trim_end_matches('/'), request.external_id),
            status: "PENDING".to_string(),
        })
    }
}
