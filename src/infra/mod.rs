pub mod http_invoice_gateway;
pub mod offline_gateway;

pub use http_invoice_gateway::HttpInvoiceGateway;
pub use offline_gateway::OfflineInvoiceGateway;
