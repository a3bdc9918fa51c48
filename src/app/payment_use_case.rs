use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::ports::{InvoiceRequest, PaymentGatewayPort};
use crate::config::PaymentConfig;
use crate::constants::{EXTERNAL_ID_PREFIX, SOURCE_PAYMENT};
use crate::domain::{Course, Enrollment, Payment, PaymentStatus, User};
use crate::error::{LmsError, Result};
use crate::idempotency::{compute_webhook_key, tokens_match};
use crate::metrics::LmsMetrics;
use crate::storage::Storage;

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub payment_id: Uuid,
    pub external_id: String,
    pub invoice_url: String,
    pub amount: i64,
    pub status: PaymentStatus,
    /// An open invoice from an earlier checkout was handed back.
    pub reused: bool,
}

/// Invoice callback body sent by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceCallback {
    pub id: Option<String>,
    pub external_id: String,
    pub status: String,
    pub paid_at: Option<String>,
    pub payment_method: Option<String>,
    pub amount: Option<f64>,
}

/// What a webhook delivery did. Every outcome is acknowledged with 200.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Activated { enrollment_created: bool },
    StatusUpdated { status: PaymentStatus },
    AlreadyProcessed,
    Duplicate,
    PaymentNotFound,
    Ignored { reason: String },
}

impl WebhookOutcome {
    pub fn as_label(&self) -> &'static str {
        match self {
            WebhookOutcome::Activated { .. } => "activated",
            WebhookOutcome::StatusUpdated { .. } => "status_updated",
            WebhookOutcome::AlreadyProcessed => "already_processed",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::PaymentNotFound => "payment_not_found",
            WebhookOutcome::Ignored { .. } => "ignored",
        }
    }

    fn ignored(reason: impl Into<String>) -> Self {
        WebhookOutcome::Ignored {
            reason: reason.into(),
        }
    }
}

/// Use case for paid enrollment: opening gateway invoices and applying the
/// gateway's invoice callbacks
pub struct PaymentUseCase {
    storage: Arc<dyn Storage>,
    gateway: Arc<dyn PaymentGatewayPort>,
    settings: PaymentConfig,
}

impl PaymentUseCase {
    pub fn new(storage: Arc<dyn Storage>, gateway: Arc<dyn PaymentGatewayPort>, settings: PaymentConfig) -> Self {
        Self {
            storage,
            gateway,
            settings,
        }
    }

    pub async fn checkout(&self, user: &User, course_id: Uuid) -> Result<CheckoutResponse> {
        let course = self
            .storage
            .get_course(course_id)
            .await?
            .filter(|c| c.is_published)
            .ok_or_else(|| LmsError::not_found("course"))?;
        if course.is_free() {
            return Err(LmsError::validation("this course is free; enroll directly"));
        }
        if self.storage.get_enrollment(user.id, course.id).await?.is_some() {
            return Err(LmsError::conflict("already enrolled in this course"));
        }

        if let Some(open) = self.storage.find_pending_payment(user.id, course.id).await? {
            if let Some(invoice_url) = open.invoice_url.clone() {
                debug!(external_id = %open.external_id, "Reusing open invoice");
                return Ok(CheckoutResponse {
                    payment_id: open.id,
                    external_id: open.external_id,
                    invoice_url,
                    amount: open.amount,
                    status: open.status,
                    reused: true,
                });
            }
        }

        let now = Utc::now();
        let mut payment = Payment {
            id: Uuid::new_v4(),
            user_id: user.id,
            course_id: course.id,
            external_id: format!("{}{}", EXTERNAL_ID_PREFIX, Uuid::new_v4().simple()),
            gateway_invoice_id: None,
            amount: course.price,
            status: PaymentStatus::Pending,
            invoice_url: None,
            payment_method: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        self.storage.create_payment(&payment).await?;
        LmsMetrics::checkout_started();

        let request = self.invoice_request(user, &course, &payment);
        match self.gateway.create_invoice(&request).await {
            Ok(invoice) => {
                payment.gateway_invoice_id = Some(invoice.id);
                payment.invoice_url = Some(invoice.invoice_url.clone());
                payment.updated_at = Utc::now();
                self.storage.update_payment(&payment).await?;
                info!(
                    external_id = %payment.external_id,
                    course_id = %course.id,
                    amount = payment.amount,
                    "Opened invoice"
                );
                Ok(CheckoutResponse {
                    payment_id: payment.id,
                    external_id: payment.external_id,
                    invoice_url: invoice.invoice_url,
                    amount: payment.amount,
                    status: payment.status,
                    reused: false,
                })
            }
            Err(message) => {
                error!(external_id = %payment.external_id, "Invoice creation failed: {}", message);
                payment.status = PaymentStatus::Failed;
                payment.updated_at = Utc::now();
                self.storage.update_payment(&payment).await?;
                Err(LmsError::Gateway { message })
            }
        }
    }

    /// Check the shared secret carried by a gateway callback.
    pub fn verify_callback_token(&self, presented: Option<&str>) -> Result<()> {
        match presented {
            Some(token) if tokens_match(token, &self.settings.callback_token) => Ok(()),
            _ => Err(LmsError::Unauthorized("invalid callback token".to_string())),
        }
    }

    /// Apply an invoice callback. Never fails: the gateway retries anything
    /// that is not a 200, so problems are logged and reported in the outcome.
    pub async fn handle_webhook(&self, body: &[u8]) -> WebhookOutcome {
        let outcome = match serde_json::from_slice::<InvoiceCallback>(body) {
            Ok(callback) => match self.apply_callback(&callback).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(external_id = %callback.external_id, "Webhook processing failed: {}", e);
                    WebhookOutcome::ignored("internal error")
                }
            },
            Err(e) => {
                warn!("Malformed webhook body: {}", e);
                WebhookOutcome::ignored("malformed body")
            }
        };
        LmsMetrics::webhook_received(outcome.as_label());
        outcome
    }

    pub async fn list_payments(&self, user: &User) -> Result<Vec<Payment>> {
        self.storage.list_payments_for_user(user.id).await
    }

    async fn apply_callback(&self, callback: &InvoiceCallback) -> Result<WebhookOutcome> {
        let status: PaymentStatus = match callback.status.parse() {
            Ok(status) => status,
            Err(_) => {
                warn!(status = %callback.status, "Unknown invoice status");
                return Ok(WebhookOutcome::ignored(format!("unknown status {}", callback.status)));
            }
        };

        let key = compute_webhook_key(
            callback.id.as_deref(),
            &callback.external_id,
            status.as_str(),
            callback.paid_at.as_deref(),
        );
        if !self
            .storage
            .record_webhook_event(&key, &callback.external_id, status.as_str())
            .await?
        {
            debug!(external_id = %callback.external_id, "Duplicate webhook delivery");
            return Ok(WebhookOutcome::Duplicate);
        }

        match self.apply_status(callback, status).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // The delivery did not land, so its redelivery must not count as a duplicate
                if let Err(forget) = self.storage.forget_webhook_event(&key).await {
                    error!(external_id = %callback.external_id, "Could not release delivery key: {}", forget);
                }
                Err(e)
            }
        }
    }

    async fn apply_status(&self, callback: &InvoiceCallback, status: PaymentStatus) -> Result<WebhookOutcome> {
        let Some(payment) = self.storage.get_payment_by_external_id(&callback.external_id).await? else {
            warn!(external_id = %callback.external_id, "Webhook for unknown payment");
            return Ok(WebhookOutcome::PaymentNotFound);
        };

        if let Some(amount) = callback.amount {
            if amount.round() as i64 != payment.amount {
                warn!(
                    external_id = %payment.external_id,
                    expected = payment.amount,
                    received = amount,
                    "Webhook amount mismatch"
                );
                return Ok(WebhookOutcome::ignored("amount mismatch"));
            }
        }

        if status.is_paid() {
            self.apply_paid(&payment, status, callback).await
        } else {
            self.apply_unpaid(&payment, status).await
        }
    }

    async fn apply_paid(
        &self,
        payment: &Payment,
        status: PaymentStatus,
        callback: &InvoiceCallback,
    ) -> Result<WebhookOutcome> {
        if payment.status.is_paid() {
            if payment.status == PaymentStatus::Paid && status == PaymentStatus::Settled {
                self.storage
                    .transition_payment_status(payment.id, PaymentStatus::Paid, PaymentStatus::Settled)
                    .await?;
                return Ok(WebhookOutcome::StatusUpdated { status });
            }
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let paid_at = callback
            .paid_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let transition = self
            .storage
            .mark_payment_paid(
                payment.id,
                status,
                paid_at,
                callback.payment_method.as_deref(),
                &Enrollment::new(payment.user_id, payment.course_id),
            )
            .await?;
        if !transition.applied {
            let current = self
                .storage
                .get_payment_by_external_id(&payment.external_id)
                .await?
                .map(|p| p.status)
                .unwrap_or(payment.status);
            if current.is_paid() {
                // A concurrent delivery got there first
                return Ok(WebhookOutcome::AlreadyProcessed);
            }
            warn!(
                external_id = %payment.external_id,
                user_id = %payment.user_id,
                %current,
                "Paid callback for a payment that cannot be activated"
            );
            return Ok(WebhookOutcome::ignored(format!("payment is {}", current)));
        }
        if transition.enrollment_created {
            LmsMetrics::enrollment_created(SOURCE_PAYMENT);
        }
        info!(
            external_id = %payment.external_id,
            user_id = %payment.user_id,
            course_id = %payment.course_id,
            enrollment_created = transition.enrollment_created,
            "Payment received"
        );
        Ok(WebhookOutcome::Activated {
            enrollment_created: transition.enrollment_created,
        })
    }

    async fn apply_unpaid(&self, payment: &Payment, status: PaymentStatus) -> Result<WebhookOutcome> {
        match status {
            PaymentStatus::Expired | PaymentStatus::Failed => {
                if self
                    .storage
                    .transition_payment_status(payment.id, PaymentStatus::Pending, status)
                    .await?
                {
                    info!(external_id = %payment.external_id, %status, "Payment closed");
                    Ok(WebhookOutcome::StatusUpdated { status })
                } else {
                    Ok(WebhookOutcome::ignored(format!(
                        "payment is {}, not PENDING",
                        payment.status
                    )))
                }
            }
            _ => Ok(WebhookOutcome::ignored(format!("no transition to {}", status))),
        }
    }

    fn invoice_request(&self, user: &User, course: &Course, payment: &Payment) -> InvoiceRequest {
        InvoiceRequest {
            external_id: payment.external_id.clone(),
            amount: payment.amount,
            payer_email: user.email.clone(),
            description: format!("Enrollment: {}", course.title),
            currency: self.settings.currency.clone(),
            invoice_duration: self.settings.invoice_duration_secs,
            success_redirect_url: self.settings.success_redirect_url.clone(),
        }
    }
}
