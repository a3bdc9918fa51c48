use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::app::enrollment_use_case::{refresh_progress, require_enrollment};
use crate::domain::{Certificate, User};
use crate::error::{LmsError, Result};
use crate::metrics::LmsMetrics;
use crate::progress::certificate_number;
use crate::storage::Storage;

#[derive(Debug, Clone, Serialize)]
pub struct CertificateClaim {
    #[serde(flatten)]
    pub certificate: Certificate,
    /// False when the enrollment already held this certificate.
    pub newly_issued: bool,
}

/// Public view used to verify a certificate number.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateVerification {
    #[serde(flatten)]
    pub certificate: Certificate,
    pub course_title: String,
    pub student_name: String,
}

pub struct CertificateUseCase {
    storage: Arc<dyn Storage>,
}

impl CertificateUseCase {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Issue the certificate for a fully completed enrollment. Claiming again
    /// returns the certificate issued the first time.
    pub async fn claim(&self, user: &User, course_id: Uuid) -> Result<CertificateClaim> {
        if self.storage.get_course(course_id).await?.is_none() {
            return Err(LmsError::not_found("course"));
        }
        let enrollment = require_enrollment(self.storage.as_ref(), user, course_id).await?;
        let enrollment_id = enrollment.id;

        let report = refresh_progress(self.storage.as_ref(), enrollment).await?;
        if report.progress != 100 {
            return Err(LmsError::forbidden(format!(
                "course progress is {}%; finish the course to claim a certificate",
                report.progress
            )));
        }

        let issued_at = Utc::now();
        let candidate = Certificate {
            id: Uuid::new_v4(),
            enrollment_id,
            user_id: user.id,
            course_id,
            certificate_number: certificate_number(enrollment_id, issued_at),
            issued_at,
        };
        let (certificate, newly_issued) = self.storage.create_certificate_if_absent(&candidate).await?;
        if newly_issued {
            LmsMetrics::certificate_issued();
            info!(
                certificate = %certificate.certificate_number,
                user_id = %user.id,
                course_id = %course_id,
                "Issued certificate"
            );
        }

        Ok(CertificateClaim {
            certificate,
            newly_issued,
        })
    }

    pub async fn verify(&self, number: &str) -> Result<CertificateVerification> {
        let certificate = self
            .storage
            .get_certificate_by_number(number.trim())
            .await?
            .ok_or_else(|| LmsError::not_found("certificate"))?;
        let course_title = self
            .storage
            .get_course(certificate.course_id)
            .await?
            .map(|c| c.title)
            .unwrap_or_default();
        let student_name = self
            .storage
            .get_user(certificate.user_id)
            .await?
            .map(|u| u.name)
            .unwrap_or_default();

        Ok(CertificateVerification {
            certificate,
            course_title,
            student_name,
        })
    }
}
