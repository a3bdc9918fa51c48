use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::app::enrollment_use_case::{refresh_progress, require_enrollment};
use crate::constants::{MAX_RATING, MIN_RATING};
use crate::domain::{Review, User};
use crate::error::{LmsError, Result};
use crate::storage::Storage;

#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
    pub rating: u8,
    pub comment: Option<String>,
}

/// Use case for course reviews: one live review per learner, written only
/// after finishing the course
pub struct ReviewUseCase {
    storage: Arc<dyn Storage>,
}

impl ReviewUseCase {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn create(&self, user: &User, course_id: Uuid, new: NewReview) -> Result<Review> {
        if !(MIN_RATING..=MAX_RATING).contains(&new.rating) {
            return Err(LmsError::validation(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}"
            )));
        }
        if self.storage.get_course(course_id).await?.is_none() {
            return Err(LmsError::not_found("course"));
        }

        let enrollment = require_enrollment(self.storage.as_ref(), user, course_id).await?;
        let report = refresh_progress(self.storage.as_ref(), enrollment).await?;
        if report.progress != 100 {
            return Err(LmsError::forbidden("finish the course before reviewing it"));
        }
        if self.storage.find_review(user.id, course_id).await?.is_some() {
            return Err(LmsError::conflict("you have already reviewed this course"));
        }

        let review = Review {
            id: Uuid::new_v4(),
            user_id: user.id,
            course_id,
            rating: new.rating,
            comment: new.comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            created_at: Utc::now(),
        };
        // The partial unique index backs up the check above under concurrent posts
        self.storage.create_review(&review).await?;
        info!(review_id = %review.id, course_id = %course_id, rating = review.rating, "Review posted");
        Ok(review)
    }

    pub async fn list(&self, course_id: Uuid) -> Result<Vec<Review>> {
        if self.storage.get_course(course_id).await?.is_none() {
            return Err(LmsError::not_found("course"));
        }
        self.storage.list_reviews(course_id).await
    }

    pub async fn delete(&self, user: &User, review_id: Uuid) -> Result<()> {
        let review = self
            .storage
            .get_review(review_id)
            .await?
            .ok_or_else(|| LmsError::not_found("review"))?;
        if review.user_id != user.id && !user.is_admin() {
            return Err(LmsError::forbidden("only the author can delete a review"));
        }
        self.storage.delete_review(review.id).await
    }
}
