use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::domain::{Role, User};
use crate::error::{LmsError, Result};
use crate::idempotency::hash_api_token;
use crate::storage::Storage;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Option<Role>,
}

/// A freshly created account and its one-time visible API token.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub user: User,
    pub api_token: String,
}

/// Use case for account registration and bearer-token authentication
pub struct AccountUseCase {
    storage: Arc<dyn Storage>,
}

impl AccountUseCase {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Self-service registration; admins can only be created from the CLI.
    pub async fn register(&self, new_user: NewUser) -> Result<Registration> {
        let role = new_user.role.unwrap_or(Role::Student);
        if role == Role::Admin {
            return Err(LmsError::forbidden("admin accounts cannot be self-registered"));
        }
        self.create_account(&new_user.name, &new_user.email, role).await
    }

    pub async fn create_admin(&self, name: &str, email: &str) -> Result<Registration> {
        self.create_account(name, email, Role::Admin).await
    }

    async fn create_account(&self, name: &str, email: &str, role: Role) -> Result<Registration> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LmsError::validation("name is required"));
        }
        let email = email.trim().to_lowercase();
        if !EMAIL_RE.is_match(&email) {
            return Err(LmsError::validation("email is not valid"));
        }

        let api_token = generate_api_token();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email,
            role,
            api_token_hash: hash_api_token(&api_token),
            created_at: Utc::now(),
        };
        self.storage.create_user(&user).await?;
        info!(user_id = %user.id, role = %user.role, "Registered user");

        Ok(Registration { user, api_token })
    }

    /// Resolve a bearer token to its user.
    pub async fn authenticate(&self, token: &str) -> Result<User> {
        let token = token.trim();
        if token.is_empty() {
            return Err(LmsError::Unauthorized("missing API token".to_string()));
        }
        self.storage
            .get_user_by_token_hash(&hash_api_token(token))
            .await?
            .ok_or_else(|| LmsError::Unauthorized("invalid API token".to_string()))
    }
}

fn generate_api_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}
