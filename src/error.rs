use thiserror::Error;

#[derive(Error, Debug)]
pub enum LmsError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Payment gateway error: {message}")]
    Gateway { message: String },
}

impl LmsError {
    pub fn validation(message: impl Into<String>) -> Self {
        LmsError::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        LmsError::Forbidden(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        LmsError::NotFound(what.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        LmsError::Conflict(message.into())
    }

    /// HTTP status the error maps to at the API boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            LmsError::Validation(_) => 400,
            LmsError::Unauthorized(_) => 401,
            LmsError::Forbidden(_) => 403,
            LmsError::NotFound(_) => 404,
            LmsError::Conflict(_) => 409,
            LmsError::Gateway { .. } => 502,
            _ => 500,
        }
    }

    /// True for errors whose message is safe to hand back to a client.
    pub fn is_client_facing(&self) -> bool {
        self.status_code() < 500 || matches!(self, LmsError::Gateway { .. })
    }
}

pub type Result<T> = std::result::Result<T, LmsError>;
