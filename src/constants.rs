// Constants shared across the service

pub const SERVICE_NAME: &str = "lms-server";

/// Header carrying the shared secret on payment gateway callbacks
pub const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

/// Prefix of payment external ids handed to the gateway
pub const EXTERNAL_ID_PREFIX: &str = "lms-";

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// Default passing score for quizzes created without one
pub const DEFAULT_PASSING_SCORE: u8 = 70;

/// Enrollment sources, used as metric labels
pub const SOURCE_FREE: &str = "free";
pub const SOURCE_PAYMENT: &str = "payment";
