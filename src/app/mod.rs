pub mod ports;
pub mod account_use_case;
pub mod catalog_use_case;
pub mod content_use_case;
pub mod enrollment_use_case;
pub mod learning_use_case;
pub mod certificate_use_case;
pub mod review_use_case;
pub mod payment_use_case;
