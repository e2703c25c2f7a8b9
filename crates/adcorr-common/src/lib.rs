//! adcorr Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the adcorr workspace.
//!
//! # Overview
//!
//! - **Types**: the decoded record model ([`RawRecord`], [`FieldValue`])
//! - **Error Handling**: the shared error type and result alias
//! - **Logging**: tracing subscriber setup with console, rolling file and error-log output
//!
//! # Example
//!
//! ```
//! use adcorr_common::{FieldValue, RawRecord};
//!
//! let record = RawRecord::from_pairs([("user_id", "u1"), ("conversion_type", "signup")]);
//! assert_eq!(record.get("user_id"), Some(&FieldValue::from("u1")));
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{AdcorrError, Result};
pub use types::{FieldValue, RawRecord};
