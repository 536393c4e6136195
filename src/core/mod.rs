//! Core types for intentcode
//!
//! This module holds the pieces every other module depends on:
//!
//! - [`IntentError`] - Enumerated failure modes of the compiler
//! - [`ErrorContext`] - User-friendly error wrapper with suggestions
//! - [`user_friendly_error`] - Convert any error into a displayable context
//! - [`CancelFlag`] - Cooperative cancellation checked between stages and files
//!
//! # Error Handling Pattern
//!
//! ```rust,no_run
//! use intentcode::core::{IntentError, user_friendly_error};
//! use anyhow::Result;
//!
//! fn example_operation() -> Result<()> {
//!     Err(IntentError::Cancelled.into())
//! }
//!
//! if let Err(e) = example_operation() {
//!     user_friendly_error(e).display();
//! }
//! ```

pub mod cancel;
pub mod error;

pub use cancel::CancelFlag;
pub use error::{ErrorContext, IntentError, user_friendly_error};
