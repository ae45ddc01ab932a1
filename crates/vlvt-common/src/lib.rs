//! # VLVT Common
//!
//! Shared types, error codes, and constants used across VLVT services.
//!
//! ## Modules
//! - `types` - Wire types (ErrorBody, Principal, CallerService)
//! - `error` - Machine-readable error codes and common error types
//! - `constants` - Header names, key prefixes, and defaults

pub mod constants;
pub mod error;
pub mod types;

pub use error::{ErrorCode, VlvtError};
pub use types::*;
