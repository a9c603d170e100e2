//! Common error types for cidrscout.
//!
//! This module provides shared error types that are used across multiple crates.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the cidrscout system.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A value that should be a CIDR literal is not one.
    #[error("invalid CIDR {value:?}: {reason}")]
    InvalidCidr {
        /// The offending text.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An unknown network plugin tag was provided.
    #[error("unknown network plugin: {0}")]
    UnknownNetworkPlugin(String),
}
