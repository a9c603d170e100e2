//! CIDR validation helpers.
//!
//! Discovery pulls CIDR literals out of places that were never meant to carry
//! them (command lines, error messages). These helpers check that the text we
//! kept is really an IP network before it is handed on.

use ipnetwork::IpNetwork;

use crate::{CoreError, Result};

/// Validate a single CIDR literal such as `10.96.0.0/12` or `fd00::/108`.
///
/// Host bits may be set (`1.2.3.4/16` is accepted), matching what cluster
/// components accept on their command lines.
///
/// # Errors
///
/// Returns [`CoreError::InvalidCidr`] if the text is empty, has no prefix
/// length, or does not parse as an IPv4/IPv6 network.
pub fn validate_cidr(value: &str) -> Result<IpNetwork> {
    if !value.contains('/') {
        return Err(CoreError::InvalidCidr {
            value: value.to_string(),
            reason: "missing prefix length".to_string(),
        });
    }

    value.parse::<IpNetwork>().map_err(|e| CoreError::InvalidCidr {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Validate a comma-separated list of CIDRs, as used by dual-stack clusters.
///
/// # Errors
///
/// Returns the first entry that fails [`validate_cidr`], or an error for an
/// empty list.
pub fn validate_cidr_list(value: &str) -> Result<Vec<IpNetwork>> {
    if value.trim().is_empty() {
        return Err(CoreError::InvalidCidr {
            value: value.to_string(),
            reason: "empty".to_string(),
        });
    }

    value.split(',').map(|entry| validate_cidr(entry.trim())).collect()
}
