//! Route handlers for the HTTP API.

pub mod admin;
pub mod events;
pub mod health;
pub mod jobs;
pub mod presets;
pub mod uploads;

use std::str::FromStr;

/// Parse a path segment into a typed ID.
pub(crate) fn parse_id<T: FromStr>(raw: &str, entity: &str) -> rf_core::Result<T> {
    raw.parse()
        .map_err(|_| rf_core::Error::invalid_input(format!("invalid {entity} ID '{raw}'")))
}
