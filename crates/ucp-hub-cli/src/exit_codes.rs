//! Exit codes for the `ucp-hub` binary.
//!
//! Hub errors use [`ucp_hub::HubError::exit_code`] (1 to 6); these cover the
//! rest.

pub const SUCCESS: i32 = 0;
pub const INTERNAL_ERROR: i32 = 10; // I/O or output failure outside the hub
