//! Wire protocol shared by the KUMO bridge and its test device.
//!
//! This crate provides:
//! - The parameter-id grammar and request query strings of the `/config` endpoint
//! - The JSON payloads the router answers with
#![cfg_attr(
    test,
    expect(clippy::indexing_slicing, reason = "This is not problematic in tests",)
)]

mod payload;
mod protocol;

pub use payload::*;
pub use protocol::*;
