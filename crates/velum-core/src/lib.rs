//! # velum-core
//!
//! Shared foundation for the velum workspace: the common error type, the
//! structured-logging field schema, and UUIDv7 id helpers.
//!
//! Domain logic lives elsewhere: cryptographic primitives in
//! `velum-crypto`, key persistence in `velum-store`, and the caller-facing
//! session in `velum-session`.

pub mod error;
pub mod logging;
pub mod uuid_utils;

pub use error::{Error, Result};
pub use uuid_utils::new_v7;
