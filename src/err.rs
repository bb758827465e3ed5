//! Error interface for the crate.
//!
//! All of the toolchain's error types implement the [`Error`] trait here,
//! which extends [`std::error::Error`] with user-facing help messages
//! that front ends can surface next to the diagnostic itself.

use std::borrow::Cow;

/// Unified error interface for all errors in this crate.
pub trait Error: std::error::Error {
    /// A hint on how to fix this error, if one applies.
    fn help(&self) -> Option<Cow<str>> {
        None
    }
}
