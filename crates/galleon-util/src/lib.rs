//! Shared utilities for the Galleon dependency resolver.
//!
//! This crate provides the cross-cutting concerns used by every other
//! Galleon crate: the unified error type and the cooperative cancellation
//! token observed by in-flight provider requests.

pub mod cancel;
pub mod errors;
