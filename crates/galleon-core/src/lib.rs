//! Core data types for the Galleon dependency resolver.
//!
//! This crate defines the fundamental types the resolver operates on:
//! four-part semantic versions, version ranges, package identities and
//! dependency edges, target platforms with the nearest-compatibility
//! oracle, and runtime graphs.
//!
//! This crate is intentionally free of async code and network I/O.

pub mod dependency;
pub mod identity;
pub mod platform;
pub mod range;
pub mod runtime;
pub mod version;
