//! Metadata providers for the Galleon resolver.
//!
//! A provider answers two questions: which concrete library satisfies a
//! requested range, and what does that library depend on. Providers are
//! arranged in an ordered chain; the walker races them in parallel.
//!
//! Two implementations ship here: [`local::LocalProvider`] serving a
//! directory of registry documents, and [`remote::RemoteProvider`]
//! querying an HTTP registry.

pub mod local;
pub mod metadata;
pub mod provider;
pub mod remote;

pub use provider::MetadataProvider;
