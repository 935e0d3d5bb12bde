//! # bardesource
//!
//! Reference resolution for the Barde voice streaming engine.
//!
//! This crate turns a user-supplied reference (a direct audio URL, a page
//! URL, or a search phrase) into one or more [`MediaDescriptor`]s ready for
//! the transcode pipeline. Lookups and searches go through an external
//! catalog daemon reached over HTTP.
//!
//! ## Errors
//!
//! The error taxonomy is deliberately small (see [`ResolveError`]):
//! - `InvalidReference` for malformed or unsupported references;
//! - `UpstreamUnavailable` for catalog failures of any kind;
//! - `Timeout` when the configured resolution bound is exceeded.
//!
//! A search without results is **not** an error and yields an empty list.
//!
//! ## Example
//!
//! ```no_run
//! use bardesource::{HttpCatalog, Resolver, TrackResolver};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = Arc::new(HttpCatalog::from_config()?);
//!     let resolver = Resolver::from_config(catalog);
//!
//!     for descriptor in resolver.resolve("daft punk around the world").await? {
//!         println!("{} -> {}", descriptor.title, descriptor.stream_url);
//!     }
//!     Ok(())
//! }
//! ```

mod catalog;
mod error;
mod models;
mod resolver;

pub use catalog::{HttpCatalog, MediaCatalog};
pub use error::{ResolveError, Result};
pub use models::{CatalogTrack, MediaDescriptor, SearchResponse, SourceKind};
pub use resolver::{Resolver, TrackResolver};
