//! GitHub provider.
//!
//! # Module Structure
//!
//! - [`api`] - Capability traits the facade is written against
//! - [`client`] - REST client over [`HttpTransport`](crate::http::HttpTransport)
//! - `graphql` - GraphQL queries and mutations on the same client
//! - [`error`] - Adapter errors and HTTP reply classification
//! - [`seal`] - Sealed-box encryption of Actions secrets
//! - [`types`] - Wire types
//! - `source` - The [`GitHubSource`] facade

pub mod api;
pub mod client;
mod convert;
pub mod error;
mod graphql;
pub mod seal;
mod source;
pub mod types;

pub use api::{GitHubApi, GitHubGraphQl};
pub use client::GitHubClient;
pub use error::GitHubError;
pub use seal::{CryptoBoxSealer, SecretSealer};
pub use source::GitHubSource;
