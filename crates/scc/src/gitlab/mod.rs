//! GitLab provider.
//!
//! [`GitLabSource`] talks to GitLab through the [`GitLabApi`] trait;
//! [`GitLabClient`] implements it over the v4 REST API. Listings use
//! integer page numbers taken from the `X-Next-Page` header.

pub mod api;
pub mod client;
mod convert;
pub mod error;
mod source;
pub mod types;

pub use api::GitLabApi;
pub use client::GitLabClient;
pub use error::GitLabError;
pub use source::GitLabSource;
