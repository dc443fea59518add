//! Outbound network access.
//!
//! Everything that reaches the network goes through the [`Network`] trait so
//! the strategies and the lifecycle manager can be driven by a fake in tests.

mod client;
mod types;

use async_trait::async_trait;
use color_eyre::Result;

pub use client::HttpNetwork;
pub use types::{Request, Response};

/// A transport that can perform a request.
///
/// Transport failures are errors. HTTP error statuses are not: they come back
/// as a `Response` and the caller decides what a failure status means.
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response>;
}
