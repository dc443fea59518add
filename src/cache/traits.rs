//! Core types for the caching system.

use chrono::{DateTime, Utc};
use std::fmt;
use url::Url;

use crate::net::Request;

/// Identity of a cached request: method plus URL.
///
/// Same-origin URLs are stored origin-relative (path and query) so the shell
/// partition does not depend on the host it was populated from. Everything
/// else keeps its absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
}

impl RequestKey {
  pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
    Self {
      method: method.into(),
      url: url.into(),
    }
  }

  /// Normalize a request into its cache identity relative to `origin`.
  ///
  /// Fragments never reach the server, so they are not part of the identity.
  pub fn for_request(request: &Request, origin: &Url) -> Self {
    let url = if request.url.origin() == origin.origin() {
      let mut relative = request.url.path().to_string();
      if let Some(query) = request.url.query() {
        relative.push('?');
        relative.push_str(query);
      }
      relative
    } else {
      let mut absolute = request.url.clone();
      absolute.set_fragment(None);
      absolute.to_string()
    };

    Self::new(request.method.as_str(), url)
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// Result from a strategy, including data and metadata about the source.
#[derive(Debug)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from a cache hit.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// Create a new cache result for a network failure served from cache.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Served from cache without touching the network
  Cache,
  /// Network failed, serving the last cached copy
  Offline,
}

impl fmt::Display for CacheSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Network => "network",
      Self::Cache => "cache",
      Self::Offline => "offline",
    };
    f.write_str(s)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::Method;

  fn origin() -> Url {
    Url::parse("https://app.example.com").unwrap()
  }

  #[test]
  fn test_same_origin_key_is_relative() {
    let req = Request::get(Url::parse("https://app.example.com/images/logo.png?v=2").unwrap());
    let key = RequestKey::for_request(&req, &origin());
    assert_eq!(key, RequestKey::new("GET", "/images/logo.png?v=2"));
  }

  #[test]
  fn test_cross_origin_key_is_absolute() {
    let req = Request::get(Url::parse("https://media2.giphy.com/media/abc/giphy.gif").unwrap());
    let key = RequestKey::for_request(&req, &origin());
    assert_eq!(key.url, "https://media2.giphy.com/media/abc/giphy.gif");
  }

  #[test]
  fn test_method_is_part_of_identity() {
    let url = Url::parse("https://app.example.com/index.html").unwrap();
    let get = RequestKey::for_request(&Request::get(url.clone()), &origin());
    let head = RequestKey::for_request(&Request::new(Method::HEAD, url), &origin());
    assert_ne!(get, head);
    assert_eq!(head.to_string(), "HEAD /index.html");
  }

  #[test]
  fn test_fragment_is_not_part_of_identity() {
    let plain = Request::get(Url::parse("https://media2.giphy.com/media/abc/giphy.gif").unwrap());
    let tagged = Request::get(Url::parse("https://media2.giphy.com/media/abc/giphy.gif#x").unwrap());
    assert_eq!(
      RequestKey::for_request(&tagged, &origin()),
      RequestKey::for_request(&plain, &origin())
    );

    let shell = Request::get(Url::parse("https://app.example.com/index.html#top").unwrap());
    assert_eq!(RequestKey::for_request(&shell, &origin()).url, "/index.html");
  }

  #[test]
  fn test_other_port_is_cross_origin() {
    let req = Request::get(Url::parse("https://app.example.com:8443/index.html").unwrap());
    let key = RequestKey::for_request(&req, &origin());
    assert_eq!(key.url, "https://app.example.com:8443/index.html");
  }
}
