use reqwest::Method;
use url::Url;

/// An outbound request as seen by the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: Method,
  pub url: Url,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self { method, url }
  }

  /// Shorthand for a GET request.
  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }
}

/// A fetched or cached response.
///
/// The body can be read once: `into_body` consumes the response. Anything that
/// needs to keep a copy (the cache, for one) has to call `duplicate` first.
#[derive(Debug)]
pub struct Response {
  status: u16,
  headers: Vec<(String, String)>,
  body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
    }
  }

  pub fn status(&self) -> u16 {
    self.status
  }

  /// True for 2xx statuses.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Look up a header value (case-insensitive name match).
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn body_len(&self) -> usize {
    self.body.len()
  }

  /// Explicitly copy the response so one copy can be stored and the other returned.
  pub fn duplicate(&self) -> Self {
    Self {
      status: self.status,
      headers: self.headers.clone(),
      body: self.body.clone(),
    }
  }

  /// Consume the response and take its body.
  pub fn into_body(self) -> Vec<u8> {
    self.body
  }

  pub fn into_parts(self) -> (u16, Vec<(String, String)>, Vec<u8>) {
    (self.status, self.headers, self.body)
  }
}
