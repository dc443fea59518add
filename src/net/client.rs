use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use tracing::debug;

use crate::config::Config;

use super::types::{Request, Response};
use super::Network;

/// Network backed by a shared reqwest client.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new(config: &Config) -> Result<Self> {
    let mut builder = reqwest::Client::builder().user_agent(concat!(
      env!("CARGO_PKG_NAME"),
      "/",
      env!("CARGO_PKG_VERSION")
    ));

    if let Some(secs) = config.http.timeout_secs {
      builder = builder.timeout(Duration::from_secs(secs));
    }

    let client = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    debug!(method = %request.method, url = %request.url, "network fetch");

    let res = self
      .client
      .request(request.method.clone(), request.url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = res.status().as_u16();
    let headers = res
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = res
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

    Ok(Response::new(status, headers, body.to_vec()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  #[tokio::test]
  async fn test_fetch_returns_status_headers_and_body() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/index.html")
      .with_status(200)
      .with_header("content-type", "text/html")
      .with_body("<html></html>")
      .create_async()
      .await;

    let network = HttpNetwork::new(&Config::for_origin(&server.url())).unwrap();
    let url = Url::parse(&format!("{}/index.html", server.url())).unwrap();
    let res = network.fetch(&Request::get(url)).await.unwrap();

    mock.assert_async().await;
    assert_eq!(res.status(), 200);
    assert_eq!(res.header("content-type"), Some("text/html"));
    assert_eq!(res.into_body(), b"<html></html>");
  }

  #[tokio::test]
  async fn test_error_status_is_not_a_transport_error() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("GET", "/missing.png")
      .with_status(404)
      .create_async()
      .await;

    let network = HttpNetwork::new(&Config::for_origin(&server.url())).unwrap();
    let url = Url::parse(&format!("{}/missing.png", server.url())).unwrap();
    let res = network.fetch(&Request::get(url)).await.unwrap();

    assert_eq!(res.status(), 404);
    assert!(!res.ok());
  }

  #[tokio::test]
  async fn test_unreachable_host_is_an_error() {
    let network = HttpNetwork::new(&Config::for_origin("http://127.0.0.1:9")).unwrap();
    let url = Url::parse("http://127.0.0.1:9/index.html").unwrap();
    assert!(network.fetch(&Request::get(url)).await.is_err());
  }
}
