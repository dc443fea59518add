//! Foreground trending feed.
//!
//! Requests the trending endpoint through the proxy, warms the media cache
//! for every GIF it lists, and tells the proxy which GIFs are current so the
//! rest can be pruned.

mod api_types;

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::config::TrendingConfig;
use crate::net::{Network, Request};
use crate::proxy::{Intercept, Message, MessageSender, Proxy};

use api_types::ApiTrendingResponse;

/// A trending GIF as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gif {
  pub id: String,
  pub title: String,
  pub url: String,
}

pub struct TrendingFeed<S: CacheStorage, N: Network> {
  proxy: Arc<Proxy<S, N>>,
  /// Used directly when the proxy passes a request through
  network: Arc<N>,
  messages: MessageSender,
  endpoint: Url,
  refreshing: AtomicBool,
}

impl<S: CacheStorage + 'static, N: Network + 'static> TrendingFeed<S, N> {
  pub fn new(
    proxy: Arc<Proxy<S, N>>,
    network: Arc<N>,
    messages: MessageSender,
    config: &TrendingConfig,
    api_key: &str,
  ) -> Result<Self> {
    let mut endpoint = Url::parse(&config.url)
      .map_err(|e| eyre!("Invalid trending URL '{}': {}", config.url, e))?;
    endpoint
      .query_pairs_mut()
      .append_pair("api_key", api_key)
      .append_pair("limit", &config.limit.to_string());

    Ok(Self {
      proxy,
      network,
      messages,
      endpoint,
      refreshing: AtomicBool::new(false),
    })
  }

  /// True while a refresh is in progress.
  #[allow(dead_code)]
  pub fn is_refreshing(&self) -> bool {
    self.refreshing.load(Ordering::SeqCst)
  }

  /// Fetch the current trending GIFs.
  ///
  /// On success the media cache is warmed and pruned to the returned set.
  /// No data at all (offline with nothing cached) is an error.
  pub async fn refresh(&self) -> Result<Vec<Gif>> {
    let _refreshing = RefreshGuard::start(&self.refreshing);

    let body = self.load().await?;
    let response: ApiTrendingResponse = serde_json::from_slice(&body)
      .map_err(|e| eyre!("Failed to parse trending response: {}", e))?;

    let gifs: Vec<Gif> = response
      .data
      .into_iter()
      .filter_map(|gif| gif.into_gif())
      .collect();

    self.warm(&gifs).await;

    self.messages.post(Message::CleanGiphyCache {
      giphys: gifs.iter().map(|gif| gif.url.clone()).collect(),
    });

    info!(count = gifs.len(), "trending feed refreshed");
    Ok(gifs)
  }

  async fn load(&self) -> Result<Vec<u8>> {
    let request = Request::get(self.endpoint.clone());

    let res = match self.proxy.fetch(request.clone()).await? {
      Intercept::Respond(Some(result)) => {
        debug!(source = %result.source, "trending response");
        result.data
      }
      Intercept::Respond(None) => return Err(eyre!("No trending data available")),
      Intercept::Passthrough => self.network.fetch(&request).await?,
    };

    if !res.ok() {
      return Err(eyre!("Trending request failed with status {}", res.status()));
    }

    Ok(res.into_body())
  }

  /// Request every GIF through the proxy so the media partition holds them.
  async fn warm(&self, gifs: &[Gif]) {
    let fetches = gifs.iter().filter_map(|gif| match Url::parse(&gif.url) {
      Ok(url) => Some(self.proxy.fetch(Request::get(url))),
      Err(e) => {
        warn!(url = %gif.url, error = %e, "skipping GIF with invalid URL");
        None
      }
    });

    for result in join_all(fetches).await {
      if let Err(e) = result {
        warn!(error = %e, "failed to cache GIF");
      }
    }
  }
}

/// Marks a refresh as in progress until dropped.
struct RefreshGuard<'a>(&'a AtomicBool);

impl<'a> RefreshGuard<'a> {
  fn start(flag: &'a AtomicBool) -> Self {
    flag.store(true, Ordering::SeqCst);
    Self(flag)
  }
}

impl Drop for RefreshGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::SeqCst);
  }
}
