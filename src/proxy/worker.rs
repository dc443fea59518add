use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{
  prune_partition, Activation, CacheLayer, CacheResult, CacheStorage, ShellLifecycle,
  MEDIA_PARTITION,
};
use crate::config::{Config, RoutesConfig};
use crate::net::{Network, Request, Response};

use super::classify::{classify, Route};
use super::message::{Message, MessageSender};

/// Inbound events from the host.
#[derive(Debug)]
pub enum Event {
  Activate,
  Fetch(Request),
  Message(Message),
}

/// What the host should do with an intercepted fetch.
#[derive(Debug)]
pub enum Intercept {
  /// Answer with this result; `None` means nothing was available
  Respond(Option<CacheResult<Response>>),
  /// Not ours, let the request go straight to the network
  Passthrough,
}

/// Result of handling one [`Event`].
#[derive(Debug)]
pub enum Outcome {
  Activated(Activation),
  Fetched(Intercept),
  /// Message handled; number of cache entries it pruned
  Handled(usize),
}

/// Activation state of a [`Proxy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
  Pending,
  Ready,
  /// The last activation failed; matched fetches go to the network
  Failed,
}

/// The background proxy instance.
///
/// Fetches are held back until activation has installed the shell partition
/// and removed stale ones. If activation fails they are released as
/// passthrough.
pub struct Proxy<S: CacheStorage, N: Network> {
  storage: Arc<S>,
  layer: CacheLayer<S, N>,
  lifecycle: ShellLifecycle<S, N>,
  origin: Url,
  routes: RoutesConfig,
  ready: watch::Sender<Readiness>,
}

impl<S: CacheStorage + 'static, N: Network + 'static> Proxy<S, N> {
  pub fn new(config: &Config, storage: Arc<S>, network: Arc<N>) -> Result<Self> {
    let origin = Url::parse(&config.app.origin)
      .map_err(|e| eyre!("Invalid app origin '{}': {}", config.app.origin, e))?;

    let layer = CacheLayer::new(Arc::clone(&storage), Arc::clone(&network), origin.clone());
    let lifecycle = ShellLifecycle::new(
      Arc::clone(&storage),
      network,
      origin.clone(),
      config.app.version.clone(),
      config.app.manifest.clone(),
    );
    let (ready, _) = watch::channel(Readiness::Pending);

    Ok(Self {
      storage,
      layer,
      lifecycle,
      origin,
      routes: config.routes.clone(),
      ready,
    })
  }

  /// Install the shell and remove stale shell partitions, then start serving.
  pub async fn activate(&self) -> Result<Activation> {
    let activation = match self.lifecycle.activate().await {
      Ok(activation) => activation,
      Err(e) => {
        self.ready.send_replace(Readiness::Failed);
        return Err(e);
      }
    };
    self.ready.send_replace(Readiness::Ready);

    info!(
      partition = %activation.partition,
      installed = activation.installed,
      removed = activation.removed.len(),
      "proxy activated"
    );
    Ok(activation)
  }

  /// Intercept a request.
  ///
  /// Unmatched requests are passed through at once. Matched requests wait for
  /// activation to complete before touching the cache, and are passed through
  /// when it failed.
  pub async fn fetch(&self, request: Request) -> Result<Intercept> {
    let route = match classify(&request.url, &self.origin, &self.routes) {
      Some(route) => route,
      None => {
        debug!(url = %request.url, "passthrough");
        return Ok(Intercept::Passthrough);
      }
    };

    let mut ready = self.ready.subscribe();
    let readiness = *ready
      .wait_for(|state| *state != Readiness::Pending)
      .await
      .map_err(|e| eyre!("Proxy shut down before activation: {}", e))?;

    if readiness == Readiness::Failed {
      warn!(url = %request.url, "activation failed, passing request through");
      return Ok(Intercept::Passthrough);
    }

    let shell = self.lifecycle.partition_name();
    debug!(url = %request.url, ?route, "intercepted");

    let result = match route {
      Route::Shell => Some(self.layer.cache_first(&request, &shell).await?),
      Route::TrendingApi => self.layer.network_first(&request, &shell).await?,
      Route::Media => Some(self.layer.cache_first(&request, MEDIA_PARTITION).await?),
    };

    Ok(Intercept::Respond(result))
  }

  /// Handle a message from the foreground. Unknown actions are ignored.
  pub fn handle_message(&self, message: Message) -> Result<usize> {
    match message {
      Message::CleanGiphyCache { giphys } => {
        prune_partition(self.storage.as_ref(), MEDIA_PARTITION, &giphys)
      }
      Message::Unknown => {
        debug!("ignoring message with unknown action");
        Ok(0)
      }
    }
  }

  pub async fn dispatch(&self, event: Event) -> Result<Outcome> {
    match event {
      Event::Activate => self.activate().await.map(Outcome::Activated),
      Event::Fetch(request) => self.fetch(request).await.map(Outcome::Fetched),
      Event::Message(message) => self.handle_message(message).map(Outcome::Handled),
    }
  }

  /// Start listening for foreground messages.
  ///
  /// Each message is handled in its own task. The returned handle completes
  /// once every sender is dropped and all pending messages are handled.
  pub fn listen(self: &Arc<Self>) -> (MessageSender, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let proxy = Arc::clone(self);

    let handle = tokio::spawn(async move {
      let mut tasks = JoinSet::new();

      while let Some(message) = rx.recv().await {
        let proxy = Arc::clone(&proxy);
        tasks.spawn(async move {
          if let Err(e) = proxy.handle_message(message) {
            warn!(error = %e, "failed to handle message");
          }
        });
      }

      while tasks.join_next().await.is_some() {}
    });

    (MessageSender::new(tx), handle)
  }
}
