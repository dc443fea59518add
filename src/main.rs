mod cache;
mod config;
mod feed;
mod net;
mod proxy;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use url::Url;

use cache::{body_digest, CacheSource, CacheStorage, NoopStorage, RequestKey, SqliteStorage};
use config::{Config, LogConfig};
use feed::TrendingFeed;
use net::{HttpNetwork, Network, Request};
use proxy::{Event, Intercept, Message, Outcome, Proxy};

#[derive(Parser, Debug)]
#[command(name = "shellproxy")]
#[command(about = "An offline-first caching proxy for a single-page app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/shellproxy/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Install the app shell and drop stale shell versions
  Activate,
  /// Request a URL through the proxy
  Fetch {
    url: String,
    /// Write the body to stdout
    #[arg(long)]
    body: bool,
  },
  /// Refresh the trending feed and prune the media cache to it
  Refresh,
  /// Prune the media cache to the given URLs
  Clean { urls: Vec<String> },
  /// List cache partitions and their entries
  Partitions {
    /// Also list every entry
    #[arg(short, long)]
    entries: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = init_tracing(&config.log)?;

  let network = Arc::new(HttpNetwork::new(&config)?);

  if config.cache.enabled {
    let storage = SqliteStorage::open(config.cache.path.as_deref())?;
    run(args.command, &config, Arc::new(storage), network).await
  } else {
    warn!("caching disabled, every request goes to the network");
    run(args.command, &config, Arc::new(NoopStorage), network).await
  }
}

async fn run<S, N>(command: Command, config: &Config, storage: Arc<S>, network: Arc<N>) -> Result<()>
where
  S: CacheStorage + 'static,
  N: Network + 'static,
{
  let proxy = Arc::new(Proxy::new(config, Arc::clone(&storage), Arc::clone(&network))?);

  match command {
    Command::Partitions { entries } => list_partitions(storage.as_ref(), entries)?,
    Command::Activate => {
      let Outcome::Activated(activation) = proxy.dispatch(Event::Activate).await? else {
        return Err(eyre!("Unexpected outcome for activation"));
      };
      println!(
        "{}: {} assets installed, {} stale partitions removed",
        activation.partition,
        activation.installed,
        activation.removed.len()
      );
      for name in &activation.removed {
        println!("  removed {}", name);
      }
    }
    Command::Fetch { url, body } => {
      let url = Url::parse(&url).map_err(|e| eyre!("Invalid URL '{}': {}", url, e))?;
      proxy.activate().await?;
      fetch(&proxy, network.as_ref(), url, body).await?;
    }
    Command::Refresh => {
      let api_key = Config::get_api_key()?;
      proxy.activate().await?;

      let (messages, listener) = proxy.listen();
      let feed = TrendingFeed::new(
        Arc::clone(&proxy),
        network,
        messages,
        &config.trending,
        &api_key,
      )?;

      match feed.refresh().await {
        Ok(gifs) => {
          for gif in &gifs {
            println!("{}\t{}\t{}", gif.id, gif.url, gif.title);
          }
        }
        Err(e) => {
          warn!(error = %e, "trending refresh failed");
          eprintln!("Could not refresh trending GIFs. Check your connection and try again.");
        }
      }

      // Closing the feed's sender lets the listener drain and finish
      drop(feed);
      listener
        .await
        .map_err(|e| eyre!("Message listener failed: {}", e))?;
    }
    Command::Clean { urls } => {
      proxy.activate().await?;
      let message = Event::Message(Message::CleanGiphyCache { giphys: urls });
      if let Outcome::Handled(pruned) = proxy.dispatch(message).await? {
        println!("{} media entries pruned", pruned);
      }
    }
  }

  Ok(())
}

async fn fetch<S, N>(proxy: &Proxy<S, N>, network: &N, url: Url, print_body: bool) -> Result<()>
where
  S: CacheStorage + 'static,
  N: Network + 'static,
{
  let request = Request::get(url);

  let Outcome::Fetched(intercept) = proxy.dispatch(Event::Fetch(request.clone())).await? else {
    return Err(eyre!("Unexpected outcome for fetch"));
  };

  let (res, source) = match intercept {
    Intercept::Respond(Some(result)) => {
      if result.source == CacheSource::Offline {
        warn!(url = %request.url, "network unavailable, serving cached copy");
      }
      let source = match result.cached_at {
        Some(at) => format!("{}, cached {}", result.source, at.format("%Y-%m-%d %H:%M:%S")),
        None => result.source.to_string(),
      };
      (result.data, source)
    }
    Intercept::Respond(None) => return Err(eyre!("Offline and nothing cached for {}", request.url)),
    Intercept::Passthrough => (network.fetch(&request).await?, "passthrough".to_string()),
  };

  let status = res.status();
  let content_type = res.header("content-type").unwrap_or("-").to_string();
  let body = res.into_body();

  if print_body {
    use std::io::Write;
    std::io::stdout()
      .write_all(&body)
      .map_err(|e| eyre!("Failed to write body: {}", e))?;
  } else {
    println!(
      "{} {} {} ({} bytes, {}) sha256={}",
      status,
      request.url,
      content_type,
      body.len(),
      source,
      body_digest(&body)
    );
  }

  Ok(())
}

fn list_partitions<S: CacheStorage>(storage: &S, entries: bool) -> Result<()> {
  for name in storage.partition_names()? {
    let keys: Vec<RequestKey> = storage.keys(&name)?;
    println!("{} ({} entries)", name, keys.len());

    if entries {
      for key in keys {
        match storage.get(&name, &key)? {
          Some(entry) => println!(
            "  {}  {}  {} bytes  sha256={}  cached {}",
            key,
            entry.response.status(),
            entry.response.body_len(),
            &entry.digest[..12],
            entry.cached_at.format("%Y-%m-%d %H:%M:%S")
          ),
          None => println!("  {}", key),
        }
      }
    }
  }

  Ok(())
}

/// Log to stderr, or to `log.file` through a non-blocking writer.
fn init_tracing(config: &LogConfig) -> Result<Option<WorkerGuard>> {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shellproxy=info"));

  match &config.file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;

      let appender = tracing_appender::rolling::never(dir, file_name);
      let (writer, guard) = tracing_appender::non_blocking(appender);

      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

      Ok(None)
    }
  }
}
