use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub app: AppConfig,
  #[serde(default)]
  pub routes: RoutesConfig,
  #[serde(default)]
  pub trending: TrendingConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub http: HttpConfig,
  #[serde(default)]
  pub log: LogConfig,
}

/// The app whose shell is being served.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Origin the app is served from (e.g., "http://localhost:8080")
  pub origin: String,
  /// Shell version; bump it whenever the manifest changes
  #[serde(default = "default_version")]
  pub version: String,
  /// Asset paths, relative to the origin, that make up the app shell
  #[serde(default = "default_manifest")]
  pub manifest: Vec<String>,
}

fn default_version() -> String {
  "1.1".to_string()
}

fn default_manifest() -> Vec<String> {
  [
    "index.html",
    "main.js",
    "images/flame.png",
    "images/logo.png",
    "images/sync.png",
    "vendor/bootstrap.min.css",
    "vendor/jquery.min.js",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

/// Patterns matched against `host + path` of cross-origin requests.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutesConfig {
  #[serde(default = "default_trending_pattern")]
  pub trending: String,
  #[serde(default = "default_media_pattern")]
  pub media: String,
}

impl Default for RoutesConfig {
  fn default() -> Self {
    Self {
      trending: default_trending_pattern(),
      media: default_media_pattern(),
    }
  }
}

fn default_trending_pattern() -> String {
  "api.giphy.com/v1/gifs/trending".to_string()
}

fn default_media_pattern() -> String {
  "giphy.com/media/".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrendingConfig {
  #[serde(default = "default_trending_url")]
  pub url: String,
  /// Number of items requested per refresh
  #[serde(default = "default_limit")]
  pub limit: u32,
}

impl Default for TrendingConfig {
  fn default() -> Self {
    Self {
      url: default_trending_url(),
      limit: default_limit(),
    }
  }
}

fn default_trending_url() -> String {
  "https://api.giphy.com/v1/gifs/trending".to_string()
}

fn default_limit() -> u32 {
  12
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Disable to run every request straight against the network
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Cache database (defaults to $XDG_DATA_HOME/shellproxy/cache.db)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
    }
  }
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpConfig {
  /// Request timeout; unset leaves it to the transport
  pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
  /// Write logs to this file instead of stderr
  pub file: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shellproxy.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shellproxy/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/shellproxy/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("shellproxy.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shellproxy").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    Ok(config)
  }

  /// Get the Giphy API key from environment variables.
  ///
  /// Checks SHELLPROXY_GIPHY_API_KEY first, then GIPHY_API_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("SHELLPROXY_GIPHY_API_KEY")
      .or_else(|_| std::env::var("GIPHY_API_KEY"))
      .map_err(|_| {
        eyre!(
          "Giphy API key not found. Set SHELLPROXY_GIPHY_API_KEY or GIPHY_API_KEY environment variable."
        )
      })
  }

  /// Minimal config pointing at `origin`, everything else defaulted.
  #[cfg(test)]
  pub fn for_origin(origin: &str) -> Self {
    Self::parse(&format!("app:\n  origin: \"{}\"\n", origin)).unwrap()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::for_origin("http://localhost:8080");
    assert_eq!(config.app.version, "1.1");
    assert_eq!(config.app.manifest.len(), 7);
    assert_eq!(config.app.manifest[0], "index.html");
    assert_eq!(config.routes.trending, "api.giphy.com/v1/gifs/trending");
    assert_eq!(config.routes.media, "giphy.com/media/");
    assert_eq!(config.trending.limit, 12);
    assert!(config.cache.enabled);
    assert!(config.http.timeout_secs.is_none());
  }

  #[test]
  fn test_full_config() {
    let config = Config::parse(
      r#"
app:
  origin: "https://gifs.example.com"
  version: "2.0"
  manifest: ["index.html", "app.js"]
routes:
  media: "cdn.example.com/gifs/"
trending:
  limit: 25
cache:
  enabled: false
  path: /tmp/shellproxy.db
http:
  timeout_secs: 10
log:
  file: /tmp/shellproxy.log
"#,
    )
    .unwrap();

    assert_eq!(config.app.manifest, vec!["index.html", "app.js"]);
    assert_eq!(config.app.version, "2.0");
    assert_eq!(config.routes.media, "cdn.example.com/gifs/");
    assert_eq!(config.routes.trending, "api.giphy.com/v1/gifs/trending");
    assert_eq!(config.trending.limit, 25);
    assert!(!config.cache.enabled);
    assert_eq!(config.cache.path, Some(PathBuf::from("/tmp/shellproxy.db")));
    assert_eq!(config.http.timeout_secs, Some(10));
    assert_eq!(config.log.file, Some(PathBuf::from("/tmp/shellproxy.log")));
  }

  #[test]
  fn test_missing_origin_is_rejected() {
    assert!(Config::parse("app:\n  version: \"1.0\"\n").is_err());
  }

  #[test]
  fn test_explicit_missing_path_is_an_error() {
    assert!(Config::load(Some(Path::new("/nonexistent/shellproxy.yaml"))).is_err());
  }
}
