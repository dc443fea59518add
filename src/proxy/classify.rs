use url::Url;

use crate::config::RoutesConfig;

/// Caching policy a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  /// The app's own assets: cache first, shell partition
  Shell,
  /// Trending feed JSON: network first, shell partition
  TrendingApi,
  /// Remote media: cache first, media partition
  Media,
}

/// Route a request URL. First match wins; `None` means pass through.
pub fn classify(url: &Url, origin: &Url, routes: &RoutesConfig) -> Option<Route> {
  if url.origin() == origin.origin() {
    return Some(Route::Shell);
  }

  let target = format!("{}{}", url.host_str().unwrap_or_default(), url.path());

  if target.contains(&routes.trending) {
    Some(Route::TrendingApi)
  } else if target.contains(&routes.media) {
    Some(Route::Media)
  } else {
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn route(url: &str) -> Option<Route> {
    classify(
      &Url::parse(url).unwrap(),
      &Url::parse("http://localhost:8080/").unwrap(),
      &RoutesConfig::default(),
    )
  }

  #[test]
  fn test_same_origin_is_shell() {
    assert_eq!(route("http://localhost:8080/"), Some(Route::Shell));
    assert_eq!(route("http://localhost:8080/index.html"), Some(Route::Shell));
    assert_eq!(route("http://localhost:8080/images/logo.png?x=1"), Some(Route::Shell));
  }

  #[test]
  fn test_trending_endpoint() {
    assert_eq!(
      route("https://api.giphy.com/v1/gifs/trending?api_key=k&limit=12"),
      Some(Route::TrendingApi)
    );
  }

  #[test]
  fn test_media_host() {
    assert_eq!(
      route("https://media2.giphy.com/media/xT9IgG50Fb7Mi0prBC/giphy.gif?cid=1"),
      Some(Route::Media)
    );
    assert_eq!(route("https://giphy.com/media/abc/200.gif"), Some(Route::Media));
  }

  #[test]
  fn test_everything_else_passes_through() {
    assert_eq!(route("https://api.giphy.com/v1/gifs/search?q=cat"), None);
    assert_eq!(route("https://example.com/"), None);
    assert_eq!(route("http://localhost:9090/index.html"), None);
    assert_eq!(route("https://localhost:8080/index.html"), None);
    assert_eq!(route("data:text/plain,hello"), None);
  }

  #[test]
  fn test_origin_wins_over_patterns() {
    let origin = Url::parse("https://api.giphy.com").unwrap();
    let url = Url::parse("https://api.giphy.com/v1/gifs/trending").unwrap();
    assert_eq!(
      classify(&url, &origin, &RoutesConfig::default()),
      Some(Route::Shell)
    );
  }
}
