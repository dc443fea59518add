//! Serde-deserializable types matching the Giphy trending response.
//!
//! Only the fields the feed uses are modelled; everything else is ignored.

use serde::Deserialize;

use super::Gif;

#[derive(Debug, Deserialize)]
pub struct ApiTrendingResponse {
  #[serde(default)]
  pub data: Vec<ApiGif>,
}

#[derive(Debug, Deserialize)]
pub struct ApiGif {
  #[serde(default)]
  pub id: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub images: ApiImages,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiImages {
  pub downsized_large: Option<ApiImage>,
}

#[derive(Debug, Deserialize)]
pub struct ApiImage {
  pub url: String,
}

impl ApiGif {
  /// Items without a usable rendition are dropped.
  pub fn into_gif(self) -> Option<Gif> {
    let url = self.images.downsized_large?.url;
    if url.is_empty() {
      return None;
    }
    Some(Gif {
      id: self.id,
      title: self.title,
      url,
    })
  }
}
