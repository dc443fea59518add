use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Messages the foreground can post to the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Message {
  /// Prune the media partition down to the GIFs currently on screen
  #[serde(rename = "cleanGiphyCache")]
  CleanGiphyCache { giphys: Vec<String> },
  /// Any action this proxy does not know; ignored
  #[serde(other)]
  Unknown,
}

/// Foreground end of the message channel.
///
/// Delivery is at most once and nothing is acknowledged.
#[derive(Debug, Clone)]
pub struct MessageSender {
  tx: mpsc::UnboundedSender<Message>,
}

impl MessageSender {
  pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
    Self { tx }
  }

  pub fn post(&self, message: Message) {
    if let Err(e) = self.tx.send(message) {
      debug!(message = ?e.0, "no proxy listening, message dropped");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_clean_message() {
    let msg: Message = serde_json::from_str(
      r#"{"action":"cleanGiphyCache","giphys":["https://media.giphy.com/media/a/giphy.gif"]}"#,
    )
    .unwrap();

    assert_eq!(
      msg,
      Message::CleanGiphyCache {
        giphys: vec!["https://media.giphy.com/media/a/giphy.gif".to_string()]
      }
    );
  }

  #[test]
  fn test_serialize_clean_message() {
    let msg = Message::CleanGiphyCache { giphys: vec![] };
    assert_eq!(
      serde_json::to_string(&msg).unwrap(),
      r#"{"action":"cleanGiphyCache","giphys":[]}"#
    );
  }

  #[test]
  fn test_unknown_action_is_not_an_error() {
    let msg: Message = serde_json::from_str(r#"{"action":"skipWaiting"}"#).unwrap();
    assert_eq!(msg, Message::Unknown);
  }

  #[tokio::test]
  async fn test_post_delivers_once() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sender = MessageSender::new(tx);

    sender.post(Message::Unknown);
    drop(sender);

    assert_eq!(rx.recv().await, Some(Message::Unknown));
    assert_eq!(rx.recv().await, None);
  }

  #[test]
  fn test_post_without_receiver_is_dropped() {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    MessageSender::new(tx).post(Message::Unknown);
  }
}
