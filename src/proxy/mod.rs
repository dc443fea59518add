//! The intercepting proxy: request routing, strategy dispatch, and the
//! foreground message channel.

mod classify;
mod message;
mod worker;

pub use message::{Message, MessageSender};
pub use worker::{Event, Intercept, Outcome, Proxy};
