//! Core logic including the conversation loop, transcript store, tool
//! registry, model gateway client and delivery adapter.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

pub mod delivery;
mod gateway;
pub mod tool;
pub mod transcript;
mod turn;

pub use gateway::{GatewayClient, GatewayError, GatewayReply};
pub use transcript::{Transcript, Turn};
pub use turn::{CancelToken, TurnConfig, TurnEnd, TurnLoop, TurnOutcome};
