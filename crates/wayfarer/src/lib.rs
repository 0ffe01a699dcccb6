//! An out-of-the-box trip-planning assistant that wires travel tools and
//! a model provider into a conversation session.
//!
//! The crate includes a CLI for chatting in the terminal, and can also be
//! used as a library to embed the assistant into a host application.

#![deny(missing_docs)]

#[allow(unused_imports)]
#[macro_use]
extern crate tracing;

mod session;
pub mod tools;

pub use session::{Session, SessionBuilder, default_system_prompt};

/// Re-exports of the [`wayfarer_core`] crate.
pub mod core {
    pub use wayfarer_core::*;
}
