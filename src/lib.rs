//! Talkback - speech interaction orchestrator
//!
//! Captures spoken input and decides when an utterance should be submitted
//! automatically, and plays synthesized speech while driving a synchronized
//! jaw animation and subtitle stream.

pub mod clock;
pub mod config;
pub mod devices;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod speech;
pub mod timers;

pub use error::{ErrorClass, Result, TalkbackError};
pub use orchestrator::Orchestrator;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "talkback";
