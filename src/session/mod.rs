//! Memo session management
//!
//! This module provides the `MemorySession` abstraction that manages:
//! - The reconnecting server socket
//! - Routing of server replies (text, extraction objects, speech audio)
//! - Ordered playback of speech fragments
//! - Reminder persistence from extraction results
//! - Microphone permission and the recording lifecycle

mod config;
mod dispatch;
mod session;
mod stats;

pub use config::SessionConfig;
pub use dispatch::{Dispatcher, UiEvent};
pub use session::MemorySession;
pub use stats::{MessageCounts, SessionStats};
