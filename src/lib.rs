pub mod capture;
pub mod config;
pub mod playback;
pub mod reminders;
pub mod session;
pub mod socket;

pub use capture::{AudioFile, CpalRecorder, FileRecorder, Recorder};
pub use config::Config;
pub use playback::{
    AudioFragment, AudioSink, DirectorySink, PlaybackQueue, QueueSnapshot, RodioSink,
};
pub use reminders::{ExtractionObject, JsonFileStore, MemoryStore, Reminder, ReminderList, ReminderStore};
pub use session::{Dispatcher, MemorySession, SessionConfig, SessionStats, UiEvent};
pub use socket::{
    ConnectionState, ConnectionStatus, Connector, InboundMessage, OutboundMessage, ReconnectPolicy,
    SocketConfig, SocketSession, WsConnector,
};
