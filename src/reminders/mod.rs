mod store;
mod types;

pub use store::{JsonFileStore, MemoryStore, ReminderError, ReminderList, ReminderStore};
pub use types::{ExtractionObject, Reminder};
