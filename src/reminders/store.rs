use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{error, info};

use super::types::Reminder;

/// Whole-list persistence for reminders
pub trait ReminderStore: Send + Sync {
    fn load(&self) -> Result<Vec<Reminder>>;
    fn save(&self, reminders: &[Reminder]) -> Result<()>;
}

/// JSON array on disk
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReminderStore for JsonFileStore {
    fn load(&self) -> Result<Vec<Reminder>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse reminders in {}", self.path.display()))
    }

    fn save(&self, reminders: &[Reminder]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context("Failed to create reminders directory")?;
            }
        }
        let json =
            serde_json::to_string_pretty(reminders).context("Failed to serialize reminders")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// In-process store
#[derive(Default)]
pub struct MemoryStore {
    reminders: Mutex<Vec<Reminder>>,
}

impl ReminderStore for MemoryStore {
    fn load(&self) -> Result<Vec<Reminder>> {
        Ok(self
            .reminders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }

    fn save(&self, reminders: &[Reminder]) -> Result<()> {
        *self
            .reminders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = reminders.to_vec();
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("no reminder at position {index} (have {len})")]
    OutOfRange { index: usize, len: usize },
}

/// Reminder operations over a get-all / set-all store
#[derive(Clone)]
pub struct ReminderList {
    store: Arc<dyn ReminderStore>,
}

impl ReminderList {
    pub fn new(store: Arc<dyn ReminderStore>) -> Self {
        Self { store }
    }

    /// Current reminders, newest first. Unreadable storage reads as empty.
    pub fn all(&self) -> Vec<Reminder> {
        match self.store.load() {
            Ok(reminders) => reminders,
            Err(e) => {
                error!("Failed to load reminders: {:#}", e);
                Vec::new()
            }
        }
    }

    /// Prepend and persist.
    pub fn add(&self, reminder: Reminder) -> Result<Vec<Reminder>> {
        let mut reminders = self.all();
        reminders.insert(0, reminder);
        self.store.save(&reminders)?;
        info!("Reminder added: {}", reminders[0].description);
        Ok(reminders)
    }

    /// Flip the done flag of the reminder at `index`.
    pub fn toggle(&self, index: usize) -> Result<Reminder> {
        let mut reminders = self.all();
        let len = reminders.len();
        let reminder = reminders
            .get_mut(index)
            .ok_or(ReminderError::OutOfRange { index, len })?;
        reminder.is_done = !reminder.is_done;
        let toggled = reminder.clone();
        self.store.save(&reminders)?;
        Ok(toggled)
    }

    pub fn remove(&self, index: usize) -> Result<Reminder> {
        let mut reminders = self.all();
        if index >= reminders.len() {
            return Err(ReminderError::OutOfRange {
                index,
                len: reminders.len(),
            }
            .into());
        }
        let removed = reminders.remove(index);
        self.store.save(&reminders)?;
        Ok(removed)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.save(&[])?;
        info!("Reminders cleared");
        Ok(())
    }
}
