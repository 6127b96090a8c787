use serde::{Deserialize, Serialize};

/// A persisted reminder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub category_icon: String,
    pub datetime: String,
    pub description: String,
    #[serde(default)]
    pub is_done: bool,
}

/// Structured extraction result sent by the server as an `obj` message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionObject {
    #[serde(default)]
    pub is_reminder: bool,
    pub category_icon: Option<String>,
    pub reminder_datetime: Option<String>,
    pub main_event: Option<String>,
    pub transcription: Option<String>,
    pub reflection: Option<String>,
}

impl ExtractionObject {
    /// The reminder this object describes, if it is a complete one.
    pub fn to_reminder(&self) -> Option<Reminder> {
        if !self.is_reminder {
            return None;
        }
        Some(Reminder {
            category_icon: non_empty(&self.category_icon)?,
            datetime: non_empty(&self.reminder_datetime)?,
            description: non_empty(&self.main_event)?,
            is_done: false,
        })
    }

    /// Text to show for a transcribed memo: the reflection, or empty.
    pub fn response_text(&self) -> Option<String> {
        self.transcription
            .as_ref()
            .map(|_| self.reflection.clone().unwrap_or_default())
    }
}

fn non_empty(field: &Option<String>) -> Option<String> {
    field.as_ref().filter(|s| !s.is_empty()).cloned()
}
