use std::fmt::Display;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Case-sensitive name of a connected user. Unique only while connected.
pub type DisplayName = String;

/// Instant at which the authority accepted a message.
///
/// Ordering uses the full instant; display uses local wall-clock `HH:MM:SS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageTime(DateTime<Utc>);

impl MessageTime {
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl From<DateTime<Utc>> for MessageTime {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

impl Display for MessageTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.with_timezone(&Local).format("%H:%M:%S"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub time: MessageTime,
    pub sender: DisplayName,
    pub content: String,
}

impl Message {
    pub fn new(time: MessageTime, sender: impl Into<DisplayName>, content: impl Into<String>) -> Self {
        Self {
            time,
            sender: sender.into(),
            content: content.into(),
        }
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}) {}: {}", self.time, self.sender, self.content)
    }
}
