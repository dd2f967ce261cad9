//! User preferences for inspection reminders.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::storage::{keys, KeyValueStore};

/// Wall-clock time a reminder fires at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTimeOfDay")]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

#[derive(Deserialize)]
struct RawTimeOfDay {
    hour: u8,
    minute: u8,
}

impl TryFrom<RawTimeOfDay> for TimeOfDay {
    type Error = String;

    fn try_from(raw: RawTimeOfDay) -> Result<Self, Self::Error> {
        TimeOfDay::new(raw.hour, raw.minute)
            .ok_or_else(|| format!("{}:{} is not a valid time", raw.hour, raw.minute))
    }
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn as_naive(self) -> NaiveTime {
        NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
            .unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = String;

    /// Parses `HH:MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("expected HH:MM, got '{s}'"))?;
        let hour = h.parse().map_err(|_| format!("invalid hour '{h}'"))?;
        let minute = m.parse().map_err(|_| format!("invalid minute '{m}'"))?;
        TimeOfDay::new(hour, minute).ok_or_else(|| format!("{s} is not a valid time"))
    }
}

/// Reminder toggles and delivery times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    /// 7- and 30-day advance reminders.
    pub reviews_enabled: bool,
    /// Reminder on the due date itself.
    pub expired_enabled: bool,
    pub reviews_time: TimeOfDay,
    pub expired_time: TimeOfDay,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            reviews_enabled: true,
            expired_enabled: true,
            reviews_time: TimeOfDay { hour: 9, minute: 0 },
            expired_time: TimeOfDay { hour: 8, minute: 0 },
        }
    }
}

impl NotificationSettings {
    /// Overlay a stored, possibly partial, record on the defaults. Fields
    /// that are missing or invalid keep their default.
    pub fn from_stored(stored: Value) -> Self {
        let mut merged = Self::default();
        let Value::Object(fields) = stored else {
            return merged;
        };

        for (key, value) in fields {
            let Ok(Value::Object(mut candidate)) = serde_json::to_value(merged) else {
                break;
            };
            candidate.insert(key.clone(), value);
            match serde_json::from_value(Value::Object(candidate)) {
                Ok(next) => merged = next,
                Err(e) => tracing::warn!(%key, error = %e, "ignoring invalid stored setting"),
            }
        }
        merged
    }

    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(v) = patch.reviews_enabled {
            self.reviews_enabled = v;
        }
        if let Some(v) = patch.expired_enabled {
            self.expired_enabled = v;
        }
        if let Some(v) = patch.reviews_time {
            self.reviews_time = v;
        }
        if let Some(v) = patch.expired_time {
            self.expired_time = v;
        }
    }
}

/// Partial update of [`NotificationSettings`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub reviews_enabled: Option<bool>,
    pub expired_enabled: Option<bool>,
    pub reviews_time: Option<TimeOfDay>,
    pub expired_time: Option<TimeOfDay>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Reads and writes [`NotificationSettings`]. Never fails; storage problems
/// are logged and the defaults (or the unsaved value) are returned.
#[derive(Clone)]
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self) -> NotificationSettings {
        let raw = match self.store.get(keys::NOTIFICATION_SETTINGS).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return NotificationSettings::default(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read notification settings");
                return NotificationSettings::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => NotificationSettings::from_stored(value),
            Err(e) => {
                tracing::warn!(error = %e, "stored notification settings are not JSON");
                NotificationSettings::default()
            }
        }
    }

    /// Merge `patch` over the current record and persist it. Concurrent
    /// saves are last-writer-wins.
    pub async fn save(&self, patch: &SettingsPatch) -> NotificationSettings {
        let mut settings = self.load().await;
        settings.apply(patch);
        match serde_json::to_string(&settings) {
            Ok(raw) => {
                if let Err(e) = self.store.set(keys::NOTIFICATION_SETTINGS, &raw).await {
                    tracing::warn!(error = %e, "could not save notification settings");
                }
            }
            Err(e) => tracing::warn!(error = %e, "could not encode notification settings"),
        }
        settings
    }
}
