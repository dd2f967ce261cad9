//! Local inspection reminders for tools and BHP equipment.
//!
//! A pass cancels whatever the OS still has scheduled, fetches both
//! inventories, plans reminder events from their due dates and hands the
//! survivors to a [`NotificationSink`]. Reminders shown to the user are
//! recorded in the [`AckStore`] so they are not repeated.

mod ack;
mod backend;
mod item;
mod planner;
mod scheduler;
mod settings;
mod sink;

pub use ack::AckStore;
pub use backend::{HttpReminderBackend, ReminderBackend};
pub use item::{parse_date, InventoryItem, ItemCategory, ItemSource};
pub use planner::{plan, Delivery, Plan, PlannedReminder, ReminderKind};
pub use scheduler::{PassReport, ReminderScheduler};
pub use settings::{NotificationSettings, SettingsPatch, SettingsStore, TimeOfDay};
pub use sink::{LocalNotification, NotificationSink};
