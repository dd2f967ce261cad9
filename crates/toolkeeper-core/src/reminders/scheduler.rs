//! Reminder passes: fetch, plan, dispatch.

use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::ack::AckStore;
use super::backend::ReminderBackend;
use super::item::{InventoryItem, ItemSource};
use super::planner::{self, Delivery, PlannedReminder};
use super::settings::{NotificationSettings, SettingsPatch, SettingsStore};
use super::sink::{LocalNotification, NotificationSink};
use crate::storage::KeyValueStore;

/// Sinks without scheduling still show reminders due this soon.
const IMMEDIATE_WINDOW_SECS: i64 = 10;

/// Outcome of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Items received from both inventories.
    pub fetched: usize,
    /// Shown right away.
    pub dispatched: usize,
    /// Handed to the OS for later delivery.
    pub scheduled: usize,
    /// Planned but not delivered (no permission, no scheduling support, sink error).
    pub dropped: usize,
    /// Already acknowledged or repeated within the pass.
    pub suppressed: usize,
}

struct SchedulerInner {
    backend: Arc<dyn ReminderBackend>,
    sink: Arc<dyn NotificationSink>,
    settings: SettingsStore,
    acks: AckStore,
    pass_lock: Mutex<()>,
}

/// Keeps local inspection reminders in line with the inventories, the
/// user's settings and the acknowledgement set.
///
/// Passes never fail; every external problem degrades to less output and a
/// log line. Clones share one pass lock.
#[derive(Clone)]
pub struct ReminderScheduler {
    inner: Arc<SchedulerInner>,
}

impl ReminderScheduler {
    pub fn new(
        backend: Arc<dyn ReminderBackend>,
        sink: Arc<dyn NotificationSink>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                backend,
                sink,
                settings: SettingsStore::new(Arc::clone(&store)),
                acks: AckStore::new(store),
                pass_lock: Mutex::new(()),
            }),
        }
    }

    pub async fn settings(&self) -> NotificationSettings {
        self.inner.settings.load().await
    }

    pub async fn acknowledgements(&self) -> BTreeSet<String> {
        self.inner.acks.load().await
    }

    /// Full pass in the local time zone.
    pub async fn run_pass(&self) -> PassReport {
        self.run_pass_at(Utc::now(), &Local).await
    }

    pub async fn reschedule(&self) -> PassReport {
        self.run_pass().await
    }

    /// The app came to the foreground.
    pub async fn on_foreground(&self) -> PassReport {
        self.run_pass().await
    }

    /// Save a settings change and reschedule under it.
    pub async fn update_settings(&self, patch: &SettingsPatch) -> (NotificationSettings, PassReport) {
        let settings = self.inner.settings.save(patch).await;
        let report = self.run_pass().await;
        (settings, report)
    }

    pub async fn acknowledge(&self, key: &str) {
        self.inner.acks.add(key).await;
    }

    /// Forget every acknowledgement and reset the server-side read state.
    /// Runs a pass unless `reschedule` is false.
    pub async fn clear_acknowledgements(&self, reschedule: bool) -> Option<PassReport> {
        self.inner.acks.clear().await;
        if let Err(e) = self.inner.backend.mark_all_unread().await {
            tracing::debug!(error = %e, "could not reset server notifications");
        }
        if reschedule {
            Some(self.run_pass().await)
        } else {
            None
        }
    }

    /// Pass with an explicit clock and time zone.
    pub async fn run_pass_at<Tz>(&self, now: DateTime<Utc>, tz: &Tz) -> PassReport
    where
        Tz: TimeZone + Sync,
    {
        let _guard = self.inner.pass_lock.lock().await;
        let sink = &self.inner.sink;

        if let Err(e) = sink.cancel_all_scheduled().await {
            tracing::warn!(error = %e, "could not cancel scheduled reminders");
        }

        let (tools, bhp) = tokio::join!(self.fetch(ItemSource::Tools), self.fetch(ItemSource::Bhp));
        let items: Vec<InventoryItem> = tools.into_iter().chain(bhp).collect();

        let settings = self.inner.settings.load().await;
        let acks = self.inner.acks.load().await;
        let plan = planner::plan(&items, &settings, &acks, now, tz);

        let mut report = PassReport {
            fetched: items.len(),
            suppressed: plan.suppressed,
            ..PassReport::default()
        };
        if plan.reminders.is_empty() {
            tracing::debug!(?report, "nothing to remind about");
            return report;
        }

        if !sink.request_permission().await {
            tracing::info!(count = plan.reminders.len(), "notification permission denied");
            report.dropped = plan.reminders.len();
            return report;
        }

        let mut delivered = Vec::new();
        for reminder in plan.reminders {
            let notification = notification_for(&reminder);
            let shown = match reminder.delivery {
                Delivery::Immediate => Some(self.show(&notification).await),
                Delivery::Scheduled(at) if sink.supports_scheduling() => {
                    match sink.schedule(&notification, at).await {
                        Ok(()) => report.scheduled += 1,
                        Err(e) => {
                            tracing::warn!(key = %notification.key, error = %e, "could not schedule reminder");
                            report.dropped += 1;
                        }
                    }
                    None
                }
                Delivery::Scheduled(at) if at - now <= Duration::seconds(IMMEDIATE_WINDOW_SECS) => {
                    Some(self.show(&notification).await)
                }
                Delivery::Scheduled(_) => {
                    report.dropped += 1;
                    None
                }
            };
            match shown {
                Some(true) => {
                    report.dispatched += 1;
                    delivered.push(reminder.key);
                }
                Some(false) => report.dropped += 1,
                None => {}
            }
        }

        self.inner.acks.add_many(delivered).await;
        tracing::info!(
            fetched = report.fetched,
            dispatched = report.dispatched,
            scheduled = report.scheduled,
            dropped = report.dropped,
            suppressed = report.suppressed,
            "reminder pass finished"
        );
        report
    }

    async fn fetch(&self, source: ItemSource) -> Vec<InventoryItem> {
        match self.inner.backend.fetch_items(source).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(?source, error = %e, "inventory unavailable, continuing without it");
                Vec::new()
            }
        }
    }

    async fn show(&self, notification: &LocalNotification) -> bool {
        match self.inner.sink.show(notification).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = %notification.key, error = %e, "could not show reminder");
                false
            }
        }
    }
}

fn notification_for(reminder: &PlannedReminder) -> LocalNotification {
    LocalNotification {
        key: reminder.key.clone(),
        title: reminder.title.clone(),
        body: reminder.body.clone(),
    }
}
