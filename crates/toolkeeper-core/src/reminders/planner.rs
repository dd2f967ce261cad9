//! Turns inventory items into reminder events.
//!
//! Pure: no I/O, the clock and time zone are parameters.

use chrono::{DateTime, Days, LocalResult, NaiveDate, TimeZone, Utc};
use std::collections::{BTreeSet, HashSet};

use super::item::{InventoryItem, ItemCategory};
use super::settings::{NotificationSettings, TimeOfDay};

/// Reminder flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReminderKind {
    /// Flagged overdue by the backend without a usable date.
    Overdue,
    /// Fires on the due date.
    Expired,
    /// Seven days ahead.
    Review7,
    /// Thirty days ahead, welding equipment only.
    Review30,
}

impl ReminderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReminderKind::Overdue => "overdue",
            ReminderKind::Expired => "expired",
            ReminderKind::Review7 => "review7",
            ReminderKind::Review30 => "review30",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Show now.
    Immediate,
    /// Hand to the OS for delivery at this instant.
    Scheduled(DateTime<Utc>),
}

/// One reminder that survived deduplication and acknowledgement checks.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedReminder {
    /// Acknowledgement key, `<kind>:<item>:<epoch>:<bhp|tools>` (the overdue
    /// kind has no epoch).
    pub key: String,
    pub kind: ReminderKind,
    pub category: ItemCategory,
    pub item_key: String,
    pub due_date: Option<NaiveDate>,
    pub delivery: Delivery,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub reminders: Vec<PlannedReminder>,
    /// Candidates dropped as acknowledged or repeated within the pass.
    pub suppressed: usize,
}

/// Compute the reminders for `items`.
///
/// Fire times are the due date (minus the lead time) at the configured
/// wall-clock time in `tz`. A fire time at or before `now` means immediate
/// delivery.
pub fn plan<Tz: TimeZone>(
    items: &[InventoryItem],
    settings: &NotificationSettings,
    acks: &BTreeSet<String>,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Plan {
    let mut plan = Plan::default();
    let mut seen = HashSet::new();

    for item in items {
        let Some(item_key) = item.identity_key() else {
            tracing::debug!("skipping item without identity");
            continue;
        };

        for candidate in candidates(item, &item_key, settings, tz) {
            if !seen.insert(candidate.key.clone()) || acks.contains(&candidate.key) {
                plan.suppressed += 1;
                continue;
            }
            let delivery = match candidate.fire_at {
                Some(at) if at > now => Delivery::Scheduled(at),
                _ => Delivery::Immediate,
            };
            plan.reminders.push(PlannedReminder {
                key: candidate.key,
                kind: candidate.kind,
                category: candidate.category,
                item_key: item_key.clone(),
                due_date: candidate.due_date,
                delivery,
                title: candidate.title,
                body: candidate.body,
            });
        }
    }
    plan
}

struct Candidate {
    key: String,
    kind: ReminderKind,
    category: ItemCategory,
    due_date: Option<NaiveDate>,
    fire_at: Option<DateTime<Utc>>,
    title: String,
    body: String,
}

fn candidates<Tz: TimeZone>(
    item: &InventoryItem,
    item_key: &str,
    settings: &NotificationSettings,
    tz: &Tz,
) -> Vec<Candidate> {
    let category = item.category();
    let name = item.display_name();

    let Some(due) = item.due_date() else {
        if !item.is_overdue() {
            return Vec::new();
        }
        return vec![Candidate {
            key: format!("overdue:{item_key}:{}", category.ack_token()),
            kind: ReminderKind::Overdue,
            category,
            due_date: None,
            fire_at: None,
            title: format!("{}: inspection overdue", category.label()),
            body: format!("{name} is past its inspection date."),
        }];
    };

    let mut out = Vec::new();
    let mut push = |kind: ReminderKind, lead_days: u64, time: TimeOfDay| {
        let Some(date) = due.checked_sub_days(Days::new(lead_days)) else {
            return;
        };
        let Some(fire_at) = fire_time(date, time, tz) else {
            return;
        };
        let (title, body) = message(kind, category, &name, due);
        out.push(Candidate {
            key: format!(
                "{}:{item_key}:{}:{}",
                kind.as_str(),
                fire_at.timestamp(),
                category.ack_token()
            ),
            kind,
            category,
            due_date: Some(due),
            fire_at: Some(fire_at),
            title,
            body,
        });
    };

    if settings.expired_enabled {
        push(ReminderKind::Expired, 0, settings.expired_time);
    }
    if settings.reviews_enabled {
        if category == ItemCategory::Welding {
            push(ReminderKind::Review30, 30, settings.reviews_time);
        }
        push(ReminderKind::Review7, 7, settings.reviews_time);
    }
    out
}

fn fire_time<Tz: TimeZone>(date: NaiveDate, time: TimeOfDay, tz: &Tz) -> Option<DateTime<Utc>> {
    let local = date.and_time(time.as_naive());
    match tz.from_local_datetime(&local) {
        LocalResult::Single(at) => Some(at.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        // skipped by a DST jump; the UTC reading is within an hour of intent
        LocalResult::None => Some(tz.from_utc_datetime(&local).with_timezone(&Utc)),
    }
}

fn message(kind: ReminderKind, category: ItemCategory, name: &str, due: NaiveDate) -> (String, String) {
    let label = category.label();
    let due = due.format("%Y-%m-%d");
    match kind {
        ReminderKind::Expired => (
            format!("{label}: inspection due"),
            format!("{name}: inspection date {due} has been reached."),
        ),
        ReminderKind::Review7 => (
            format!("{label}: inspection in 7 days"),
            format!("{name}: inspection due on {due}."),
        ),
        ReminderKind::Review30 => (
            format!("{label}: inspection in 30 days"),
            format!("{name}: inspection due on {due}. Book the welding check in advance."),
        ),
        ReminderKind::Overdue => (
            format!("{label}: inspection overdue"),
            format!("{name} is past its inspection date."),
        ),
    }
}
