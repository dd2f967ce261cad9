use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use std::sync::Arc;
use toolkeeper_core::reminders::{
    HttpReminderBackend, LocalNotification, NotificationSettings, NotificationSink, PassReport,
    ReminderScheduler, SettingsPatch, SettingsStore, TimeOfDay,
};
use toolkeeper_core::SinkError;

use super::{print_json, AppContext, CliResult};

#[derive(Subcommand)]
pub enum RemindersAction {
    /// Run a reminder pass now
    Run {
        /// Output the pass report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reminder settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Delivered-reminder acknowledgements
    Acks {
        #[command(subcommand)]
        action: AcksAction,
    },
}

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Show current settings
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Change settings; unspecified fields keep their value
    Set {
        /// Enable 7/30-day advance reminders
        #[arg(long)]
        reviews: Option<bool>,
        /// Enable due-date reminders
        #[arg(long)]
        expired: Option<bool>,
        /// Time of advance reminders (HH:MM)
        #[arg(long)]
        reviews_time: Option<TimeOfDay>,
        /// Time of due-date reminders (HH:MM)
        #[arg(long)]
        expired_time: Option<TimeOfDay>,
        /// Run a reminder pass with the new settings
        #[arg(long)]
        reschedule: bool,
    },
}

#[derive(Subcommand)]
pub enum AcksAction {
    /// List acknowledged reminder keys
    List,
    /// Forget all acknowledgements
    Clear {
        /// Do not run a reminder pass afterwards
        #[arg(long)]
        no_reschedule: bool,
    },
}

/// Prints reminders to stdout. Cannot schedule, so only reminders that are
/// due are shown.
struct ConsoleSink;

#[async_trait]
impl NotificationSink for ConsoleSink {
    async fn request_permission(&self) -> bool {
        true
    }

    fn supports_scheduling(&self) -> bool {
        false
    }

    async fn show(&self, notification: &LocalNotification) -> Result<(), SinkError> {
        println!("[{}] {}", notification.title, notification.body);
        Ok(())
    }

    async fn schedule(
        &self,
        _notification: &LocalNotification,
        _at: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        Err(SinkError("console cannot schedule notifications".into()))
    }

    async fn cancel_all_scheduled(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

pub async fn run(action: RemindersAction) -> CliResult {
    let ctx = AppContext::load().await?;
    let backend = HttpReminderBackend::new(ctx.client.clone(), &ctx.config.reminders);
    let scheduler = ReminderScheduler::new(
        Arc::new(backend),
        Arc::new(ConsoleSink),
        Arc::clone(&ctx.store),
    );

    match action {
        RemindersAction::Run { json } => {
            let report = scheduler.run_pass().await;
            print_report(&report, json)?;
        }
        RemindersAction::Settings { action } => match action {
            SettingsAction::Show { json } => {
                let settings = scheduler.settings().await;
                if json {
                    return print_json(&settings);
                }
                print_settings(&settings);
            }
            SettingsAction::Set {
                reviews,
                expired,
                reviews_time,
                expired_time,
                reschedule,
            } => {
                let patch = SettingsPatch {
                    reviews_enabled: reviews,
                    expired_enabled: expired,
                    reviews_time,
                    expired_time,
                };
                if patch.is_empty() {
                    return Err("nothing to change".into());
                }
                if reschedule {
                    let (settings, report) = scheduler.update_settings(&patch).await;
                    print_settings(&settings);
                    print_report(&report, false)?;
                } else {
                    let store = SettingsStore::new(Arc::clone(&ctx.store));
                    print_settings(&store.save(&patch).await);
                }
            }
        },
        RemindersAction::Acks { action } => match action {
            AcksAction::List => {
                for key in scheduler.acknowledgements().await {
                    println!("{key}");
                }
            }
            AcksAction::Clear { no_reschedule } => {
                match scheduler.clear_acknowledgements(!no_reschedule).await {
                    Some(report) => print_report(&report, false)?,
                    None => println!("acknowledgements cleared"),
                }
            }
        },
    }
    Ok(())
}

fn print_settings(settings: &NotificationSettings) {
    let on_off = |v: bool| if v { "on" } else { "off" };
    println!("reviews:      {} at {}", on_off(settings.reviews_enabled), settings.reviews_time);
    println!("expired:      {} at {}", on_off(settings.expired_enabled), settings.expired_time);
}

fn print_report(report: &PassReport, json: bool) -> CliResult {
    if json {
        return print_json(report);
    }
    println!(
        "fetched {} items: {} shown, {} scheduled, {} dropped, {} already acknowledged",
        report.fetched, report.dispatched, report.scheduled, report.dropped, report.suppressed
    );
    Ok(())
}
