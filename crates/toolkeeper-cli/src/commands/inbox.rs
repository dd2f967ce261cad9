use clap::Subcommand;
use toolkeeper_core::api::is_invalid_notification_id;

use super::{print_json, AppContext, CliResult};

#[derive(Subcommand)]
pub enum InboxAction {
    /// List notifications
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark one notification read
    Read { id: String },
    /// Mark every notification read
    ReadAll,
    /// Mark one notification unread
    Unread { id: String },
    /// Mark every notification unread
    UnreadAll,
}

pub async fn run(action: InboxAction) -> CliResult {
    let ctx = AppContext::load().await?;
    let client = &ctx.client;

    match action {
        InboxAction::List { json } => {
            let notifications = client.list_notifications().await?;
            if json {
                return print_json(&notifications);
            }
            if notifications.is_empty() {
                println!("no notifications");
            }
            for n in &notifications {
                let marker = if n.read { " " } else { "*" };
                let title = n.title.as_deref().unwrap_or("(untitled)");
                println!("{marker} {:<12} {title}", n.id);
                if let Some(message) = &n.message {
                    println!("  {message}");
                }
            }
        }
        InboxAction::Read { id } => {
            mark(client.mark_notification_read(&id).await, &id)?;
            println!("ok");
        }
        InboxAction::Unread { id } => {
            mark(client.mark_notification_unread(&id).await, &id)?;
            println!("ok");
        }
        InboxAction::ReadAll => {
            client.mark_all_notifications_read().await?;
            println!("ok");
        }
        InboxAction::UnreadAll => {
            client.mark_all_notifications_unread().await?;
            println!("ok");
        }
    }
    Ok(())
}

fn mark(result: Result<(), toolkeeper_core::ApiError>, id: &str) -> CliResult {
    match result {
        Err(e) if is_invalid_notification_id(&e) => Err(format!("no notification with id {id}").into()),
        other => Ok(other?),
    }
}
