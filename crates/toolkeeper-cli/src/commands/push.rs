use clap::Subcommand;

use super::{AppContext, CliResult};

#[derive(Subcommand)]
pub enum PushAction {
    /// Register a device push token with the backend
    Register {
        /// Platform push token
        token: String,
    },
}

pub async fn run(action: PushAction) -> CliResult {
    let ctx = AppContext::load().await?;
    match action {
        PushAction::Register { token } => {
            ctx.client.register_push_token(&token).await?;
            println!("push token registered");
        }
    }
    Ok(())
}
