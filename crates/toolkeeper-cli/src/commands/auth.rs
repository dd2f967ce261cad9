use clap::Subcommand;
use std::io::BufRead;

use super::{AppContext, CliResult};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Log in with username and password
    Login {
        /// Account username
        username: String,
        /// Password (read from stdin when omitted)
        #[arg(long)]
        password: Option<String>,
    },
    /// End the session and stop automatic refresh
    Logout,
    /// Show whether a session token is held
    Status,
    /// Renew the session now
    Refresh,
}

pub async fn run(action: AuthAction) -> CliResult {
    let ctx = AppContext::load().await?;
    let client = &ctx.client;

    match action {
        AuthAction::Login { username, password } => {
            let password = match password {
                Some(p) => p,
                None => read_password()?,
            };
            if client.login(&username, &password).await? {
                println!("logged in");
            } else {
                println!("logged in (cookie session)");
            }
        }
        AuthAction::Logout => {
            client.logout().await?;
            println!("logged out");
        }
        AuthAction::Status => {
            println!(
                "{}",
                if client.session().is_authenticated() {
                    "authenticated"
                } else {
                    "not authenticated"
                }
            );
        }
        AuthAction::Refresh => {
            if client.refresh_session().await {
                println!("session refreshed");
            } else {
                return Err("session could not be refreshed, log in again".into());
            }
        }
    }
    Ok(())
}

fn read_password() -> Result<String, Box<dyn std::error::Error>> {
    eprint!("password: ");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err("password required".into());
    }
    Ok(password)
}
