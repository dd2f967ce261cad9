use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "toolkeeper", version, about = "Toolkeeper CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Session management
    Auth {
        #[command(subcommand)]
        action: commands::auth::AuthAction,
    },
    /// Raw authenticated API call
    Api(commands::api::ApiArgs),
    /// Server-side notification inbox
    Inbox {
        #[command(subcommand)]
        action: commands::inbox::InboxAction,
    },
    /// Push notification registration
    Push {
        #[command(subcommand)]
        action: commands::push::PushAction,
    },
    /// Inspection reminders
    Reminders {
        #[command(subcommand)]
        action: commands::reminders::RemindersAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime.block_on(run(cli.command)),
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> commands::CliResult {
    match command {
        Commands::Auth { action } => commands::auth::run(action).await,
        Commands::Api(args) => commands::api::run(args).await,
        Commands::Inbox { action } => commands::inbox::run(action).await,
        Commands::Push { action } => commands::push::run(action).await,
        Commands::Reminders { action } => commands::reminders::run(action).await,
        Commands::Config { action } => commands::config::run(action),
    }
}
