mod common;
mod config;
mod identity;
mod network;
mod ui;

use std::error::Error;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::io::BufReader;

use common::Message;
use config::AppConfig;
use identity::Profile;
use network::ChatService;
use ui::ChatApp;

#[derive(Parser)]
#[command(
    name = "hub_chat",
    version,
    about = "Terminal chat client for a real-time message hub"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Hub endpoint, overrides the config file
    #[arg(long, env = "CHAT_HUB_URL")]
    hub_url: Option<String>,
    /// Broadcast endpoint, overrides the config file
    #[arg(long, env = "CHAT_BROADCAST_URL")]
    broadcast_url: Option<String>,
    /// Name shown on outgoing messages instead of the profile's
    #[arg(long, env = "CHAT_SENDER")]
    sender: Option<String>,
    /// Profile written by the identity provider after sign-in
    #[arg(long, env = "CHAT_PROFILE", value_name = "FILE")]
    profile: Option<String>,
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Clone, PartialEq, Eq)]
enum Mode {
    /// Print the signed-in user's profile
    Profile,
    /// Post one message and exit
    Send { body: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    // Khởi tạo Logger để debug
    env_logger::init();

    let cli = Cli::parse();
    let app_config = resolve_config(&cli);

    match cli.mode.clone() {
        Some(Mode::Profile) => {
            let profile = Profile::load(&app_config.profile_path)?;
            println!("{}", profile.to_pretty_json()?);
            Ok(())
        }
        Some(Mode::Send { body }) => {
            let sender = identity::resolve_sender(cli.sender.as_deref(), &app_config.profile_path)?;
            let message = Message::new(sender, body)?;
            let service = ChatService::new(&app_config);
            let reply = service.post(&message).await?;
            log::info!("Message sent: {reply}");
            Ok(())
        }
        None => run_chat(&cli, app_config).await,
    }
}

fn resolve_config(cli: &Cli) -> AppConfig {
    let mut app_config = config::load_config(&cli.config);
    if let Some(hub_url) = &cli.hub_url {
        app_config.hub_url = hub_url.clone();
    }
    if let Some(broadcast_url) = &cli.broadcast_url {
        app_config.broadcast_url = broadcast_url.clone();
    }
    if let Some(profile) = &cli.profile {
        app_config.profile_path = profile.clone();
    }
    app_config
}

async fn run_chat(cli: &Cli, app_config: AppConfig) -> Result<(), Box<dyn Error>> {
    let sender = identity::resolve_sender(cli.sender.as_deref(), &app_config.profile_path)?;

    // Một kết nối duy nhất tới hub, dùng chung giữa UI và tầng mạng
    let service = Arc::new(ChatService::new(&app_config));
    let mut app = ChatApp::new(Arc::clone(&service), sender.clone());
    service.start();

    log::info!(
        "Chatting as {sender} via {} (type {} to leave)",
        app_config.hub_url,
        ui::components::input_bar::QUIT_COMMAND
    );

    let stdin = BufReader::new(tokio::io::stdin());
    app.run(stdin, tokio::io::stdout()).await?;

    log::info!("Leaving chat after {} messages", app.messages().len());
    service.stop();
    Ok(())
}
