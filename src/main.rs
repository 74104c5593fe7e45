use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod app;
mod client;
mod config;
mod controller;
mod feedback;
mod handler;
mod logging;
mod markup;
mod transcript;
mod tui;
mod ui;

use app::App;
use client::StoryClient;
use config::Config;
use controller::{Controller, Submission, PROMPT_FLAGGED};

#[derive(Parser)]
#[command(name = "storyteller", version)]
#[command(about = "Chat with a story-telling model backend from the terminal")]
struct Cli {
    /// Backend base URL (overrides config file and STORYTELLER_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive chat (default)
    Chat,
    /// Fetch the greeting, send one prompt and print the conversation
    Ask {
        /// The prompt to send
        prompt: String,
    },
    /// Show the resolved configuration
    Config {
        /// Write the resolved configuration back to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::resolve(cli.base_url.as_deref())?;
    let command = cli.command.unwrap_or(Commands::Chat);

    if let Commands::Config { save } = command {
        return show_config(&config, save);
    }

    let mirror_stderr = matches!(command, Commands::Ask { .. });
    // Logging is best effort; the chat still works without a log file
    let _log_guard = match logging::init(config.log_dir.as_deref(), cli.verbose, mirror_stderr) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: logging disabled: {}", e);
            None
        }
    };

    let client = StoryClient::new(&config.base_url, config.request_timeout())
        .context("Failed to create HTTP client")?;
    tracing::info!(base_url = client.base_url(), "using story backend");
    let controller = Controller::new(Arc::new(client));

    match command {
        Commands::Ask { prompt } => ask(controller, &prompt).await,
        _ => run_tui(controller, &config.base_url).await,
    }
}

fn show_config(config: &Config, save: bool) -> Result<()> {
    let path = if save {
        config.save()?
    } else {
        Config::get_config_path()?
    };

    println!("{}", serde_json::to_string_pretty(config)?);
    println!();
    if save {
        println!("Saved to {}", path.display());
    } else {
        println!("Config file: {}", path.display());
    }
    Ok(())
}

async fn ask(controller: Controller, prompt: &str) -> Result<()> {
    controller.initialize().await;

    match controller.submit_prompt(prompt).await {
        Submission::Empty => eprintln!("Nothing to send: the prompt is empty."),
        Submission::Flagged => eprintln!("{}", PROMPT_FLAGGED),
        Submission::Sent | Submission::Busy => {}
    }

    println!("{}", controller.snapshot().transcript.to_plain_text());
    Ok(())
}

async fn run_tui(controller: Controller, base_url: &str) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new(tui::TICK_RATE);

    let mut app = App::new(controller, base_url);
    app.start();

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event),
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    tracing::info!("chat closed");
    result
}
