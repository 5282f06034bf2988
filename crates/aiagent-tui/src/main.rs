use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use aiagent_core::{attachment, ChatController, Config, GeminiClient, OllamaClient, Provider};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod handler;
mod platform;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "aiagent")]
#[command(version, about = "Chat with a vision-capable AI model from the terminal")]
struct Cli {
    /// Model provider: gemini or ollama (defaults to the config file's choice)
    #[arg(short, long, global = true, env = "AIAGENT_PROVIDER")]
    provider: Option<Provider>,
    /// Model name, e.g. gemini-1.5-pro or llava:13b
    #[arg(short, long, global = true)]
    model: Option<String>,
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat,
    /// Ask a single question and print the reply
    Ask {
        /// Your question; optional when an image is attached
        prompt: Option<String>,
        /// Image file to send along with the question
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
    /// List models for the selected provider
    Models,
    /// Save --provider, --model and the given settings to the config file
    Config {
        /// Gemini API key to store (GEMINI_API_KEY still takes precedence)
        #[arg(long)]
        api_key: Option<String>,
        /// Base URL of the Ollama server
        #[arg(long)]
        ollama_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Chat);

    // The chat screen owns the terminal, so its logs go to a file
    let log_file = matches!(command, Commands::Chat).then(log_path);
    init_logging(cli.debug, log_file.as_deref())?;

    let config = Config::load().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "could not load config, using defaults");
        Config::new()
    });
    let provider = cli.provider.unwrap_or_else(|| config.provider());

    match command {
        Commands::Chat => {
            let client = aiagent_core::connect(&config, provider, cli.model.as_deref())?;
            run_chat(Arc::new(ChatController::new(client))).await
        }
        Commands::Ask { prompt, image } => {
            let client = aiagent_core::connect(&config, provider, cli.model.as_deref())?;
            let controller = ChatController::new(client);
            ask(&controller, prompt.as_deref().unwrap_or_default(), image.as_deref()).await
        }
        Commands::Models => list_models(&config, provider).await,
        Commands::Config { api_key, ollama_url } => {
            let mut config = config;
            if let Some(provider) = cli.provider {
                config.set_provider(provider);
            }
            if let Some(model) = cli.model {
                config.model = Some(model);
            }
            if let Some(key) = api_key {
                config.gemini_api_key = Some(key);
            }
            if let Some(url) = ollama_url {
                config.ollama_url = Some(url);
            }
            save_config(&config)
        }
    }
}

fn log_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("aiagent")
        .join("aiagent.log")
}

fn init_logging(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let default_directive = match (debug, log_file.is_some()) {
        (true, _) => "aiagent=debug,aiagent_core=debug",
        (false, true) => "aiagent=info,aiagent_core=info",
        (false, false) => "warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let registry = tracing_subscriber::registry().with(filter);

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Could not open log file {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }

    Ok(())
}

async fn run_chat(controller: Arc<ChatController>) -> Result<()> {
    tracing::info!(client = %controller.describe_client(), "starting chat");

    let mut events = EventHandler::new(controller.conversation());
    let mut app = App::new(controller, events.sender());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run_loop(&mut terminal, &mut app, &mut events).await;
    tui::restore()?;

    result
}

async fn run_loop(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event)?,
            None => break,
        }
    }
    Ok(())
}

async fn ask(controller: &ChatController, prompt: &str, image: Option<&Path>) -> Result<()> {
    let reply = match image {
        Some(path) => {
            let image = attachment::load_from_path(path)
                .with_context(|| format!("Could not attach {}", path.display()))?;
            controller.submit_image(image, prompt).await?
        }
        None => controller.submit_text(prompt).await?,
    };

    println!("{}", reply.content());
    Ok(())
}

fn save_config(config: &Config) -> Result<()> {
    config.save()?;
    let path = Config::config_path()?;

    let provider = config.provider();
    println!("Saved {}", path.display());
    println!("  provider:   {}", provider);
    println!("  model:      {}", config.model_for(provider));
    println!("  ollama url: {}", config.ollama_url());
    println!(
        "  api key:    {}",
        config.gemini_api_key().as_deref().map(mask_key).unwrap_or_else(|| "(not set)".to_string())
    );
    Ok(())
}

/// Last four characters only
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let visible: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("{}{}", "*".repeat(chars.len().saturating_sub(4).min(8)), visible)
}

async fn list_models(config: &Config, provider: Provider) -> Result<()> {
    let models = match provider {
        Provider::Gemini => GeminiClient::list_models(),
        Provider::Ollama => OllamaClient::new(&config.ollama_url(), provider.default_model())
            .list_models()
            .await
            .context("Could not reach Ollama. Make sure it is running with: ollama serve")?,
    };

    println!("{} models:", provider.display_name());
    if models.is_empty() {
        println!("  (none installed - pull one with: ollama pull llava)");
    }
    for model in models {
        println!("  • {}", model);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key_shows_only_the_tail() {
        assert_eq!(mask_key("AIzaSyExampleKey1234"), "********1234");
        assert_eq!(mask_key("abc"), "abc");
        assert_eq!(mask_key(""), "");
    }

    #[test]
    fn test_config_subcommand_parses() {
        let cli = Cli::parse_from(["aiagent", "--provider", "ollama", "config", "--ollama-url", "http://gpu:11434"]);
        assert_eq!(cli.provider, Some(Provider::Ollama));
        match cli.command {
            Some(Commands::Config { api_key, ollama_url }) => {
                assert_eq!(api_key, None);
                assert_eq!(ollama_url.as_deref(), Some("http://gpu:11434"));
            }
            _ => panic!("expected the config subcommand"),
        }
    }
}
