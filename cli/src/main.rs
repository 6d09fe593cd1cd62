//! CLI for the courier toolkit.
//!
//! Posts Discord messages through webhooks or a bot token, and drives
//! OpenHands Cloud conversations over the V0 and V1 REST APIs. Results
//! print to stdout as JSON; logs and errors go to stderr.

use clap::{Args, Parser, Subcommand};
use courier::http::{PostBody, PostOptions};
use courier::openhands::{ApiError, V0Client, V1Client, DEFAULT_BASE_URL};
use courier::{BotClient, DiscordError, WebhookClient};
use serde_json::Value;
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::{fmt as tracing_fmt, prelude::*, EnvFilter};

/// Post Discord messages and drive OpenHands Cloud conversations.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Post a message to a Discord incoming webhook.
    ///
    /// The webhook URL is secret; it is never printed or logged.
    PostWebhook(PostWebhookArgs),

    /// Send a message to a Discord channel using a bot token.
    SendMessage(SendMessageArgs),

    /// Create a conversation (V0 API) from a prompt file.
    NewConversation(NewConversationArgs),

    /// Search app conversations (V1 API).
    SearchConversations(SearchConversationsArgs),

    /// Start an app conversation (V1 API) from a prompt file.
    StartConversation(StartConversationArgs),
}

#[derive(Args, Debug)]
struct PostWebhookArgs {
    /// Incoming webhook URL.
    #[arg(long, env = "DISCORD_WEBHOOK_URL", hide_env_values = true)]
    webhook_url: String,

    /// Message content (max 2000 characters). If omitted, read from stdin.
    #[arg(long)]
    content: Option<String>,

    /// Add ?wait=true to get the created message object.
    #[arg(long)]
    wait: bool,

    /// Retries on HTTP 429.
    #[arg(long, default_value_t = 3)]
    max_retries: u32,
}

#[derive(Args, Debug)]
struct SendMessageArgs {
    /// Bot token.
    #[arg(long, env = "DISCORD_BOT_TOKEN", hide_env_values = true)]
    token: String,

    /// Channel ID.
    #[arg(long, env = "DISCORD_CHANNEL_ID")]
    channel_id: String,

    /// Message content (max 2000 characters). If omitted, read from stdin.
    #[arg(long)]
    content: Option<String>,

    /// Return the created message object (the bot route always returns it;
    /// kept for parity with the webhook command).
    #[arg(long)]
    wait: bool,

    /// Retries on HTTP 429.
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Allow Discord to parse mentions. Default is safe (no mentions).
    #[arg(long)]
    allow_mentions: bool,
}

#[derive(Args, Debug)]
struct NewConversationArgs {
    /// API key. Defaults to $OPENHANDS_API_KEY.
    #[arg(long)]
    api_key: Option<String>,

    /// App server base URL.
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Path to a markdown/text prompt file.
    #[arg(long)]
    prompt_file: PathBuf,

    /// Optional second file to append (e.g., a common tail).
    #[arg(long)]
    append_file: Option<PathBuf>,

    /// Optional owner/repo.
    #[arg(long)]
    repo: Option<String>,

    /// Optional git branch.
    #[arg(long)]
    branch: Option<String>,

    /// Poll until terminal and print the final state.
    #[arg(long)]
    poll: bool,

    /// Polling deadline in seconds.
    #[arg(long, default_value_t = 20 * 60)]
    timeout_s: u64,

    /// Polling interval in seconds.
    #[arg(long, default_value_t = 30)]
    poll_interval_s: u64,
}

#[derive(Args, Debug)]
struct SearchConversationsArgs {
    /// API key. Defaults to $OPENHANDS_API_KEY.
    #[arg(long)]
    api_key: Option<String>,

    /// App server base URL.
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Page size.
    #[arg(long, default_value_t = 5)]
    limit: u32,
}

#[derive(Args, Debug)]
struct StartConversationArgs {
    /// API key. Defaults to $OPENHANDS_API_KEY.
    #[arg(long)]
    api_key: Option<String>,

    /// App server base URL.
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Path to a markdown/text prompt file.
    #[arg(long)]
    prompt_file: PathBuf,

    /// Optional second file to append (e.g., a common tail).
    #[arg(long)]
    append_file: Option<PathBuf>,

    /// Optional owner/repo.
    #[arg(long)]
    repo: Option<String>,

    /// Optional git branch.
    #[arg(long)]
    branch: Option<String>,

    /// Optional conversation title.
    #[arg(long)]
    title: Option<String>,

    /// Do not auto-run after sending the initial message.
    #[arg(long)]
    no_run: bool,
}

/// Failures surfaced to the user.
#[derive(Debug)]
enum CliError {
    /// Usage problems exit with status 2.
    Usage(String),
    Discord(DiscordError),
    Api(ApiError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage(message) => f.write_str(message),
            Self::Discord(error) => error.fmt(f),
            Self::Api(error) => error.fmt(f),
        }
    }
}

impl From<DiscordError> for CliError {
    fn from(error: DiscordError) -> Self {
        Self::Discord(error)
    }
}

impl From<ApiError> for CliError {
    fn from(error: ApiError) -> Self {
        Self::Api(error)
    }
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            _ => 1,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            ExitCode::from(e.exit_code())
        }
    }
}

/// Sets up the global tracing subscriber: compact single-line output to
/// stderr (stdout stays clean for results), filtered via `RUST_LOG` with an
/// "info" default.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::PostWebhook(args) => post_webhook(args).await,
        Command::SendMessage(args) => send_message(args).await,
        Command::NewConversation(args) => new_conversation(args).await,
        Command::SearchConversations(args) => search_conversations(args).await,
        Command::StartConversation(args) => start_conversation(args).await,
    }
}

async fn post_webhook(args: PostWebhookArgs) -> Result<(), CliError> {
    let content = resolve_content(args.content)?;

    let client = WebhookClient::new(&args.webhook_url)?
        .with_options(PostOptions::default().with_max_retries(args.max_retries));

    let body = client.post(&content, args.wait, false).await?;
    print_body(&body);
    Ok(())
}

async fn send_message(args: SendMessageArgs) -> Result<(), CliError> {
    let content = resolve_content(args.content)?;

    let client = BotClient::new(args.token)
        .with_options(PostOptions::default().with_max_retries(args.max_retries));

    let body = client
        .send(&args.channel_id, &content, args.allow_mentions)
        .await?;
    // --wait kept for parity; the bot route always returns the message.
    let _ = args.wait;
    print_body(&body);
    Ok(())
}

async fn new_conversation(args: NewConversationArgs) -> Result<(), CliError> {
    let api = V0Client::new(args.api_key.as_deref(), Some(args.base_url.as_str()))?;

    let response = api
        .create_conversation_from_prompt_files(
            &args.prompt_file,
            args.append_file.as_deref(),
            args.repo.as_deref(),
            args.branch.as_deref(),
        )
        .await?;

    let conversation_id = response
        .get("conversation_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let conversation_url = response
        .get("url")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            (!conversation_id.is_empty())
                .then(|| format!("{}/conversations/{}", api.base_url(), conversation_id))
        });

    // A human-usable URL first; it fits CI logs.
    match conversation_url {
        Some(conversation_url) => println!("{conversation_url}"),
        None => println!("{}", pretty(&response)),
    }

    if args.poll && !conversation_id.is_empty() {
        let final_state = api
            .poll_until_terminal(
                &conversation_id,
                Duration::from_secs(args.timeout_s),
                Duration::from_secs(args.poll_interval_s),
            )
            .await?;
        println!("{}", pretty(&final_state));
    }

    Ok(())
}

async fn search_conversations(args: SearchConversationsArgs) -> Result<(), CliError> {
    let api = V1Client::new(args.api_key.as_deref(), Some(args.base_url.as_str()))?;
    let results = api.app_conversations_search(args.limit).await?;
    println!("{}", pretty(&results));
    Ok(())
}

async fn start_conversation(args: StartConversationArgs) -> Result<(), CliError> {
    let api = V1Client::new(args.api_key.as_deref(), Some(args.base_url.as_str()))?;

    let response = api
        .start_from_prompt_files(
            &args.prompt_file,
            args.append_file.as_deref(),
            args.repo.as_deref(),
            args.branch.as_deref(),
            args.title.as_deref(),
            !args.no_run,
        )
        .await?;

    println!("{}", pretty(&response));
    Ok(())
}

/// Takes `--content` as-is, or reads and trims stdin.
fn resolve_content(content: Option<String>) -> Result<String, CliError> {
    let content = match content {
        Some(content) => content,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| CliError::Usage(format!("Failed to read stdin: {e}")))?;
            buffer.trim().to_string()
        }
    };

    if content.is_empty() {
        return Err(CliError::Usage(
            "No content provided (use --content or stdin).".to_string(),
        ));
    }
    Ok(content)
}

/// Prints a response body as JSON; empty responses print nothing.
fn print_body(body: &PostBody) {
    if let Some(value) = body.to_value() {
        println!("{}", pretty(&value));
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
