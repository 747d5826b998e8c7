use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use etterna::{Api, Client, ScoreQuery, SortColumn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use etternabot::config::Settings;
use etternabot::db::Store;
use etternabot::dispatch::{Dispatcher, RichMessage};
use etternabot::memory::MemoryStore;
use etternabot::models::ServerConfig;
use etternabot::recent::{get_or_create_user, recent_play};
use etternabot::tracker::PlayTracker;
use etternabot::Bot;

#[derive(Parser)]
#[command(name = "etterna-cli")]
#[command(about = "Query EtternaOnline without going through Discord", long_about = None)]
struct Cli {
    #[arg(long = "etterna-key", env = "ETTERNA_API_KEY", hide_env_values = true)]
    etterna_api_key: String,

    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    request_timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a user's ratings and ranks
    Profile { username: String },

    /// Scrape a user's numeric ID from their profile page
    UserId { username: String },

    /// Show a user's most recent valid play
    Recent { username: String },

    /// List a page of a user's scores
    Scores {
        username: String,

        /// Filter by song name
        #[arg(short, long)]
        search: Option<String>,

        #[arg(short, long, default_value_t = 25)]
        count: u32,

        #[arg(short, long, default_value_t = 0)]
        offset: u32,

        /// Column to sort by (date, nerf, overall, rate, accuracy, ...)
        #[arg(long, default_value = "date")]
        sort: SortColumn,

        /// Sort ascending instead of descending
        #[arg(long)]
        asc: bool,
    },

    /// Show the detail of one score
    Score { key: String },

    /// Show a song
    Song { id: i64 },

    /// Run one tracking cycle for the given users, printing what would be announced
    Track {
        #[arg(required = true)]
        usernames: Vec<String>,

        /// Announce plays without rating gains at or above this accuracy
        #[arg(long, default_value_t = 97.0)]
        min_accuracy: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "etterna_cli=info,etternabot=info,etterna=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let client = Client::builder(cli.etterna_api_key)
        .timeout(Duration::from_secs(cli.request_timeout_secs.max(1)))
        .build()
        .context("failed to build etterna client")?;

    match cli.command {
        Commands::Profile { username } => print(&client.get_by_username(&username).await?),
        Commands::UserId { username } => {
            println!("{}", client.get_user_id(&username).await?);
            Ok(())
        }
        Commands::Recent { username } => handle_recent(&client, &username).await,
        Commands::Scores {
            username,
            search,
            count,
            offset,
            sort,
            asc,
        } => {
            let user_id = client.get_user_id(&username).await?;
            let mut query = ScoreQuery::new(user_id)
                .count(count)
                .offset(offset)
                .sort(sort, asc);

            if let Some(search) = search {
                query = query.search(search);
            }

            print(&client.get_scores(&query).await?)
        }
        Commands::Score { key } => print(&client.get_score_detail(&key).await?),
        Commands::Song { id } => print(&client.get_song(id).await?),
        Commands::Track {
            usernames,
            min_accuracy,
        } => handle_track(client, &usernames, min_accuracy).await,
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn handle_recent(client: &Client, username: &str) -> Result<()> {
    let user_id = client.get_user_id(username).await?;

    match recent_play(client, user_id).await? {
        Some(score) => print(&score),
        None => {
            println!("{} has no recent valid scores.", username);
            Ok(())
        }
    }
}

/// Prints announcements instead of posting them.
struct StdoutDispatcher;

#[async_trait]
impl Dispatcher for StdoutDispatcher {
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<()> {
        println!("[{}] {}", channel_id, text);
        Ok(())
    }

    async fn send_rich_message(&self, channel_id: &str, message: &RichMessage) -> Result<()> {
        println!("[{}]\n{}", channel_id, serde_json::to_string_pretty(message)?);
        Ok(())
    }

    async fn send_typing(&self, _channel_id: &str) -> Result<()> {
        Ok(())
    }
}

async fn handle_track(client: Client, usernames: &[String], min_accuracy: f64) -> Result<()> {
    const SERVER: &str = "cli";

    let store = Arc::new(MemoryStore::new());

    let mut server = ServerConfig::new(SERVER, ";");
    server.score_channel_id = Some("stdout".to_string());
    store.save_server_config(&server).await?;

    for (i, username) in usernames.iter().enumerate() {
        let user = get_or_create_user(&client, store.as_ref(), username)
            .await
            .with_context(|| format!("failed to look up {}", username))?;

        store
            .register(&user.username, SERVER, &format!("cli-{}", i))
            .await?;
    }

    let bot = Arc::new(Bot {
        api: Arc::new(client),
        store,
        dispatcher: Arc::new(StdoutDispatcher),
        settings: Settings {
            min_accuracy,
            ..Settings::default()
        },
    });

    if let Some(report) = PlayTracker::new(bot).track_all().await {
        tracing::info!(
            checked = report.checked,
            announced = report.announced,
            suppressed = report.suppressed,
            unchanged = report.unchanged,
            failed = report.failed,
            "dry run finished"
        );
    }

    Ok(())
}
