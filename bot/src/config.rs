use clap::Parser;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/etternabot";

/// Process configuration for the bot, read from flags or the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "etternabot")]
#[command(about = "Discord bot for EtternaOnline scores", long_about = None)]
pub struct Config {
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    pub discord_token: String,

    #[arg(long = "etterna-key", env = "ETTERNA_API_KEY", hide_env_values = true)]
    pub etterna_api_key: String,

    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    pub database_url: String,

    /// Seconds between recent play checks
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 60)]
    pub poll_interval_secs: u64,

    /// Plays without a rating gain are announced only at or above this accuracy
    #[arg(long, env = "MIN_ACCURACY", default_value_t = 97.0)]
    pub min_accuracy: f64,

    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,

    /// Command prefix given to servers the bot has not seen before
    #[arg(long, env = "DEFAULT_PREFIX", default_value = ";")]
    pub default_prefix: String,
}

impl Config {
    pub fn settings(&self) -> Settings {
        Settings {
            default_prefix: self.default_prefix.clone(),
            min_accuracy: self.min_accuracy,
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Runtime knobs the library needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub default_prefix: String,
    pub min_accuracy: f64,
    pub poll_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_prefix: ";".to_string(),
            min_accuracy: 97.0,
            poll_interval: Duration::from_secs(60),
        }
    }
}
