use clap::Parser;
use etternabot::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::parse();

    etternabot::run(config).await
}
