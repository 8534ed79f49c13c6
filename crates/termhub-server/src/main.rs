mod config;
mod error;
mod protocol;
mod routes;
mod server;
mod sse;
mod state;
mod ws;

use clap::Parser;

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    server::run(config).await
}
