use clap::Parser;
use retrotrack::app;
use retrotrack::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    log::info!("data directory: {}", config.data_dir.display());

    app::run(config).await
}
