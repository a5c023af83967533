use log::{error, info};
use timetable_engine::config::Config;
use timetable_engine::error::Result;
use timetable_engine::server;
use timetable_engine::store::EntityStore;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env()?;
    let store = match &config.data_file {
        Some(path) if path.exists() => EntityStore::load(path)?,
        Some(path) => {
            info!("No snapshot at '{}' yet, starting with an empty store", path.display());
            EntityStore::new()
        }
        None => EntityStore::new(),
    };
    server::run_server(config, store).await
}
