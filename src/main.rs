use anyhow::{Context, Result};
use log::info;

use league_stats::config::{self, AppConfig};
use league_stats::db;
use league_stats::server::{AppState, StatsServer};

#[tokio::main]
async fn main() -> Result<()> {
    config::load_dotenv();
    config::init_logging();

    let cfg = AppConfig::from_env()?;

    // Create the schema up front so a bad path fails before we bind.
    db::open_db(&cfg.db_path)
        .with_context(|| format!("initialise database {}", cfg.db_path.display()))?;
    info!("database: {}", cfg.db_path.display());

    StatsServer::new(AppState::new(cfg.db_path))
        .run(cfg.bind_addr)
        .await
}
