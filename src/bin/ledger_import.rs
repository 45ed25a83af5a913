use std::fs;

use anyhow::{Context, Result, anyhow};

use league_stats::config::{self, AppConfig};
use league_stats::db;
use league_stats::ledger::{self, Dataset};

fn main() -> Result<()> {
    config::load_dotenv();
    config::init_logging();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let file = config::flag_value(&args, "--file")
        .ok_or_else(|| anyhow!("missing --file PATH (json dataset)"))?;
    let db_path = match config::parse_db_path_arg(&args) {
        Some(path) => path,
        None => AppConfig::from_env()?.db_path,
    };

    let raw = fs::read_to_string(&file).with_context(|| format!("read dataset {file}"))?;
    let dataset: Dataset =
        serde_json::from_str(&raw).with_context(|| format!("invalid dataset json in {file}"))?;

    let mut conn = db::open_db(&db_path)?;
    let summary = ledger::import_dataset(&mut conn, &dataset)?;

    println!("Ledger import complete");
    println!("DB: {}", db_path.display());
    println!("Seasons: {}", summary.seasons);
    println!("Teams: {}", summary.teams);
    println!("Players: {}", summary.players);
    println!("Coaches: {}", summary.coaches);
    println!("Matches: {}", summary.matches);
    println!("Player match stats: {}", summary.player_match_stats);
    println!("Run regenerate_stats to refresh derived tables.");

    Ok(())
}
