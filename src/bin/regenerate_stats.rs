use anyhow::{Context, Result};

use league_stats::config::{self, AppConfig};
use league_stats::db;
use league_stats::regenerate::{self, RegenerateRequest, StatsType};

fn main() -> Result<()> {
    config::load_dotenv();
    config::init_logging();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let db_path = match config::parse_db_path_arg(&args) {
        Some(path) => path,
        None => AppConfig::from_env()?.db_path,
    };
    let season_id = config::flag_value(&args, "--season")
        .map(|raw| raw.parse::<i64>().with_context(|| format!("invalid --season {raw:?}")))
        .transpose()?;
    let stats_type = config::flag_value(&args, "--type")
        .map(|raw| raw.parse::<StatsType>())
        .transpose()?
        .unwrap_or_default();

    let mut conn = db::open_db(&db_path)?;
    let summary = regenerate::regenerate(
        &mut conn,
        RegenerateRequest {
            season_id,
            stats_type,
        },
    )?;

    println!("Regeneration complete (run {})", summary.run_id);
    println!("DB: {}", db_path.display());
    println!(
        "Scope: type={} season={}",
        summary.stats_type,
        summary
            .season_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "all".to_string())
    );
    let counts = &summary.counts;
    for (label, count) in [
        ("standings", counts.standings),
        ("player_stats", counts.player_stats),
        ("team_stats", counts.team_stats),
        ("team_seasons", counts.team_seasons),
        ("h2h", counts.h2h),
    ] {
        if let Some(count) = count {
            println!("{label}: {count}");
        }
    }
    if let Some(scope) = summary.h2h_scope {
        println!("h2h scope: {scope}");
    }

    Ok(())
}
