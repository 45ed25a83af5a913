use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;

const DATA_DIR: &str = "league_stats";
const DB_FILE: &str = "league_stats.sqlite";

pub fn default_db_path() -> Option<PathBuf> {
    // Prefer XDG data dir.
    if let Ok(base) = std::env::var("XDG_DATA_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(DATA_DIR).join(DB_FILE));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(DATA_DIR)
            .join(DB_FILE),
    )
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;

        CREATE TABLE IF NOT EXISTS seasons (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            start_year INTEGER NULL
        );

        CREATE TABLE IF NOT EXISTS teams (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            short_name TEXT NULL,
            city TEXT NULL
        );

        CREATE TABLE IF NOT EXISTS players (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            position TEXT NULL,
            team_id INTEGER NULL REFERENCES teams(id),
            nationality TEXT NULL,
            shirt_number INTEGER NULL
        );
        CREATE INDEX IF NOT EXISTS idx_players_team ON players(team_id);

        CREATE TABLE IF NOT EXISTS coaches (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            team_id INTEGER NULL REFERENCES teams(id),
            nationality TEXT NULL,
            role TEXT NULL
        );

        CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY,
            season_id INTEGER NULL REFERENCES seasons(id),
            home_team_id INTEGER NULL REFERENCES teams(id),
            away_team_id INTEGER NULL REFERENCES teams(id),
            match_date TEXT NOT NULL,
            status TEXT NOT NULL,
            home_score INTEGER NULL,
            away_score INTEGER NULL,
            home_penalty_score INTEGER NULL,
            away_penalty_score INTEGER NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_matches_season ON matches(season_id);
        CREATE INDEX IF NOT EXISTS idx_matches_status ON matches(status);

        CREATE TABLE IF NOT EXISTS player_match_stats (
            id INTEGER PRIMARY KEY,
            match_id INTEGER NOT NULL REFERENCES matches(id),
            player_id INTEGER NULL REFERENCES players(id),
            team_id INTEGER NULL REFERENCES teams(id),
            goals INTEGER NOT NULL DEFAULT 0,
            assists INTEGER NOT NULL DEFAULT 0,
            yellow_cards INTEGER NOT NULL DEFAULT 0,
            red_cards INTEGER NOT NULL DEFAULT 0,
            minutes_played INTEGER NOT NULL DEFAULT 0,
            saves INTEGER NOT NULL DEFAULT 0,
            position TEXT NULL,
            goals_conceded INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_pms_match ON player_match_stats(match_id);
        CREATE INDEX IF NOT EXISTS idx_pms_player ON player_match_stats(player_id);

        CREATE TABLE IF NOT EXISTS standings (
            season_id INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            matches_played INTEGER NOT NULL,
            wins INTEGER NOT NULL,
            draws INTEGER NOT NULL,
            losses INTEGER NOT NULL,
            goals_for INTEGER NOT NULL,
            goals_against INTEGER NOT NULL,
            goal_difference INTEGER NOT NULL,
            points INTEGER NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (season_id, team_id)
        );

        CREATE TABLE IF NOT EXISTS player_season_stats (
            season_id INTEGER NOT NULL,
            player_id INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            matches_played INTEGER NOT NULL,
            goals INTEGER NOT NULL,
            assists INTEGER NOT NULL,
            yellow_cards INTEGER NOT NULL,
            red_cards INTEGER NOT NULL,
            minutes_played INTEGER NOT NULL,
            saves INTEGER NOT NULL,
            goals_conceded INTEGER NOT NULL,
            PRIMARY KEY (season_id, player_id, team_id)
        );

        CREATE TABLE IF NOT EXISTS team_season_stats (
            season_id INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            matches_played INTEGER NOT NULL,
            wins INTEGER NOT NULL,
            draws INTEGER NOT NULL,
            losses INTEGER NOT NULL,
            goals_for INTEGER NOT NULL,
            goals_against INTEGER NOT NULL,
            goal_difference INTEGER NOT NULL,
            points INTEGER NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (season_id, team_id)
        );

        CREATE TABLE IF NOT EXISTS team_seasons (
            season_id INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            PRIMARY KEY (season_id, team_id)
        );

        CREATE TABLE IF NOT EXISTS h2h_pair_stats (
            team_small_id INTEGER NOT NULL,
            team_large_id INTEGER NOT NULL,
            matches_played INTEGER NOT NULL,
            small_wins INTEGER NOT NULL,
            large_wins INTEGER NOT NULL,
            draws INTEGER NOT NULL,
            small_goals INTEGER NOT NULL,
            large_goals INTEGER NOT NULL,
            last_match_date TEXT NULL,
            PRIMARY KEY (team_small_id, team_large_id)
        );

        CREATE TABLE IF NOT EXISTS regeneration_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            season_id INTEGER NULL,
            stats_type TEXT NOT NULL,
            counts_json TEXT NOT NULL,
            error TEXT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}
