use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use log::{error, info, warn};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::{h2h, player_season, standings, team_season};

pub const H2H_SCOPE_ALL_SEASONS: &str = "all_seasons";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsType {
    #[default]
    All,
    Standings,
    PlayerStats,
    TeamStats,
    TeamSeasons,
    H2h,
}

impl StatsType {
    pub const ALL_NAMES: &'static [&'static str] = &[
        "all",
        "standings",
        "player_stats",
        "team_stats",
        "team_seasons",
        "h2h",
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StatsType::All => "all",
            StatsType::Standings => "standings",
            StatsType::PlayerStats => "player_stats",
            StatsType::TeamStats => "team_stats",
            StatsType::TeamSeasons => "team_seasons",
            StatsType::H2h => "h2h",
        }
    }

    fn includes(self, other: StatsType) -> bool {
        self == StatsType::All || self == other
    }
}

impl fmt::Display for StatsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatsType {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(StatsType::All),
            "standings" => Ok(StatsType::Standings),
            "player_stats" => Ok(StatsType::PlayerStats),
            "team_stats" => Ok(StatsType::TeamStats),
            "team_seasons" => Ok(StatsType::TeamSeasons),
            "h2h" => Ok(StatsType::H2h),
            other => Err(anyhow!(
                "unknown stats type {other:?} (expected one of {})",
                Self::ALL_NAMES.join(", ")
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegenerateRequest {
    pub season_id: Option<i64>,
    pub stats_type: StatsType,
}

/// Rows created per category. A category that did not run stays `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenerationCounts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standings: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_stats: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_stats: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_seasons: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h2h: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegenerationSummary {
    pub run_id: i64,
    pub season_id: Option<i64>,
    pub stats_type: StatsType,
    pub counts: RegenerationCounts,
    /// Set when head-to-head ran; it ignores `season_id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h2h_scope: Option<&'static str>,
    pub started_at: String,
    pub finished_at: String,
}

/// Runs the requested aggregators in dependency order and records the run.
///
/// Each aggregator commits on its own. When one fails the run stops there:
/// categories already rebuilt stay rebuilt, the rest keep their old rows.
pub fn regenerate(conn: &mut Connection, req: RegenerateRequest) -> Result<RegenerationSummary> {
    let started_at = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO regeneration_runs(started_at, finished_at, season_id, stats_type, counts_json, error)
         VALUES (?1, NULL, ?2, ?3, '{}', NULL)",
        params![started_at, req.season_id, req.stats_type.as_str()],
    )
    .context("insert regeneration run")?;
    let run_id = conn.last_insert_rowid();

    info!(
        "regeneration run {run_id} started: type={} season={:?}",
        req.stats_type, req.season_id
    );

    let mut counts = RegenerationCounts::default();
    let outcome = run_categories(conn, req, &mut counts);

    let finished_at = Utc::now().to_rfc3339();
    let counts_json = serde_json::to_string(&counts).unwrap_or_else(|_| "{}".to_string());
    let error_text = outcome.as_ref().err().map(|err| format!("{err:#}"));
    conn.execute(
        "UPDATE regeneration_runs
         SET finished_at = ?1, counts_json = ?2, error = ?3
         WHERE run_id = ?4",
        params![finished_at, counts_json, error_text, run_id],
    )
    .context("update regeneration run")?;

    if let Err(err) = outcome {
        error!("regeneration run {run_id} failed: {err:#}");
        return Err(err);
    }

    info!("regeneration run {run_id} finished: {counts_json}");
    Ok(RegenerationSummary {
        run_id,
        season_id: req.season_id,
        stats_type: req.stats_type,
        h2h_scope: counts.h2h.map(|_| H2H_SCOPE_ALL_SEASONS),
        counts,
        started_at,
        finished_at,
    })
}

fn run_categories(
    conn: &mut Connection,
    req: RegenerateRequest,
    counts: &mut RegenerationCounts,
) -> Result<()> {
    let kind = req.stats_type;
    let season_id = req.season_id;

    if kind.includes(StatsType::Standings) {
        counts.standings = Some(
            standings::regenerate_standings(conn, season_id).context("regenerate standings")?,
        );
    }
    if kind.includes(StatsType::PlayerStats) {
        counts.player_stats = Some(
            player_season::regenerate_player_season_stats(conn, season_id)
                .context("regenerate player stats")?,
        );
    }
    if kind.includes(StatsType::TeamStats) {
        counts.team_stats = Some(
            team_season::regenerate_team_season_stats(conn, season_id)
                .context("regenerate team stats")?,
        );
    }
    if kind.includes(StatsType::TeamSeasons) {
        counts.team_seasons = Some(
            team_season::regenerate_team_seasons(conn, season_id)
                .context("regenerate team seasons")?,
        );
    }
    if kind.includes(StatsType::H2h) {
        if season_id.is_some() {
            info!("h2h ignores season {season_id:?} and rebuilds from every season");
        }
        counts.h2h = Some(h2h::regenerate_h2h(conn).context("regenerate h2h")?);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub run_id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub season_id: Option<i64>,
    pub stats_type: String,
    pub counts: RegenerationCounts,
    pub error: Option<String>,
}

pub fn recent_runs(conn: &Connection, limit: usize) -> Result<Vec<RunRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT run_id, started_at, finished_at, season_id, stats_type, counts_json, error
             FROM regeneration_runs
             ORDER BY run_id DESC
             LIMIT ?1",
        )
        .context("prepare recent runs query")?;
    let rows = stmt
        .query_map(params![limit as i64], |row| {
            let run_id: i64 = row.get(0)?;
            let counts_json: String = row.get(5)?;
            let counts = serde_json::from_str(&counts_json).unwrap_or_else(|err| {
                warn!("regeneration run {run_id}: unreadable counts_json {counts_json:?}: {err}");
                RegenerationCounts::default()
            });
            Ok(RunRecord {
                run_id,
                started_at: row.get(1)?,
                finished_at: row.get(2)?,
                season_id: row.get(3)?,
                stats_type: row.get(4)?,
                counts,
                error: row.get(6)?,
            })
        })
        .context("query recent runs")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode run row")?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{RegenerationCounts, StatsType, recent_runs};
    use crate::db;

    #[test]
    fn stats_type_parses_selector_names() {
        for name in StatsType::ALL_NAMES {
            let parsed: StatsType = name.parse().unwrap();
            assert_eq!(parsed.as_str(), *name);
        }
        assert_eq!(" ".parse::<StatsType>().unwrap(), StatsType::All);
        assert!("standing".parse::<StatsType>().is_err());
    }

    #[test]
    fn stats_type_serializes_snake_case() {
        let json = serde_json::to_string(&StatsType::PlayerStats).unwrap();
        assert_eq!(json, "\"player_stats\"");
    }

    #[test]
    fn corrupt_counts_fall_back_to_empty() {
        let conn = db::open_in_memory().unwrap();
        conn.execute(
            "INSERT INTO regeneration_runs(started_at, finished_at, season_id, stats_type, counts_json, error)
             VALUES ('2024-01-01T00:00:00Z', NULL, NULL, 'all', 'not json', NULL)",
            [],
        )
        .unwrap();

        let runs = recent_runs(&conn, 5).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].counts, RegenerationCounts::default());
    }
}
