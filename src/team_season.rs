use std::collections::BTreeSet;

use anyhow::{Context, Result};
use log::{info, warn};
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::ledger::{self, LedgerMatch};
use crate::standings::{self, StandingRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TeamSeason {
    pub season_id: i64,
    pub team_id: i64,
}

/// Projects the stored standings in scope into `team_season_stats`.
pub fn regenerate_team_season_stats(
    conn: &mut Connection,
    season_id: Option<i64>,
) -> Result<usize> {
    let tx = conn
        .transaction()
        .context("begin team season stats transaction")?;
    tx.execute(
        "DELETE FROM team_season_stats WHERE (?1 IS NULL OR season_id = ?1)",
        params![season_id],
    )
    .context("delete team season stats")?;

    let rows = standings::load_standings(&tx, season_id)?;
    let mut created = 0usize;
    for row in &rows {
        match insert_team_season_stats(&tx, row) {
            Ok(()) => created += 1,
            Err(err) => warn!(
                "team stats: failed to insert season={} team={}: {err:#}",
                row.season_id, row.team_id
            ),
        }
    }
    tx.commit().context("commit team season stats transaction")?;

    info!("team stats: season={season_id:?} standings={} created={created}", rows.len());
    Ok(created)
}

fn insert_team_season_stats(conn: &Connection, row: &StandingRow) -> Result<()> {
    conn.execute(
        "INSERT INTO team_season_stats (
            season_id, team_id, matches_played, wins, draws, losses,
            goals_for, goals_against, goal_difference, points, position
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            row.season_id,
            row.team_id,
            row.matches_played,
            row.wins,
            row.draws,
            row.losses,
            row.goals_for,
            row.goals_against,
            row.goal_difference,
            row.points,
            row.position,
        ],
    )
    .context("insert team season stats")?;
    Ok(())
}

/// Union of (season, home team) and (season, away team) over the given matches.
/// A match missing its season or either team contributes nothing.
pub fn collect_team_seasons(matches: &[LedgerMatch]) -> BTreeSet<TeamSeason> {
    let mut out = BTreeSet::new();
    for m in matches {
        let (Some(season_id), Some(home_id), Some(away_id)) =
            (m.season_id, m.home_team_id, m.away_team_id)
        else {
            continue;
        };
        out.insert(TeamSeason { season_id, team_id: home_id });
        out.insert(TeamSeason { season_id, team_id: away_id });
    }
    out
}

pub fn regenerate_team_seasons(conn: &mut Connection, season_id: Option<i64>) -> Result<usize> {
    let tx = conn
        .transaction()
        .context("begin team seasons transaction")?;
    tx.execute(
        "DELETE FROM team_seasons WHERE (?1 IS NULL OR season_id = ?1)",
        params![season_id],
    )
    .context("delete team seasons")?;

    let matches = ledger::load_matches(&tx, season_id)?;
    let pairs = collect_team_seasons(&matches);

    let mut created = 0usize;
    for pair in &pairs {
        let res = tx
            .execute(
                "INSERT INTO team_seasons (season_id, team_id) VALUES (?1, ?2)",
                params![pair.season_id, pair.team_id],
            )
            .context("insert team season");
        match res {
            Ok(_) => created += 1,
            Err(err) => warn!(
                "team seasons: failed to insert season={} team={}: {err:#}",
                pair.season_id, pair.team_id
            ),
        }
    }
    tx.commit().context("commit team seasons transaction")?;

    info!(
        "team seasons: season={season_id:?} matches={} created={created}",
        matches.len()
    );
    Ok(created)
}
