use std::collections::BTreeMap;

use anyhow::{Context, Result};
use log::{info, warn};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::ledger::{self, LedgerMatch, Outcome};

/// Record for an unordered pair of teams; `small` is always the lower id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct H2hPairRow {
    pub team_small_id: i64,
    pub team_large_id: i64,
    pub matches_played: i64,
    pub small_wins: i64,
    pub large_wins: i64,
    pub draws: i64,
    pub small_goals: i64,
    pub large_goals: i64,
    pub last_match_date: Option<String>,
}

pub fn canonical_pair(a: i64, b: i64) -> (i64, i64) {
    if a <= b { (a, b) } else { (b, a) }
}

pub fn compute_h2h(matches: &[LedgerMatch]) -> Vec<H2hPairRow> {
    let mut pairs: BTreeMap<(i64, i64), H2hPairRow> = BTreeMap::new();

    for m in matches {
        let (Some(home_id), Some(away_id)) = (m.home_team_id, m.away_team_id) else {
            warn!(
                "h2h: skipping match {} with missing team (home={:?} away={:?})",
                m.id, m.home_team_id, m.away_team_id
            );
            continue;
        };
        if home_id == away_id {
            warn!("h2h: skipping match {} with team {home_id} on both sides", m.id);
            continue;
        }
        let (Some(home_goals), Some(away_goals), Some(outcome)) =
            (m.home_score, m.away_score, m.outcome())
        else {
            continue;
        };

        let (small, large) = canonical_pair(home_id, away_id);
        let home_is_small = home_id == small;
        let row = pairs.entry((small, large)).or_insert_with(|| H2hPairRow {
            team_small_id: small,
            team_large_id: large,
            ..H2hPairRow::default()
        });

        row.matches_played += 1;
        if home_is_small {
            row.small_goals += home_goals;
            row.large_goals += away_goals;
        } else {
            row.small_goals += away_goals;
            row.large_goals += home_goals;
        }
        match (outcome, home_is_small) {
            (Outcome::Draw, _) => row.draws += 1,
            (Outcome::HomeWin, true) | (Outcome::AwayWin, false) => row.small_wins += 1,
            (Outcome::HomeWin, false) | (Outcome::AwayWin, true) => row.large_wins += 1,
        }
        if row
            .last_match_date
            .as_deref()
            .is_none_or(|last| m.match_date.as_str() > last)
        {
            row.last_match_date = Some(m.match_date.clone());
        }
    }

    pairs.into_values().collect()
}

/// Rebuilds every pair from the full match history. Head-to-head spans every
/// season whatever scope the caller regenerates.
pub fn regenerate_h2h(conn: &mut Connection) -> Result<usize> {
    let tx = conn.transaction().context("begin h2h transaction")?;
    let deleted = tx
        .execute("DELETE FROM h2h_pair_stats", [])
        .context("delete h2h pair stats")?;

    let matches = ledger::load_completed_matches(&tx, None)?;
    let rows = compute_h2h(&matches);

    let mut created = 0usize;
    for row in &rows {
        match insert_pair(&tx, row) {
            Ok(()) => created += 1,
            Err(err) => warn!(
                "h2h: failed to insert pair {}-{}: {err:#}",
                row.team_small_id, row.team_large_id
            ),
        }
    }
    tx.commit().context("commit h2h transaction")?;

    info!(
        "h2h: deleted={} matches={} created={}",
        deleted,
        matches.len(),
        created
    );
    Ok(created)
}

fn insert_pair(conn: &Connection, row: &H2hPairRow) -> Result<()> {
    conn.execute(
        "INSERT INTO h2h_pair_stats (
            team_small_id, team_large_id, matches_played, small_wins, large_wins,
            draws, small_goals, large_goals, last_match_date
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            row.team_small_id,
            row.team_large_id,
            row.matches_played,
            row.small_wins,
            row.large_wins,
            row.draws,
            row.small_goals,
            row.large_goals,
            row.last_match_date,
        ],
    )
    .context("insert h2h pair")?;
    Ok(())
}

pub fn load_pair(conn: &Connection, team_a: i64, team_b: i64) -> Result<Option<H2hPairRow>> {
    let (small, large) = canonical_pair(team_a, team_b);
    conn.query_row(
        "SELECT team_small_id, team_large_id, matches_played, small_wins, large_wins,
                draws, small_goals, large_goals, last_match_date
         FROM h2h_pair_stats
         WHERE team_small_id = ?1 AND team_large_id = ?2",
        params![small, large],
        |row| {
            Ok(H2hPairRow {
                team_small_id: row.get(0)?,
                team_large_id: row.get(1)?,
                matches_played: row.get(2)?,
                small_wins: row.get(3)?,
                large_wins: row.get(4)?,
                draws: row.get(5)?,
                small_goals: row.get(6)?,
                large_goals: row.get(7)?,
                last_match_date: row.get(8)?,
            })
        },
    )
    .optional()
    .context("query h2h pair")
}
