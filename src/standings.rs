use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::ledger::{self, LedgerMatch, Outcome};

pub const POINTS_FOR_WIN: i64 = 3;
pub const POINTS_FOR_DRAW: i64 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StandingRow {
    pub season_id: i64,
    pub team_id: i64,
    pub matches_played: i64,
    pub wins: i64,
    pub draws: i64,
    pub losses: i64,
    pub goals_for: i64,
    pub goals_against: i64,
    pub goal_difference: i64,
    pub points: i64,
    pub position: i64,
}

impl StandingRow {
    fn new(season_id: i64, team_id: i64) -> Self {
        Self {
            season_id,
            team_id,
            ..Self::default()
        }
    }

    fn record(&mut self, scored: i64, conceded: i64, result: TeamResult) {
        self.matches_played += 1;
        self.goals_for += scored;
        self.goals_against += conceded;
        self.goal_difference = self.goals_for - self.goals_against;
        match result {
            TeamResult::Win => {
                self.wins += 1;
                self.points += POINTS_FOR_WIN;
            }
            TeamResult::Draw => {
                self.draws += 1;
                self.points += POINTS_FOR_DRAW;
            }
            TeamResult::Loss => self.losses += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TeamResult {
    Win,
    Draw,
    Loss,
}

/// Tallies completed matches into ranked standings, one table per season.
///
/// Matches without a season or either team are skipped with a warning.
pub fn compute_standings(matches: &[LedgerMatch]) -> Vec<StandingRow> {
    let mut table: HashMap<(i64, i64), StandingRow> = HashMap::new();

    for m in matches {
        let (Some(season_id), Some(home_id), Some(away_id)) =
            (m.season_id, m.home_team_id, m.away_team_id)
        else {
            warn!(
                "standings: skipping match {} with missing season/team (season={:?} home={:?} away={:?})",
                m.id, m.season_id, m.home_team_id, m.away_team_id
            );
            continue;
        };
        let (Some(home_goals), Some(away_goals), Some(outcome)) =
            (m.home_score, m.away_score, m.outcome())
        else {
            continue;
        };
        if m.is_penalty_decided() {
            debug!("standings: match {} settled by shootout", m.id);
        }

        let (home_result, away_result) = match outcome {
            Outcome::HomeWin => (TeamResult::Win, TeamResult::Loss),
            Outcome::AwayWin => (TeamResult::Loss, TeamResult::Win),
            Outcome::Draw => (TeamResult::Draw, TeamResult::Draw),
        };

        table
            .entry((season_id, home_id))
            .or_insert_with(|| StandingRow::new(season_id, home_id))
            .record(home_goals, away_goals, home_result);
        table
            .entry((season_id, away_id))
            .or_insert_with(|| StandingRow::new(season_id, away_id))
            .record(away_goals, home_goals, away_result);
    }

    let mut rows: Vec<StandingRow> = table.into_values().collect();
    assign_positions(&mut rows);
    rows
}

/// Sorts by season then table order and numbers each season 1..N.
pub fn assign_positions(rows: &mut [StandingRow]) {
    rows.sort_by(|a, b| a.season_id.cmp(&b.season_id).then_with(|| table_order(a, b)));

    let mut current_season = None;
    let mut position = 0;
    for row in rows.iter_mut() {
        if current_season != Some(row.season_id) {
            current_season = Some(row.season_id);
            position = 0;
        }
        position += 1;
        row.position = position;
    }
}

// points, goal difference, goals for; team id keeps reruns stable.
fn table_order(a: &StandingRow, b: &StandingRow) -> Ordering {
    b.points
        .cmp(&a.points)
        .then_with(|| b.goal_difference.cmp(&a.goal_difference))
        .then_with(|| b.goals_for.cmp(&a.goals_for))
        .then_with(|| a.team_id.cmp(&b.team_id))
}

/// Rebuilds standings in scope and returns how many rows were written.
/// Rows that fail to insert are skipped and the survivors are renumbered 1..N.
pub fn regenerate_standings(conn: &mut Connection, season_id: Option<i64>) -> Result<usize> {
    let tx = conn.transaction().context("begin standings transaction")?;
    let deleted = tx
        .execute(
            "DELETE FROM standings WHERE (?1 IS NULL OR season_id = ?1)",
            params![season_id],
        )
        .context("delete standings")?;

    let matches = ledger::load_completed_matches(&tx, season_id)?;
    let rows = compute_standings(&matches);

    let mut created = 0usize;
    let mut gapped_seasons = BTreeSet::new();
    for row in &rows {
        match insert_standing(&tx, row) {
            Ok(()) => created += 1,
            Err(err) => {
                warn!(
                    "standings: failed to insert season={} team={}: {err:#}",
                    row.season_id, row.team_id
                );
                gapped_seasons.insert(row.season_id);
            }
        }
    }
    for season in gapped_seasons {
        renumber_positions(&tx, season)?;
    }
    tx.commit().context("commit standings transaction")?;

    info!(
        "standings: season={:?} deleted={} matches={} created={}",
        season_id,
        deleted,
        matches.len(),
        created
    );
    Ok(created)
}

/// Closes position gaps left by rows that failed to insert.
fn renumber_positions(conn: &Connection, season_id: i64) -> Result<()> {
    let team_ids = {
        let mut stmt = conn
            .prepare("SELECT team_id FROM standings WHERE season_id = ?1 ORDER BY position ASC")
            .context("prepare standings renumber query")?;
        let rows = stmt
            .query_map(params![season_id], |row| row.get::<_, i64>(0))
            .context("query standings for renumber")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode standings team id")?);
        }
        out
    };
    for (idx, team_id) in team_ids.iter().enumerate() {
        conn.execute(
            "UPDATE standings SET position = ?1 WHERE season_id = ?2 AND team_id = ?3",
            params![idx as i64 + 1, season_id, team_id],
        )
        .context("renumber standing")?;
    }
    Ok(())
}

fn insert_standing(conn: &Connection, row: &StandingRow) -> Result<()> {
    conn.execute(
        "INSERT INTO standings (
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
    .context("insert standing")?;
    Ok(())
}

pub fn load_standings(conn: &Connection, season_id: Option<i64>) -> Result<Vec<StandingRow>> {
    let mut stmt = conn
        .prepare(
            "SELECT season_id, team_id, matches_played, wins, draws, losses,
                    goals_for, goals_against, goal_difference, points, position
             FROM standings
             WHERE (?1 IS NULL OR season_id = ?1)
             ORDER BY season_id ASC, position ASC",
        )
        .context("prepare load standings query")?;
    let rows = stmt
        .query_map(params![season_id], |row| {
            Ok(StandingRow {
                season_id: row.get(0)?,
                team_id: row.get(1)?,
                matches_played: row.get(2)?,
                wins: row.get(3)?,
                draws: row.get(4)?,
                losses: row.get(5)?,
                goals_for: row.get(6)?,
                goals_against: row.get(7)?,
                goal_difference: row.get(8)?,
                points: row.get(9)?,
                position: row.get(10)?,
            })
        })
        .context("query standings")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode standing row")?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MatchStatus;

    fn played(id: i64, season: i64, home: i64, away: i64, score: (i64, i64)) -> LedgerMatch {
        LedgerMatch {
            id,
            season_id: Some(season),
            home_team_id: Some(home),
            away_team_id: Some(away),
            match_date: format!("2025-09-{:02}", id),
            status: MatchStatus::Completed,
            home_score: Some(score.0),
            away_score: Some(score.1),
            home_penalty_score: None,
            away_penalty_score: None,
        }
    }

    #[test]
    fn positions_restart_per_season() {
        let rows = compute_standings(&[
            played(1, 1, 10, 20, (1, 0)),
            played(2, 2, 30, 10, (2, 2)),
            played(3, 2, 20, 30, (0, 3)),
        ]);
        let s1: Vec<_> = rows.iter().filter(|r| r.season_id == 1).collect();
        let s2: Vec<_> = rows.iter().filter(|r| r.season_id == 2).collect();
        assert_eq!(s1.iter().map(|r| r.position).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(s2.iter().map(|r| r.position).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(s1[0].team_id, 10);
        assert_eq!(s2[0].team_id, 30);
    }

    #[test]
    fn goal_difference_then_goals_for_break_ties() {
        // 10 and 20 both finish on 3 points; 10 has the better difference.
        // 30 and 40 both finish on 3 points with equal difference; 40 scored more.
        let rows = compute_standings(&[
            played(1, 1, 10, 50, (3, 0)),
            played(2, 1, 20, 50, (1, 0)),
            played(3, 1, 30, 60, (1, 0)),
            played(4, 1, 40, 60, (2, 1)),
        ]);
        let order: Vec<i64> = rows.iter().map(|r| r.team_id).collect();
        assert_eq!(&order[..4], &[10, 40, 20, 30]);
    }

    #[test]
    fn match_without_team_is_skipped() {
        let mut broken = played(1, 1, 10, 20, (1, 0));
        broken.away_team_id = None;
        assert!(compute_standings(&[broken]).is_empty());
    }
}
