use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::ledger::{self, CompletedAppearance};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlayerSeasonRow {
    pub season_id: i64,
    pub player_id: i64,
    pub team_id: i64,
    pub matches_played: i64,
    pub goals: i64,
    pub assists: i64,
    pub yellow_cards: i64,
    pub red_cards: i64,
    pub minutes_played: i64,
    pub saves: i64,
    pub goals_conceded: i64,
}

#[derive(Debug, Default)]
struct Accumulator {
    row: PlayerSeasonRow,
    // Matches where the player actually got on the pitch.
    appeared_in: HashSet<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerSeasonBatch {
    pub rows: Vec<PlayerSeasonRow>,
    pub skipped: usize,
}

/// Rolls player lines up per (season, player, team).
///
/// A line only counts as an appearance when minutes were played; bench lines
/// still contribute their other counters. Lines missing any of the three keys
/// are skipped.
pub fn compute_player_season_stats(appearances: &[CompletedAppearance]) -> PlayerSeasonBatch {
    let mut acc: BTreeMap<(i64, i64, i64), Accumulator> = BTreeMap::new();
    let mut skipped = 0usize;

    for app in appearances {
        let stat = &app.stat;
        let (Some(season_id), Some(player_id), Some(team_id)) =
            (app.season_id, stat.player_id, stat.team_id)
        else {
            debug!(
                "player stats: skipping line {} of match {} (season={:?} player={:?} team={:?})",
                stat.id, stat.match_id, app.season_id, stat.player_id, stat.team_id
            );
            skipped += 1;
            continue;
        };

        let entry = acc
            .entry((season_id, player_id, team_id))
            .or_insert_with(|| Accumulator {
                row: PlayerSeasonRow {
                    season_id,
                    player_id,
                    team_id,
                    ..PlayerSeasonRow::default()
                },
                appeared_in: HashSet::new(),
            });

        if stat.minutes_played > 0 {
            entry.appeared_in.insert(stat.match_id);
        }
        let row = &mut entry.row;
        row.goals += stat.goals;
        row.assists += stat.assists;
        row.yellow_cards += stat.yellow_cards;
        row.red_cards += stat.red_cards;
        row.minutes_played += stat.minutes_played;
        row.saves += stat.saves;
        row.goals_conceded += stat.goals_conceded;
    }

    let rows = acc
        .into_values()
        .map(|entry| {
            let mut row = entry.row;
            row.matches_played = entry.appeared_in.len() as i64;
            row
        })
        .collect();

    PlayerSeasonBatch { rows, skipped }
}

/// Rebuilds player-season rows in scope and returns how many were written.
/// A row that fails to insert is logged and left out of the count.
pub fn regenerate_player_season_stats(
    conn: &mut Connection,
    season_id: Option<i64>,
) -> Result<usize> {
    let tx = conn
        .transaction()
        .context("begin player season stats transaction")?;
    let deleted = tx
        .execute(
            "DELETE FROM player_season_stats WHERE (?1 IS NULL OR season_id = ?1)",
            params![season_id],
        )
        .context("delete player season stats")?;

    let appearances = ledger::load_completed_appearances(&tx, season_id)?;
    let batch = compute_player_season_stats(&appearances);
    if batch.skipped > 0 {
        info!(
            "player stats: skipped {} lines with missing player/team/season",
            batch.skipped
        );
    }

    let mut created = 0usize;
    for row in &batch.rows {
        match insert_player_season(&tx, row) {
            Ok(()) => created += 1,
            Err(err) => warn!(
                "player stats: failed to insert season={} player={} team={}: {err:#}",
                row.season_id, row.player_id, row.team_id
            ),
        }
    }
    tx.commit()
        .context("commit player season stats transaction")?;

    info!(
        "player stats: season={:?} deleted={} lines={} candidates={} created={}",
        season_id,
        deleted,
        appearances.len(),
        batch.rows.len(),
        created
    );
    Ok(created)
}

fn insert_player_season(conn: &Connection, row: &PlayerSeasonRow) -> Result<()> {
    conn.execute(
        "INSERT INTO player_season_stats (
            season_id, player_id, team_id, matches_played, goals, assists,
            yellow_cards, red_cards, minutes_played, saves, goals_conceded
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            row.season_id,
            row.player_id,
            row.team_id,
            row.matches_played,
            row.goals,
            row.assists,
            row.yellow_cards,
            row.red_cards,
            row.minutes_played,
            row.saves,
            row.goals_conceded,
        ],
    )
    .context("insert player season stats")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::PlayerMatchStat;

    fn line(
        id: i64,
        match_id: i64,
        player: Option<i64>,
        minutes: i64,
        goals: i64,
    ) -> CompletedAppearance {
        CompletedAppearance {
            season_id: Some(1),
            stat: PlayerMatchStat {
                id,
                match_id,
                player_id: player,
                team_id: Some(10),
                goals,
                assists: 0,
                yellow_cards: 0,
                red_cards: 0,
                minutes_played: minutes,
                saves: 0,
                position: None,
                goals_conceded: 0,
            },
        }
    }

    #[test]
    fn bench_lines_are_not_appearances() {
        let batch = compute_player_season_stats(&[
            line(1, 100, Some(7), 90, 1),
            line(2, 101, Some(7), 0, 0),
            line(3, 102, Some(7), 15, 1),
        ]);
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.rows[0].matches_played, 2);
        assert_eq!(batch.rows[0].goals, 2);
        assert_eq!(batch.rows[0].minutes_played, 105);
    }

    #[test]
    fn duplicate_lines_count_one_appearance() {
        let batch = compute_player_season_stats(&[
            line(1, 100, Some(7), 45, 0),
            line(2, 100, Some(7), 45, 0),
        ]);
        assert_eq!(batch.rows[0].matches_played, 1);
        assert_eq!(batch.rows[0].minutes_played, 90);
    }

    #[test]
    fn unlinked_lines_are_skipped() {
        let mut orphan = line(2, 100, Some(8), 90, 0);
        orphan.season_id = None;
        let batch = compute_player_season_stats(&[line(1, 100, None, 90, 3), orphan]);
        assert!(batch.rows.is_empty());
        assert_eq!(batch.skipped, 2);
    }
}
