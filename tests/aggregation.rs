use std::fs;
use std::path::PathBuf;

use rusqlite::{Connection, params};

use league_stats::db;
use league_stats::h2h;
use league_stats::ledger::{self, Dataset};
use league_stats::regenerate::{self, RegenerateRequest, StatsType};
use league_stats::standings::{self, StandingRow};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn seeded_conn() -> Connection {
    let dataset: Dataset =
        serde_json::from_str(&read_fixture("league.json")).expect("fixture should parse");
    let mut conn = db::open_in_memory().expect("in-memory db");
    ledger::import_dataset(&mut conn, &dataset).expect("import fixture");
    conn
}

fn run(
    conn: &mut Connection,
    stats_type: StatsType,
    season_id: Option<i64>,
) -> regenerate::RegenerationSummary {
    regenerate::regenerate(
        conn,
        RegenerateRequest {
            season_id,
            stats_type,
        },
    )
    .expect("regeneration should succeed")
}

fn standing(rows: &[StandingRow], season_id: i64, team_id: i64) -> StandingRow {
    rows.iter()
        .find(|r| r.season_id == season_id && r.team_id == team_id)
        .cloned()
        .unwrap_or_else(|| panic!("missing standing for season {season_id} team {team_id}"))
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .unwrap()
}

#[test]
fn two_team_season_ranks_on_goal_difference() {
    let raw = r#"{
        "seasons": [{ "id": 1, "name": "2024" }],
        "teams": [{ "id": 1, "name": "A" }, { "id": 2, "name": "B" }],
        "matches": [
            { "id": 1, "season_id": 1, "home_team_id": 1, "away_team_id": 2, "match_date": "2024-01-01", "status": "completed", "home_score": 2, "away_score": 1 },
            { "id": 2, "season_id": 1, "home_team_id": 2, "away_team_id": 1, "match_date": "2024-02-01", "status": "completed", "home_score": 1, "away_score": 1, "home_penalty_score": 4, "away_penalty_score": 3 },
            { "id": 3, "season_id": 1, "home_team_id": 1, "away_team_id": 2, "match_date": "2024-03-01", "status": "Completed", "home_score": 0, "away_score": 0 }
        ]
    }"#;
    let dataset: Dataset = serde_json::from_str(raw).unwrap();
    let mut conn = db::open_in_memory().unwrap();
    ledger::import_dataset(&mut conn, &dataset).unwrap();

    let created = standings::regenerate_standings(&mut conn, Some(1)).unwrap();
    assert_eq!(created, 2);

    let rows = standings::load_standings(&conn, Some(1)).unwrap();
    let a = standing(&rows, 1, 1);
    let b = standing(&rows, 1, 2);

    assert_eq!((a.wins, a.draws, a.losses, a.points), (1, 1, 1, 4));
    assert_eq!((a.goals_for, a.goals_against, a.goal_difference), (3, 2, 1));
    assert_eq!(a.position, 1);

    assert_eq!((b.wins, b.draws, b.losses, b.points), (1, 1, 1, 4));
    assert_eq!((b.goals_for, b.goals_against, b.goal_difference), (2, 3, -1));
    assert_eq!(b.position, 2);
}

#[test]
fn standings_follow_points_then_goal_difference() {
    let mut conn = seeded_conn();
    let created = standings::regenerate_standings(&mut conn, None).unwrap();
    assert_eq!(created, 7);

    let rows = standings::load_standings(&conn, Some(2)).unwrap();
    let order: Vec<i64> = {
        let mut by_pos = rows.clone();
        by_pos.sort_by_key(|r| r.position);
        by_pos.iter().map(|r| r.team_id).collect()
    };
    assert_eq!(order, vec![3, 1, 2, 4]);

    let mut positions: Vec<i64> = rows.iter().map(|r| r.position).collect();
    positions.sort_unstable();
    assert_eq!(positions, vec![1, 2, 3, 4]);

    let season_one = standings::load_standings(&conn, Some(1)).unwrap();
    let leader = standing(&season_one, 1, 1);
    assert_eq!((leader.wins, leader.draws, leader.points), (2, 1, 7));
    assert_eq!(leader.position, 1);
}

#[test]
fn penalty_winner_gets_full_points_without_shootout_goals() {
    let mut conn = seeded_conn();
    standings::regenerate_standings(&mut conn, Some(2)).unwrap();
    let rows = standings::load_standings(&conn, Some(2)).unwrap();

    // Match 11 went 1-1 and Brackley took the shootout 4-3.
    let brackley = standing(&rows, 2, 2);
    assert_eq!(brackley.wins, 1);
    assert_eq!(brackley.goals_for, 2);
    let avonford = standing(&rows, 2, 1);
    assert_eq!(avonford.losses, 1);
    assert_eq!(avonford.goals_against, 2);

    for row in &rows {
        assert_eq!(row.matches_played, row.wins + row.draws + row.losses);
        assert_eq!(row.points, 3 * row.wins + row.draws);
        assert_eq!(row.goal_difference, row.goals_for - row.goals_against);
    }
}

#[test]
fn level_match_without_shootout_is_a_draw_for_both() {
    let mut conn = seeded_conn();
    standings::regenerate_standings(&mut conn, Some(2)).unwrap();
    let rows = standings::load_standings(&conn, Some(2)).unwrap();

    let caldmore = standing(&rows, 2, 3);
    let dunmere = standing(&rows, 2, 4);
    assert_eq!(caldmore.draws, 1);
    assert_eq!(dunmere.draws, 1);
    assert_eq!(dunmere.points, 1);
}

#[test]
fn scoped_standings_leave_other_seasons_alone() {
    let mut conn = seeded_conn();
    standings::regenerate_standings(&mut conn, None).unwrap();
    conn.execute("UPDATE standings SET points = 99 WHERE season_id = 1", [])
        .unwrap();

    standings::regenerate_standings(&mut conn, Some(2)).unwrap();

    let untouched: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM standings WHERE season_id = 1 AND points = 99",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(untouched, 3);
}

#[test]
fn failed_standing_row_leaves_no_position_gap() {
    let mut conn = seeded_conn();
    conn.execute_batch(
        "CREATE TRIGGER reject_standing BEFORE INSERT ON standings
         WHEN NEW.team_id = 1
         BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
    )
    .unwrap();

    let created = standings::regenerate_standings(&mut conn, Some(2)).unwrap();
    assert_eq!(created, 3);

    let rows = standings::load_standings(&conn, Some(2)).unwrap();
    let table: Vec<(i64, i64)> = rows.iter().map(|r| (r.position, r.team_id)).collect();
    assert_eq!(table, vec![(1, 3), (2, 2), (3, 4)]);
}

#[test]
fn player_appearances_skip_bench_lines() {
    let mut conn = seeded_conn();
    let summary = run(&mut conn, StatsType::PlayerStats, Some(2));
    assert_eq!(summary.counts.player_stats, Some(5));
    assert_eq!(summary.counts.standings, None);

    let (played, goals, minutes): (i64, i64, i64) = conn
        .query_row(
            "SELECT matches_played, goals, minutes_played FROM player_season_stats
             WHERE season_id = 2 AND player_id = 101 AND team_id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    // The scheduled match 15 line is not counted.
    assert_eq!((played, goals, minutes), (3, 3, 255));

    let (keeper_played, keeper_saves): (i64, i64) = conn
        .query_row(
            "SELECT matches_played, saves FROM player_season_stats
             WHERE season_id = 2 AND player_id = 102",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!((keeper_played, keeper_saves), (1, 3));

    let (yellow, red): (i64, i64) = conn
        .query_row(
            "SELECT yellow_cards, red_cards FROM player_season_stats
             WHERE season_id = 2 AND player_id = 201",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!((yellow, red), (1, 1));
}

#[test]
fn failed_player_row_is_not_counted() {
    let mut conn = seeded_conn();
    conn.execute_batch(
        "CREATE TRIGGER reject_player BEFORE INSERT ON player_season_stats
         WHEN NEW.player_id = 201
         BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
    )
    .unwrap();

    let created =
        league_stats::player_season::regenerate_player_season_stats(&mut conn, Some(2)).unwrap();
    assert_eq!(created, 4);
    assert_eq!(count(&conn, "player_season_stats"), 4);

    let rejected: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM player_season_stats WHERE player_id = 201",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(rejected, 0);
}

#[test]
fn team_stats_mirror_standings() {
    let mut conn = seeded_conn();
    let summary = run(&mut conn, StatsType::All, Some(2));
    assert_eq!(summary.counts.team_stats, Some(4));

    let rows = standings::load_standings(&conn, Some(2)).unwrap();
    for row in rows {
        let (points, position, goal_difference): (i64, i64, i64) = conn
            .query_row(
                "SELECT points, position, goal_difference FROM team_season_stats
                 WHERE season_id = ?1 AND team_id = ?2",
                params![row.season_id, row.team_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(
            (points, position, goal_difference),
            (row.points, row.position, row.goal_difference)
        );
    }
}

#[test]
fn team_seasons_ignore_incomplete_fixtures() {
    let mut conn = seeded_conn();
    let summary = run(&mut conn, StatsType::TeamSeasons, None);
    assert_eq!(summary.counts.team_seasons, Some(7));

    // Season 2 includes the scheduled fixture but not the one missing an away side.
    let season_two: Vec<i64> = {
        let mut stmt = conn
            .prepare("SELECT team_id FROM team_seasons WHERE season_id = 2 ORDER BY team_id")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    };
    assert_eq!(season_two, vec![1, 2, 3, 4]);
}

#[test]
fn h2h_spans_all_seasons_even_when_scoped() {
    let mut conn = seeded_conn();
    let summary = run(&mut conn, StatsType::H2h, Some(2));
    assert_eq!(summary.counts.h2h, Some(4));
    assert_eq!(summary.h2h_scope, Some(regenerate::H2H_SCOPE_ALL_SEASONS));

    let pair = h2h::load_pair(&conn, 2, 1).unwrap().expect("pair 1-2");
    assert_eq!((pair.team_small_id, pair.team_large_id), (1, 2));
    assert_eq!(pair.matches_played, 5);
    assert_eq!((pair.small_wins, pair.large_wins, pair.draws), (2, 1, 2));
    assert_eq!((pair.small_goals, pair.large_goals), (8, 4));
    assert_eq!(pair.last_match_date.as_deref(), Some("2024-10-05"));

    // Match 16 has no season but still counts between its teams.
    let seasonless = h2h::load_pair(&conn, 1, 4).unwrap().expect("pair 1-4");
    assert_eq!(seasonless.small_wins, 1);

    let rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM h2h_pair_stats WHERE team_small_id >= team_large_id",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(rows, 0);
}

#[test]
fn full_regeneration_is_idempotent() {
    let mut conn = seeded_conn();
    let first = run(&mut conn, StatsType::All, None);
    let snapshot = |conn: &Connection| -> Vec<String> {
        let mut out = Vec::new();
        for (table, order) in [
            ("standings", "1, 2"),
            ("player_season_stats", "1, 2, 3"),
            ("team_season_stats", "1, 2"),
            ("team_seasons", "1, 2"),
            ("h2h_pair_stats", "1, 2"),
        ] {
            let mut stmt = conn
                .prepare(&format!("SELECT * FROM {table} ORDER BY {order}"))
                .unwrap();
            let cols = stmt.column_count();
            let rows = stmt
                .query_map([], |row| {
                    let mut cells = Vec::with_capacity(cols);
                    for idx in 0..cols {
                        let value: rusqlite::types::Value = row.get(idx)?;
                        cells.push(format!("{value:?}"));
                    }
                    Ok(format!("{table}:{}", cells.join("|")))
                })
                .unwrap();
            for row in rows {
                out.push(row.unwrap());
            }
        }
        out
    };
    let before = snapshot(&conn);

    let second = run(&mut conn, StatsType::All, None);
    assert_eq!(first.counts, second.counts);
    assert_eq!(before, snapshot(&conn));

    assert_eq!(second.counts.standings, Some(7));
    assert_eq!(second.counts.player_stats, Some(6));
    assert_eq!(second.counts.team_stats, Some(7));
    assert_eq!(second.counts.team_seasons, Some(7));
    assert_eq!(second.counts.h2h, Some(4));
}

#[test]
fn runs_are_recorded_with_errors() {
    let mut conn = seeded_conn();
    let ok = run(&mut conn, StatsType::Standings, Some(1));

    conn.execute_batch("DROP TABLE team_season_stats;").unwrap();
    let failed = regenerate::regenerate(
        &mut conn,
        RegenerateRequest {
            season_id: None,
            stats_type: StatsType::All,
        },
    );
    assert!(failed.is_err());

    let runs = regenerate::recent_runs(&conn, 10).unwrap();
    assert_eq!(runs.len(), 2);

    let latest = &runs[0];
    assert_eq!(latest.stats_type, "all");
    assert!(latest.error.as_deref().unwrap_or_default().contains("team stats"));
    assert_eq!(latest.counts.standings, Some(7));
    assert_eq!(latest.counts.player_stats, Some(6));
    assert_eq!(latest.counts.team_stats, None);

    let earlier = &runs[1];
    assert_eq!(earlier.run_id, ok.run_id);
    assert_eq!(earlier.season_id, Some(1));
    assert!(earlier.error.is_none());
    assert!(earlier.finished_at.is_some());
}
