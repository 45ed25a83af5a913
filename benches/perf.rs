use criterion::{Criterion, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

use league_stats::db;
use league_stats::h2h::compute_h2h;
use league_stats::ledger::{
    self, CompletedAppearance, Dataset, LedgerMatch, MatchStatus, PlayerMatchStat,
};
use league_stats::player_season::compute_player_season_stats;
use league_stats::regenerate::{self, RegenerateRequest};
use league_stats::standings::compute_standings;

const TEAMS: i64 = 20;
const SEASONS: i64 = 5;
const SQUAD: i64 = 18;

fn synthetic_matches(rng: &mut StdRng) -> Vec<LedgerMatch> {
    let mut out = Vec::new();
    let mut id = 1;
    for season in 1..=SEASONS {
        for home in 1..=TEAMS {
            for away in 1..=TEAMS {
                if home == away {
                    continue;
                }
                let home_score = rng.gen_range(0..5);
                let away_score = rng.gen_range(0..5);
                let shootout = home_score == away_score && rng.gen_bool(0.2);
                out.push(LedgerMatch {
                    id,
                    season_id: Some(season),
                    home_team_id: Some(home),
                    away_team_id: Some(away),
                    match_date: format!("{}-{:02}-{:02}", 2019 + season, 1 + id % 12, 1 + id % 28),
                    status: MatchStatus::Completed,
                    home_score: Some(home_score),
                    away_score: Some(away_score),
                    home_penalty_score: shootout.then_some(5),
                    away_penalty_score: shootout.then_some(4),
                });
                id += 1;
            }
        }
    }
    out
}

fn synthetic_appearances(rng: &mut StdRng, matches: &[LedgerMatch]) -> Vec<CompletedAppearance> {
    let mut out = Vec::new();
    let mut id = 1;
    for m in matches {
        for team in [m.home_team_id, m.away_team_id].into_iter().flatten() {
            for slot in 0..SQUAD {
                let minutes = if slot < 11 { 90 } else { rng.gen_range(0..30) };
                out.push(CompletedAppearance {
                    season_id: m.season_id,
                    stat: PlayerMatchStat {
                        id,
                        match_id: m.id,
                        player_id: Some(team * 100 + slot),
                        team_id: Some(team),
                        goals: i64::from(rng.gen_bool(0.05)),
                        assists: i64::from(rng.gen_bool(0.04)),
                        yellow_cards: i64::from(rng.gen_bool(0.08)),
                        red_cards: 0,
                        minutes_played: minutes,
                        saves: if slot == 0 { rng.gen_range(0..6) } else { 0 },
                        position: None,
                        goals_conceded: 0,
                    },
                });
                id += 1;
            }
        }
    }
    out
}

fn bench_standings_compute(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let matches = synthetic_matches(&mut rng);
    c.bench_function("standings_compute", |b| {
        b.iter(|| {
            let rows = compute_standings(black_box(&matches));
            black_box(rows.len());
        })
    });
}

fn bench_h2h_compute(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(11);
    let matches = synthetic_matches(&mut rng);
    c.bench_function("h2h_compute", |b| {
        b.iter(|| {
            let rows = compute_h2h(black_box(&matches));
            black_box(rows.len());
        })
    });
}

fn bench_player_season_compute(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(13);
    let matches = synthetic_matches(&mut rng);
    let appearances = synthetic_appearances(&mut rng, &matches);
    c.bench_function("player_season_compute", |b| {
        b.iter(|| {
            let batch = compute_player_season_stats(black_box(&appearances));
            black_box(batch.rows.len());
        })
    });
}

fn bench_full_regeneration(c: &mut Criterion) {
    let dataset: Dataset = serde_json::from_str(LEAGUE_JSON).expect("valid fixture json");
    let mut conn = db::open_in_memory().expect("in-memory db");
    ledger::import_dataset(&mut conn, &dataset).expect("import fixture");
    c.bench_function("full_regeneration", |b| {
        b.iter(|| {
            let summary = regenerate::regenerate(&mut conn, RegenerateRequest::default())
                .expect("regeneration");
            black_box(summary.counts);
        })
    });
}

criterion_group!(
    perf,
    bench_standings_compute,
    bench_h2h_compute,
    bench_player_season_compute,
    bench_full_regeneration
);
criterion_main!(perf);

static LEAGUE_JSON: &str = include_str!("../tests/fixtures/league.json");
