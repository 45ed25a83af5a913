use std::fmt;

use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde::{Deserialize, Serialize};

use crate::h2h;
use crate::ledger::SeasonRecord;
use crate::standings::StandingRow;

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Caller supplied a filter or sort the read API does not accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidQuery(pub String);

impl fmt::Display for InvalidQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvalidQuery {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page: u32,
    pub limit: u32,
}

impl PageParams {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
        }
    }

    fn offset(self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.limit)
    }
}

impl Default for PageParams {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub has_next: bool,
}

impl<T> Page<T> {
    fn new(items: Vec<T>, total: i64, params: PageParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            limit: params.limit,
            has_next: i64::from(params.page) * i64::from(params.limit) < total,
        }
    }
}

#[derive(Debug, Default)]
struct Filters {
    clauses: Vec<&'static str>,
    args: Vec<Value>,
}

impl Filters {
    fn push(&mut self, clause: &'static str, value: impl Into<Value>) {
        self.clauses.push(clause);
        self.args.push(value.into());
    }

    fn name_like(&mut self, clause: &'static str, name: Option<&str>) {
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            self.push(clause, format!("%{}%", name.to_lowercase()));
        }
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// Maps `name` / `-name` onto a whitelisted ORDER BY expression.
fn resolve_sort(raw: Option<&str>, allowed: &[(&str, &str)], default: &str) -> Result<String> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(default);
    let (key, descending) = match raw.strip_prefix('-') {
        Some(key) => (key, true),
        None => (raw, false),
    };
    let Some((_, column)) = allowed.iter().find(|(name, _)| *name == key) else {
        let names = allowed.iter().map(|(name, _)| *name).collect::<Vec<_>>();
        return Err(InvalidQuery(format!(
            "unknown sort key {key:?} (expected one of {})",
            names.join(", ")
        ))
        .into());
    };
    Ok(format!("{column} {}", if descending { "DESC" } else { "ASC" }))
}

fn fetch_page<T, F>(
    conn: &Connection,
    select: &str,
    from: &str,
    filters: &Filters,
    order_by: &str,
    params: PageParams,
    map: F,
) -> Result<Page<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let where_sql = filters.where_sql();
    let total: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM {from}{where_sql}"),
            params_from_iter(filters.args.iter()),
            |row| row.get(0),
        )
        .context("count page rows")?;

    let mut args = filters.args.clone();
    args.push(Value::Integer(i64::from(params.limit)));
    args.push(Value::Integer(params.offset()));

    let sql =
        format!("SELECT {select} FROM {from}{where_sql} ORDER BY {order_by} LIMIT ? OFFSET ?");
    let mut stmt = conn.prepare(&sql).context("prepare page query")?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), map)
        .context("query page")?;

    let mut items = Vec::new();
    for row in rows {
        items.push(row.context("decode page row")?);
    }
    Ok(Page::new(items, total, params))
}

// ---------------------------------------------------------------------------
// Players

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayerFilter {
    pub name: Option<String>,
    pub team_id: Option<i64>,
    pub position: Option<String>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerSummary {
    pub id: i64,
    pub name: String,
    pub position: Option<String>,
    pub team_id: Option<i64>,
    pub team_name: Option<String>,
    pub nationality: Option<String>,
    pub shirt_number: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerSeasonLine {
    pub season_id: i64,
    pub season_name: Option<String>,
    pub team_id: i64,
    pub team_name: Option<String>,
    pub matches_played: i64,
    pub goals: i64,
    pub assists: i64,
    pub yellow_cards: i64,
    pub red_cards: i64,
    pub minutes_played: i64,
    pub saves: i64,
    pub goals_conceded: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerDetail {
    #[serde(flatten)]
    pub player: PlayerSummary,
    pub seasons: Vec<PlayerSeasonLine>,
}

const PLAYER_SORTS: &[(&str, &str)] = &[
    ("name", "p.name COLLATE NOCASE"),
    ("position", "p.position"),
    ("team", "t.name COLLATE NOCASE"),
    ("shirt_number", "p.shirt_number"),
    ("id", "p.id"),
];

const PLAYER_SELECT: &str =
    "p.id, p.name, p.position, p.team_id, t.name, p.nationality, p.shirt_number";
const PLAYER_FROM: &str = "players p LEFT JOIN teams t ON t.id = p.team_id";

fn player_from_row(row: &Row<'_>) -> rusqlite::Result<PlayerSummary> {
    Ok(PlayerSummary {
        id: row.get(0)?,
        name: row.get(1)?,
        position: row.get(2)?,
        team_id: row.get(3)?,
        team_name: row.get(4)?,
        nationality: row.get(5)?,
        shirt_number: row.get(6)?,
    })
}

pub fn list_players(conn: &Connection, filter: &PlayerFilter) -> Result<Page<PlayerSummary>> {
    let mut filters = Filters::default();
    filters.name_like("lower(p.name) LIKE ?", filter.name.as_deref());
    if let Some(team_id) = filter.team_id {
        filters.push("p.team_id = ?", team_id);
    }
    if let Some(position) = filter.position.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        filters.push("lower(p.position) = ?", position.to_lowercase());
    }
    let order = resolve_sort(filter.sort.as_deref(), PLAYER_SORTS, "name")?;

    fetch_page(
        conn,
        PLAYER_SELECT,
        PLAYER_FROM,
        &filters,
        &format!("{order}, p.id ASC"),
        PageParams::new(filter.page, filter.limit),
        player_from_row,
    )
}

pub fn get_player(conn: &Connection, id: i64) -> Result<Option<PlayerDetail>> {
    let player = conn
        .query_row(
            &format!("SELECT {PLAYER_SELECT} FROM {PLAYER_FROM} WHERE p.id = ?1"),
            params![id],
            player_from_row,
        )
        .optional()
        .context("query player")?;
    let Some(player) = player else {
        return Ok(None);
    };

    let mut stmt = conn
        .prepare(
            "SELECT ps.season_id, s.name, ps.team_id, t.name, ps.matches_played, ps.goals,
                    ps.assists, ps.yellow_cards, ps.red_cards, ps.minutes_played, ps.saves,
                    ps.goals_conceded
             FROM player_season_stats ps
             LEFT JOIN seasons s ON s.id = ps.season_id
             LEFT JOIN teams t ON t.id = ps.team_id
             WHERE ps.player_id = ?1
             ORDER BY ps.season_id DESC, ps.team_id ASC",
        )
        .context("prepare player seasons query")?;
    let rows = stmt
        .query_map(params![id], |row| {
            Ok(PlayerSeasonLine {
                season_id: row.get(0)?,
                season_name: row.get(1)?,
                team_id: row.get(2)?,
                team_name: row.get(3)?,
                matches_played: row.get(4)?,
                goals: row.get(5)?,
                assists: row.get(6)?,
                yellow_cards: row.get(7)?,
                red_cards: row.get(8)?,
                minutes_played: row.get(9)?,
                saves: row.get(10)?,
                goals_conceded: row.get(11)?,
            })
        })
        .context("query player seasons")?;

    let mut seasons = Vec::new();
    for row in rows {
        seasons.push(row.context("decode player season row")?);
    }
    Ok(Some(PlayerDetail { player, seasons }))
}

// ---------------------------------------------------------------------------
// Coaches

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoachFilter {
    pub name: Option<String>,
    pub team_id: Option<i64>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoachSummary {
    pub id: i64,
    pub name: String,
    pub team_id: Option<i64>,
    pub team_name: Option<String>,
    pub nationality: Option<String>,
    pub role: Option<String>,
}

const COACH_SORTS: &[(&str, &str)] = &[
    ("name", "c.name COLLATE NOCASE"),
    ("team", "t.name COLLATE NOCASE"),
    ("role", "c.role"),
    ("id", "c.id"),
];

const COACH_SELECT: &str = "c.id, c.name, c.team_id, t.name, c.nationality, c.role";
const COACH_FROM: &str = "coaches c LEFT JOIN teams t ON t.id = c.team_id";

fn coach_from_row(row: &Row<'_>) -> rusqlite::Result<CoachSummary> {
    Ok(CoachSummary {
        id: row.get(0)?,
        name: row.get(1)?,
        team_id: row.get(2)?,
        team_name: row.get(3)?,
        nationality: row.get(4)?,
        role: row.get(5)?,
    })
}

pub fn list_coaches(conn: &Connection, filter: &CoachFilter) -> Result<Page<CoachSummary>> {
    let mut filters = Filters::default();
    filters.name_like("lower(c.name) LIKE ?", filter.name.as_deref());
    if let Some(team_id) = filter.team_id {
        filters.push("c.team_id = ?", team_id);
    }
    let order = resolve_sort(filter.sort.as_deref(), COACH_SORTS, "name")?;

    fetch_page(
        conn,
        COACH_SELECT,
        COACH_FROM,
        &filters,
        &format!("{order}, c.id ASC"),
        PageParams::new(filter.page, filter.limit),
        coach_from_row,
    )
}

pub fn get_coach(conn: &Connection, id: i64) -> Result<Option<CoachSummary>> {
    conn.query_row(
        &format!("SELECT {COACH_SELECT} FROM {COACH_FROM} WHERE c.id = ?1"),
        params![id],
        coach_from_row,
    )
    .optional()
    .context("query coach")
}

// ---------------------------------------------------------------------------
// Teams

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamFilter {
    pub name: Option<String>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamSummary {
    pub id: i64,
    pub name: String,
    pub short_name: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamSeasonLine {
    pub season_id: i64,
    pub season_name: Option<String>,
    /// Absent until the season has completed matches and stats were regenerated.
    pub stats: Option<StandingRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamDetail {
    #[serde(flatten)]
    pub team: TeamSummary,
    pub squad_size: i64,
    pub coaches: Vec<CoachSummary>,
    pub seasons: Vec<TeamSeasonLine>,
}

const TEAM_SORTS: &[(&str, &str)] = &[
    ("name", "name COLLATE NOCASE"),
    ("city", "city COLLATE NOCASE"),
    ("id", "id"),
];

fn team_from_row(row: &Row<'_>) -> rusqlite::Result<TeamSummary> {
    Ok(TeamSummary {
        id: row.get(0)?,
        name: row.get(1)?,
        short_name: row.get(2)?,
        city: row.get(3)?,
    })
}

pub fn list_teams(conn: &Connection, filter: &TeamFilter) -> Result<Page<TeamSummary>> {
    let mut filters = Filters::default();
    filters.name_like("lower(name) LIKE ?", filter.name.as_deref());
    let order = resolve_sort(filter.sort.as_deref(), TEAM_SORTS, "name")?;

    fetch_page(
        conn,
        "id, name, short_name, city",
        "teams",
        &filters,
        &format!("{order}, id ASC"),
        PageParams::new(filter.page, filter.limit),
        team_from_row,
    )
}

pub fn get_team(conn: &Connection, id: i64) -> Result<Option<TeamDetail>> {
    let team = conn
        .query_row(
            "SELECT id, name, short_name, city FROM teams WHERE id = ?1",
            params![id],
            team_from_row,
        )
        .optional()
        .context("query team")?;
    let Some(team) = team else {
        return Ok(None);
    };

    let squad_size: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM players WHERE team_id = ?1",
            params![id],
            |row| row.get(0),
        )
        .context("count squad")?;

    let coaches = list_coaches(
        conn,
        &CoachFilter {
            team_id: Some(id),
            limit: Some(MAX_PAGE_LIMIT),
            ..CoachFilter::default()
        },
    )?
    .items;

    let mut stmt = conn
        .prepare(
            "SELECT ts.season_id, s.name, st.season_id, st.matches_played, st.wins, st.draws,
                    st.losses, st.goals_for, st.goals_against, st.goal_difference, st.points,
                    st.position
             FROM team_seasons ts
             LEFT JOIN seasons s ON s.id = ts.season_id
             LEFT JOIN team_season_stats st
                ON st.season_id = ts.season_id AND st.team_id = ts.team_id
             WHERE ts.team_id = ?1
             ORDER BY ts.season_id DESC",
        )
        .context("prepare team seasons query")?;
    let rows = stmt
        .query_map(params![id], |row| {
            let season_id: i64 = row.get(0)?;
            let has_stats = row.get::<_, Option<i64>>(2)?.is_some();
            let stats = if has_stats {
                Some(StandingRow {
                    season_id,
                    team_id: id,
                    matches_played: row.get(3)?,
                    wins: row.get(4)?,
                    draws: row.get(5)?,
                    losses: row.get(6)?,
                    goals_for: row.get(7)?,
                    goals_against: row.get(8)?,
                    goal_difference: row.get(9)?,
                    points: row.get(10)?,
                    position: row.get(11)?,
                })
            } else {
                None
            };
            Ok(TeamSeasonLine {
                season_id,
                season_name: row.get(1)?,
                stats,
            })
        })
        .context("query team seasons")?;

    let mut seasons = Vec::new();
    for row in rows {
        seasons.push(row.context("decode team season row")?);
    }

    Ok(Some(TeamDetail {
        team,
        squad_size,
        coaches,
        seasons,
    }))
}

// ---------------------------------------------------------------------------
// Seasons

pub fn list_seasons(conn: &Connection) -> Result<Vec<SeasonRecord>> {
    let mut stmt = conn
        .prepare("SELECT id, name, start_year FROM seasons ORDER BY start_year DESC, id DESC")
        .context("prepare seasons query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(SeasonRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                start_year: row.get(2)?,
            })
        })
        .context("query seasons")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode season row")?);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Rankings

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RankingFilter {
    pub season_id: Option<i64>,
    pub team_id: Option<i64>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankingRow {
    pub position: i64,
    pub team_id: i64,
    pub team_name: Option<String>,
    pub matches_played: i64,
    pub wins: i64,
    pub draws: i64,
    pub losses: i64,
    pub goals_for: i64,
    pub goals_against: i64,
    pub goal_difference: i64,
    pub points: i64,
}

pub fn list_rankings(conn: &Connection, filter: &RankingFilter) -> Result<Page<RankingRow>> {
    let Some(season_id) = filter.season_id else {
        return Err(InvalidQuery("season_id is required".to_string()).into());
    };
    let mut filters = Filters::default();
    filters.push("st.season_id = ?", season_id);
    if let Some(team_id) = filter.team_id {
        filters.push("st.team_id = ?", team_id);
    }

    fetch_page(
        conn,
        "st.position, st.team_id, t.name, st.matches_played, st.wins, st.draws, st.losses,
         st.goals_for, st.goals_against, st.goal_difference, st.points",
        "standings st LEFT JOIN teams t ON t.id = st.team_id",
        &filters,
        "st.position ASC",
        PageParams::new(filter.page, filter.limit),
        |row| {
            Ok(RankingRow {
                position: row.get(0)?,
                team_id: row.get(1)?,
                team_name: row.get(2)?,
                matches_played: row.get(3)?,
                wins: row.get(4)?,
                draws: row.get(5)?,
                losses: row.get(6)?,
                goals_for: row.get(7)?,
                goals_against: row.get(8)?,
                goal_difference: row.get(9)?,
                points: row.get(10)?,
            })
        },
    )
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaderFilter {
    pub season_id: Option<i64>,
    pub team_id: Option<i64>,
    pub position: Option<String>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderRow {
    pub player_id: i64,
    pub player_name: Option<String>,
    pub position: Option<String>,
    pub team_id: i64,
    pub team_name: Option<String>,
    pub matches_played: i64,
    pub goals: i64,
    pub assists: i64,
    pub minutes_played: i64,
    pub saves: i64,
}

const LEADER_SORTS: &[(&str, &str)] = &[
    ("goals", "ps.goals"),
    ("assists", "ps.assists"),
    ("minutes", "ps.minutes_played"),
    ("saves", "ps.saves"),
    ("matches", "ps.matches_played"),
];

/// Player leaders of one season, highest first on the chosen metric.
pub fn list_player_leaders(conn: &Connection, filter: &LeaderFilter) -> Result<Page<LeaderRow>> {
    let Some(season_id) = filter.season_id else {
        return Err(InvalidQuery("season_id is required".to_string()).into());
    };
    let mut filters = Filters::default();
    filters.push("ps.season_id = ?", season_id);
    if let Some(team_id) = filter.team_id {
        filters.push("ps.team_id = ?", team_id);
    }
    if let Some(position) = filter.position.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        filters.push("lower(p.position) = ?", position.to_lowercase());
    }
    let metric = filter
        .sort
        .as_deref()
        .map(|s| s.trim().trim_start_matches('-'))
        .filter(|s| !s.is_empty());
    let order = resolve_sort(metric.map(|m| format!("-{m}")).as_deref(), LEADER_SORTS, "-goals")?;

    fetch_page(
        conn,
        "ps.player_id, p.name, p.position, ps.team_id, t.name, ps.matches_played, ps.goals,
         ps.assists, ps.minutes_played, ps.saves",
        "player_season_stats ps
         LEFT JOIN players p ON p.id = ps.player_id
         LEFT JOIN teams t ON t.id = ps.team_id",
        &filters,
        &format!("{order}, ps.minutes_played ASC, ps.player_id ASC"),
        PageParams::new(filter.page, filter.limit),
        |row| {
            Ok(LeaderRow {
                player_id: row.get(0)?,
                player_name: row.get(1)?,
                position: row.get(2)?,
                team_id: row.get(3)?,
                team_name: row.get(4)?,
                matches_played: row.get(5)?,
                goals: row.get(6)?,
                assists: row.get(7)?,
                minutes_played: row.get(8)?,
                saves: row.get(9)?,
            })
        },
    )
}

// ---------------------------------------------------------------------------
// Head to head

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct H2hView {
    pub team_id: i64,
    pub opponent_id: i64,
    pub matches_played: i64,
    pub wins: i64,
    pub draws: i64,
    pub losses: i64,
    pub goals_for: i64,
    pub goals_against: i64,
    pub last_match_date: Option<String>,
}

/// Head-to-head record of `team_id` against `opponent_id`, from the first team's side.
pub fn get_h2h(conn: &Connection, team_id: i64, opponent_id: i64) -> Result<Option<H2hView>> {
    if team_id == opponent_id {
        return Err(
            InvalidQuery("a team has no head-to-head record against itself".to_string()).into(),
        );
    }
    let Some(pair) = h2h::load_pair(conn, team_id, opponent_id)? else {
        return Ok(None);
    };
    let team_is_small = pair.team_small_id == team_id;
    let (wins, losses, goals_for, goals_against) = if team_is_small {
        (pair.small_wins, pair.large_wins, pair.small_goals, pair.large_goals)
    } else {
        (pair.large_wins, pair.small_wins, pair.large_goals, pair.small_goals)
    };
    Ok(Some(H2hView {
        team_id,
        opponent_id,
        matches_played: pair.matches_played,
        wins,
        draws: pair.draws,
        losses,
        goals_for,
        goals_against,
        last_match_date: pair.last_match_date,
    }))
}
