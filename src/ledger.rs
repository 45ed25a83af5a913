use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum MatchStatus {
    Scheduled,
    Completed,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(MatchStatus::Scheduled),
            "completed" => Ok(MatchStatus::Completed),
            other => Err(anyhow!("unknown match status {other:?}")),
        }
    }
}

impl TryFrom<String> for MatchStatus {
    type Error = anyhow::Error;

    fn try_from(raw: String) -> Result<Self> {
        raw.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    HomeWin,
    AwayWin,
    Draw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMatch {
    pub id: i64,
    pub season_id: Option<i64>,
    pub home_team_id: Option<i64>,
    pub away_team_id: Option<i64>,
    pub match_date: String,
    pub status: MatchStatus,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    #[serde(default)]
    pub home_penalty_score: Option<i64>,
    #[serde(default)]
    pub away_penalty_score: Option<i64>,
}

impl LedgerMatch {
    /// Result of a completed match. A level score is settled by the shootout
    /// when one was recorded; otherwise it is a draw.
    pub fn outcome(&self) -> Option<Outcome> {
        let (Some(home), Some(away)) = (self.home_score, self.away_score) else {
            return None;
        };
        if self.status != MatchStatus::Completed {
            return None;
        }
        if home > away {
            return Some(Outcome::HomeWin);
        }
        if home < away {
            return Some(Outcome::AwayWin);
        }
        match (self.home_penalty_score, self.away_penalty_score) {
            (Some(hp), Some(ap)) if hp > ap => Some(Outcome::HomeWin),
            (Some(hp), Some(ap)) if hp < ap => Some(Outcome::AwayWin),
            _ => Some(Outcome::Draw),
        }
    }

    pub fn is_penalty_decided(&self) -> bool {
        self.home_score.is_some()
            && self.home_score == self.away_score
            && matches!(
                (self.home_penalty_score, self.away_penalty_score),
                (Some(hp), Some(ap)) if hp != ap
            )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerMatchStat {
    pub id: i64,
    pub match_id: i64,
    pub player_id: Option<i64>,
    pub team_id: Option<i64>,
    #[serde(default)]
    pub goals: i64,
    #[serde(default)]
    pub assists: i64,
    #[serde(default)]
    pub yellow_cards: i64,
    #[serde(default)]
    pub red_cards: i64,
    #[serde(default)]
    pub minutes_played: i64,
    #[serde(default)]
    pub saves: i64,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub goals_conceded: i64,
}

/// A player's line from a completed match, carrying the match's season.
#[derive(Debug, Clone)]
pub struct CompletedAppearance {
    pub season_id: Option<i64>,
    pub stat: PlayerMatchStat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub start_year: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub team_id: Option<i64>,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub shirt_number: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub team_id: Option<i64>,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Bulk payload accepted by [`import_dataset`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub seasons: Vec<SeasonRecord>,
    #[serde(default)]
    pub teams: Vec<TeamRecord>,
    #[serde(default)]
    pub players: Vec<PlayerRecord>,
    #[serde(default)]
    pub coaches: Vec<CoachRecord>,
    #[serde(default)]
    pub matches: Vec<LedgerMatch>,
    #[serde(default)]
    pub player_match_stats: Vec<PlayerMatchStat>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub seasons: usize,
    pub teams: usize,
    pub players: usize,
    pub coaches: usize,
    pub matches: usize,
    pub player_match_stats: usize,
}

const MATCH_COLUMNS: &str = "id, season_id, home_team_id, away_team_id, match_date, status, \
     home_score, away_score, home_penalty_score, away_penalty_score";

fn match_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerMatch> {
    let raw_status: String = row.get(5)?;
    let status = raw_status.parse::<MatchStatus>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, err.into())
    })?;
    Ok(LedgerMatch {
        id: row.get(0)?,
        season_id: row.get(1)?,
        home_team_id: row.get(2)?,
        away_team_id: row.get(3)?,
        match_date: row.get(4)?,
        status,
        home_score: row.get(6)?,
        away_score: row.get(7)?,
        home_penalty_score: row.get(8)?,
        away_penalty_score: row.get(9)?,
    })
}

/// Completed matches with both scores recorded, optionally limited to one season.
pub fn load_completed_matches(
    conn: &Connection,
    season_id: Option<i64>,
) -> Result<Vec<LedgerMatch>> {
    let sql = format!(
        "SELECT {MATCH_COLUMNS} FROM matches
         WHERE status = 'completed'
           AND home_score IS NOT NULL
           AND away_score IS NOT NULL
           AND (?1 IS NULL OR season_id = ?1)
         ORDER BY match_date ASC, id ASC"
    );
    let mut stmt = conn
        .prepare(&sql)
        .context("prepare load completed matches query")?;
    let rows = stmt
        .query_map(params![season_id], match_from_row)
        .context("query completed matches")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode match row")?);
    }
    Ok(out)
}

/// Every match in scope whatever its status.
pub fn load_matches(conn: &Connection, season_id: Option<i64>) -> Result<Vec<LedgerMatch>> {
    let sql = format!(
        "SELECT {MATCH_COLUMNS} FROM matches
         WHERE (?1 IS NULL OR season_id = ?1)
         ORDER BY match_date ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql).context("prepare load matches query")?;
    let rows = stmt
        .query_map(params![season_id], match_from_row)
        .context("query matches")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode match row")?);
    }
    Ok(out)
}

/// Player lines joined to completed matches in scope.
pub fn load_completed_appearances(
    conn: &Connection,
    season_id: Option<i64>,
) -> Result<Vec<CompletedAppearance>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                m.season_id, s.id, s.match_id, s.player_id, s.team_id,
                s.goals, s.assists, s.yellow_cards, s.red_cards,
                s.minutes_played, s.saves, s.position, s.goals_conceded
            FROM player_match_stats s
            INNER JOIN matches m ON m.id = s.match_id
            WHERE m.status = 'completed'
              AND (?1 IS NULL OR m.season_id = ?1)
            ORDER BY s.match_id ASC, s.id ASC
            "#,
        )
        .context("prepare load appearances query")?;

    let rows = stmt
        .query_map(params![season_id], |row| {
            Ok(CompletedAppearance {
                season_id: row.get(0)?,
                stat: PlayerMatchStat {
                    id: row.get(1)?,
                    match_id: row.get(2)?,
                    player_id: row.get(3)?,
                    team_id: row.get(4)?,
                    goals: row.get(5)?,
                    assists: row.get(6)?,
                    yellow_cards: row.get(7)?,
                    red_cards: row.get(8)?,
                    minutes_played: row.get(9)?,
                    saves: row.get(10)?,
                    position: row.get(11)?,
                    goals_conceded: row.get(12)?,
                },
            })
        })
        .context("query appearances")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode appearance row")?);
    }
    Ok(out)
}

/// Upserts the whole dataset in one transaction, keyed by primary key, so a
/// re-import doubles as an administrative correction.
pub fn import_dataset(conn: &mut Connection, dataset: &Dataset) -> Result<ImportSummary> {
    let tx = conn.transaction().context("begin import transaction")?;
    let mut summary = ImportSummary::default();

    for season in &dataset.seasons {
        tx.execute(
            "INSERT INTO seasons (id, name, start_year) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, start_year = excluded.start_year",
            params![season.id, season.name, season.start_year],
        )
        .with_context(|| format!("upsert season {}", season.id))?;
        summary.seasons += 1;
    }

    for team in &dataset.teams {
        tx.execute(
            "INSERT INTO teams (id, name, short_name, city) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                short_name = excluded.short_name,
                city = excluded.city",
            params![team.id, team.name, team.short_name, team.city],
        )
        .with_context(|| format!("upsert team {}", team.id))?;
        summary.teams += 1;
    }

    for player in &dataset.players {
        tx.execute(
            "INSERT INTO players (id, name, position, team_id, nationality, shirt_number)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                position = excluded.position,
                team_id = excluded.team_id,
                nationality = excluded.nationality,
                shirt_number = excluded.shirt_number",
            params![
                player.id,
                player.name,
                player.position,
                player.team_id,
                player.nationality,
                player.shirt_number
            ],
        )
        .with_context(|| format!("upsert player {}", player.id))?;
        summary.players += 1;
    }

    for coach in &dataset.coaches {
        tx.execute(
            "INSERT INTO coaches (id, name, team_id, nationality, role)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                team_id = excluded.team_id,
                nationality = excluded.nationality,
                role = excluded.role",
            params![coach.id, coach.name, coach.team_id, coach.nationality, coach.role],
        )
        .with_context(|| format!("upsert coach {}", coach.id))?;
        summary.coaches += 1;
    }

    for m in &dataset.matches {
        upsert_match(&tx, m)?;
        summary.matches += 1;
    }

    for stat in &dataset.player_match_stats {
        upsert_player_match_stat(&tx, stat)?;
        summary.player_match_stats += 1;
    }

    tx.commit().context("commit import transaction")?;
    Ok(summary)
}

pub fn upsert_match(conn: &Connection, m: &LedgerMatch) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO matches (
            id, season_id, home_team_id, away_team_id, match_date, status,
            home_score, away_score, home_penalty_score, away_penalty_score, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(id) DO UPDATE SET
            season_id = excluded.season_id,
            home_team_id = excluded.home_team_id,
            away_team_id = excluded.away_team_id,
            match_date = excluded.match_date,
            status = excluded.status,
            home_score = excluded.home_score,
            away_score = excluded.away_score,
            home_penalty_score = excluded.home_penalty_score,
            away_penalty_score = excluded.away_penalty_score,
            updated_at = excluded.updated_at
        "#,
        params![
            m.id,
            m.season_id,
            m.home_team_id,
            m.away_team_id,
            m.match_date,
            m.status.as_str(),
            m.home_score,
            m.away_score,
            m.home_penalty_score,
            m.away_penalty_score,
            Utc::now().to_rfc3339(),
        ],
    )
    .with_context(|| format!("upsert match {}", m.id))?;
    Ok(())
}

pub fn upsert_player_match_stat(conn: &Connection, s: &PlayerMatchStat) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO player_match_stats (
            id, match_id, player_id, team_id, goals, assists, yellow_cards, red_cards,
            minutes_played, saves, position, goals_conceded
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(id) DO UPDATE SET
            match_id = excluded.match_id,
            player_id = excluded.player_id,
            team_id = excluded.team_id,
            goals = excluded.goals,
            assists = excluded.assists,
            yellow_cards = excluded.yellow_cards,
            red_cards = excluded.red_cards,
            minutes_played = excluded.minutes_played,
            saves = excluded.saves,
            position = excluded.position,
            goals_conceded = excluded.goals_conceded
        "#,
        params![
            s.id,
            s.match_id,
            s.player_id,
            s.team_id,
            s.goals,
            s.assists,
            s.yellow_cards,
            s.red_cards,
            s.minutes_played,
            s.saves,
            s.position,
            s.goals_conceded,
        ],
    )
    .with_context(|| format!("upsert player match stat {}", s.id))?;
    Ok(())
}
