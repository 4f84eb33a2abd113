//! Domain records: games and derived standings rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Status of a scheduled match. `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Scheduled,
    Finished,
    Cancelled,
    Postponed,
}

impl GameStatus {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: GameStatus) -> bool {
        use GameStatus::*;
        match self {
            Scheduled => matches!(next, Finished | Cancelled | Postponed),
            Postponed => matches!(next, Scheduled | Finished | Cancelled),
            Cancelled => matches!(next, Scheduled | Postponed),
            Finished => false,
        }
    }
}

/// Immutable record of a match between two clubs.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Game {
    #[builder(default = Uuid::new_v4())]
    pub game_id: Uuid,
    pub league_id: i64,
    pub season_id: i64,
    pub matchday: i32,
    pub date: DateTime<Utc>,
    pub home_club_id: i64,
    pub away_club_id: i64,
    #[builder(default, setter(strip_option))]
    pub home_goals: Option<i32>,
    #[builder(default, setter(strip_option))]
    pub away_goals: Option<i32>,
    #[builder(default = GameStatus::Scheduled)]
    pub status: GameStatus,
}

impl Game {
    /// A finished game has both clubs distinct and both goal counts present.
    pub fn is_valid(&self) -> bool {
        if self.home_club_id == self.away_club_id {
            return false;
        }
        if self.status == GameStatus::Finished {
            return self.home_goals.is_some() && self.away_goals.is_some();
        }
        true
    }

    /// Goals for/against from `club_id`'s perspective, if it played in this game
    /// and the game is finished.
    pub fn perspective(&self, club_id: i64) -> Option<(i32, i32)> {
        if self.status != GameStatus::Finished {
            return None;
        }
        let (hg, ag) = (self.home_goals?, self.away_goals?);
        if self.home_club_id == club_id {
            Some((hg, ag))
        } else if self.away_club_id == club_id {
            Some((ag, hg))
        } else {
            None
        }
    }

    pub fn participants(&self) -> [i64; 2] {
        [self.home_club_id, self.away_club_id]
    }
}

/// Where a `TableEntry` was written from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSource {
    Automatic,
    Manual,
    Imported,
}

/// A derived standings row for one club in one league-season.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct TableEntry {
    pub league_id: i64,
    pub season_id: i64,
    pub club_id: i64,
    pub club_name: String,
    #[builder(default = 0)]
    pub rank: i32,
    #[builder(default = 0)]
    pub played: i32,
    #[builder(default = 0)]
    pub wins: i32,
    #[builder(default = 0)]
    pub draws: i32,
    #[builder(default = 0)]
    pub losses: i32,
    #[builder(default = 0)]
    pub goals_for: i32,
    #[builder(default = 0)]
    pub goals_against: i32,
    #[builder(default = Utc::now())]
    pub last_updated: DateTime<Utc>,
    #[builder(default = true)]
    pub auto_calculated: bool,
    #[builder(default = TableSource::Automatic)]
    pub source: TableSource,
}

impl TableEntry {
    pub fn goal_difference(&self) -> i32 {
        self.goals_for - self.goals_against
    }

    pub fn points(&self) -> i32 {
        3 * self.wins + self.draws
    }

    /// Zeroed row for a club with no recorded results yet.
    pub fn zeroed(league_id: i64, season_id: i64, club_id: i64, club_name: impl Into<String>) -> Self {
        Self::builder()
            .league_id(league_id)
            .season_id(season_id)
            .club_id(club_id)
            .club_name(club_name)
            .build()
    }

    /// Fold one game's perspective into this entry's running totals.
    pub fn record_result(&mut self, goals_for: i32, goals_against: i32) {
        self.played += 1;
        if goals_for > goals_against {
            self.wins += 1;
        } else if goals_for == goals_against {
            self.draws += 1;
        } else {
            self.losses += 1;
        }
        self.goals_for += goals_for;
        self.goals_against += goals_against;
        self.last_updated = Utc::now();
    }

    fn sort_key(&self) -> (i32, i32, i32, std::cmp::Reverse<&str>) {
        (
            self.points(),
            self.goal_difference(),
            self.goals_for,
            std::cmp::Reverse(self.club_name.as_str()),
        )
    }
}

impl PartialEq for TableEntry {
    fn eq(&self, other: &Self) -> bool {
        self.league_id == other.league_id
            && self.season_id == other.season_id
            && self.club_id == other.club_id
    }
}
impl Eq for TableEntry {}

/// Total order: points desc, goal difference desc, goals-for desc, club name asc.
/// A "greater" entry under this order ranks *higher* in the table.
impl PartialOrd for TableEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TableEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Sort entries into table order and assign a dense 1..N rank.
pub fn rank_entries(mut entries: Vec<TableEntry>) -> Vec<TableEntry> {
    entries.sort_by(|a, b| b.cmp(a));
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = (i + 1) as i32;
    }
    entries
}
