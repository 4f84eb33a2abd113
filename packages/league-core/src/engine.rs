//! Calculation Engine: derives an ordered standings table from a game log.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::cache::Cache;
use crate::models::{rank_entries, TableEntry};
use crate::repository::Repository;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("calculation_error: data_inconsistency: {0}")]
    DataInconsistency(String),
    #[error("database_error: {0}")]
    Database(String),
}

/// Pure-ish deterministic standings computation for one league-season.
///
/// Depends only on the capability set expressed by [`Repository`]: read
/// finished games, upsert entries, and run a body inside one transaction.
pub struct Engine {
    repository: Arc<dyn Repository>,
    cache: Option<Arc<Cache>>,
}

impl Engine {
    pub fn new(repository: Arc<dyn Repository>, cache: Option<Arc<Cache>>) -> Self {
        Self { repository, cache }
    }

    /// Run the full algorithm for `(league_id, season_id)`: discover teams,
    /// aggregate finished games, rank, and persist inside one transaction.
    pub async fn calculate(&self, league_id: i64, season_id: i64) -> anyhow::Result<Vec<TableEntry>> {
        let repository = Arc::clone(&self.repository);
        let result = repository
            .in_transaction(move |txn| {
                let cache = self.cache.clone();
                async move { run_calculation(txn.as_ref(), league_id, season_id, cache.as_deref()).await }
            })
            .await?;
        Ok(result)
    }
}

async fn run_calculation(
    repository: &dyn Repository,
    league_id: i64,
    season_id: i64,
    cache: Option<&Cache>,
) -> anyhow::Result<Vec<TableEntry>> {
    let games = repository.read_finished_games(league_id, season_id).await?;

    let mut participants = BTreeSet::new();
    for game in &games {
        if game.home_club_id == game.away_club_id {
            return Err(EngineError::DataInconsistency(format!(
                "game {} has identical home and away club {}",
                game.game_id, game.home_club_id
            ))
            .into());
        }
        for club in game.participants() {
            participants.insert(club);
        }
    }
    debug!(league_id, season_id, teams = participants.len(), "discovered participants");

    let existing = repository.read_entries(league_id, season_id).await?;
    let mut by_club: HashMap<i64, TableEntry> = existing
        .into_iter()
        .map(|entry| (entry.club_id, entry))
        .collect();

    for club_id in &participants {
        by_club.entry(*club_id).or_insert_with(|| {
            let name = existing_name_hint(*club_id);
            TableEntry::zeroed(league_id, season_id, *club_id, name)
        });
    }

    for entry in by_club.values_mut() {
        if let Some(name) = repository.club_name(entry.club_id).await? {
            entry.club_name = name;
        }
        entry.played = 0;
        entry.wins = 0;
        entry.draws = 0;
        entry.losses = 0;
        entry.goals_for = 0;
        entry.goals_against = 0;
    }

    for game in &games {
        for club_id in game.participants() {
            if let Some((gf, ga)) = game.perspective(club_id) {
                if let Some(entry) = by_club.get_mut(&club_id) {
                    entry.record_result(gf, ga);
                }
            }
        }
    }

    let ranked = rank_entries(by_club.into_values().collect());

    repository
        .upsert_entries(league_id, season_id, ranked.clone())
        .await
        .map_err(|e| EngineError::Database(e.to_string()))?;

    if let Some(cache) = cache {
        cache.invalidate_pattern(&format!("table:{league_id}:{season_id}:*"));
        cache.invalidate_pattern(&format!("team_stats:*:liga:{league_id}:saison:{season_id}"));
    }

    info!(league_id, season_id, entries = ranked.len(), "calculation committed");
    Ok(ranked)
}

fn existing_name_hint(club_id: i64) -> String {
    format!("Club {club_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Game, GameStatus};
    use crate::repository::InMemoryRepository;
    use chrono::Utc;

    fn finished(league: i64, season: i64, home: i64, away: i64, hg: i32, ag: i32) -> Game {
        Game::builder()
            .league_id(league)
            .season_id(season)
            .matchday(1)
            .date(Utc::now())
            .home_club_id(home)
            .away_club_id(away)
            .home_goals(hg)
            .away_goals(ag)
            .status(GameStatus::Finished)
            .build()
    }

    #[tokio::test]
    async fn single_finished_game_produces_ranked_two_team_table() {
        let repo = InMemoryRepository::new();
        repo.set_club_name(1, "Heimverein").await;
        repo.set_club_name(2, "Gastverein").await;
        repo.insert_game(finished(1, 1, 1, 2, 3, 1)).await;

        let engine = Engine::new(Arc::new(repo), None);
        let table = engine.calculate(1, 1).await.unwrap();

        assert_eq!(table.len(), 2);
        let home = table.iter().find(|e| e.club_id == 1).unwrap();
        let away = table.iter().find(|e| e.club_id == 2).unwrap();
        assert_eq!((home.played, home.wins, home.draws, home.losses), (1, 1, 0, 0));
        assert_eq!((home.goals_for, home.goals_against, home.goal_difference()), (3, 1, 2));
        assert_eq!(home.points(), 3);
        assert_eq!(home.rank, 1);
        assert_eq!((away.played, away.wins, away.draws, away.losses), (1, 0, 0, 1));
        assert_eq!(away.points(), 0);
        assert_eq!(away.rank, 2);
    }

    #[tokio::test]
    async fn equal_points_broken_by_goal_difference_then_goals_for() {
        let repo = InMemoryRepository::new();
        repo.set_club_name(1, "A").await;
        repo.set_club_name(2, "B").await;
        repo.set_club_name(3, "C").await;
        repo.insert_game(finished(1, 1, 1, 2, 2, 1)).await;
        repo.insert_game(finished(1, 1, 2, 1, 1, 1)).await;
        repo.insert_game(finished(1, 1, 1, 3, 0, 0)).await;
        repo.insert_game(finished(1, 1, 3, 1, 3, 0)).await;

        let engine = Engine::new(Arc::new(repo), None);
        let table = engine.calculate(1, 1).await.unwrap();
        let names: Vec<&str> = table.iter().map(|e| e.club_name.as_str()).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }

    #[tokio::test]
    async fn only_finished_games_count() {
        let repo = InMemoryRepository::new();
        repo.insert_game(finished(1, 1, 1, 2, 3, 1)).await;
        let mut scheduled = finished(1, 1, 1, 3, 0, 0);
        scheduled.status = GameStatus::Scheduled;
        repo.insert_game(scheduled).await;

        let engine = Engine::new(Arc::new(repo), None);
        let table = engine.calculate(1, 1).await.unwrap();
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn ranking_is_a_dense_permutation() {
        let repo = InMemoryRepository::new();
        repo.insert_game(finished(1, 1, 1, 2, 1, 0)).await;
        repo.insert_game(finished(1, 1, 3, 4, 2, 2)).await;
        repo.insert_game(finished(1, 1, 1, 3, 0, 1)).await;

        let engine = Engine::new(Arc::new(repo), None);
        let table = engine.calculate(1, 1).await.unwrap();
        let mut ranks: Vec<i32> = table.iter().map(|e| e.rank).collect();
        ranks.sort_unstable();
        assert_eq!(ranks, (1..=4).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn recalculation_overwrites_stale_aggregates() {
        let repo = InMemoryRepository::new();
        repo.insert_game(finished(1, 1, 1, 2, 3, 2)).await;
        let engine = Engine::new(Arc::new(repo.clone()), None);
        let first = engine.calculate(1, 1).await.unwrap();
        let home_first = first.iter().find(|e| e.club_id == 1).unwrap();
        assert_eq!(home_first.goals_for, 3);

        let corrected = finished(1, 1, 1, 2, 1, 2);
        let mut corrected = corrected;
        corrected.game_id = repo.read_finished_games(1, 1).await.unwrap()[0].game_id;
        repo.replace_game(corrected).await;

        let second = engine.calculate(1, 1).await.unwrap();
        let home_second = second.iter().find(|e| e.club_id == 1).unwrap();
        assert_eq!(home_second.goals_for, 1);
        assert_eq!(home_second.losses, 1);
    }
}
