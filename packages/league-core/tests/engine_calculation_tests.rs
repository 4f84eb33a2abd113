//! End-to-end tests for the Calculation Engine against the public API.

use std::sync::Arc;

use chrono::Utc;
use league_core::engine::Engine;
use league_core::{Game, GameStatus, InMemoryRepository, Repository};

fn finished_game(league: i64, season: i64, home: i64, away: i64, hg: i32, ag: i32) -> Game {
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
async fn two_clubs_one_game_produces_the_expected_table() {
    let repo = InMemoryRepository::new();
    repo.set_club_name(1, "Heimverein").await;
    repo.set_club_name(2, "Gastverein").await;
    repo.insert_game(finished_game(1, 1, 1, 2, 3, 1)).await;

    let repo: Arc<dyn Repository> = Arc::new(repo);
    let engine = Engine::new(repo, None);
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
async fn equal_points_are_broken_by_goal_difference_then_goals_for() {
    let repo = InMemoryRepository::new();
    repo.set_club_name(1, "A").await;
    repo.set_club_name(2, "B").await;
    repo.set_club_name(3, "C").await;
    repo.insert_game(finished_game(1, 1, 1, 2, 2, 1)).await; // A vs B 2:1
    repo.insert_game(finished_game(1, 1, 2, 1, 1, 1)).await; // B vs A 1:1
    repo.insert_game(finished_game(1, 1, 1, 3, 0, 0)).await; // A vs C 0:0
    repo.insert_game(finished_game(1, 1, 3, 1, 3, 0)).await; // C vs A 3:0

    let repo: Arc<dyn Repository> = Arc::new(repo);
    let engine = Engine::new(repo, None);
    let table = engine.calculate(1, 1).await.unwrap();

    let names: Vec<&str> = table.iter().map(|e| e.club_name.as_str()).collect();
    assert_eq!(names, vec!["C", "A", "B"]);
}
