//! Persistence seam: the `DataStore` trait and its in-memory implementation.
//!
//! Gameplay decisions never depend on the store; handlers decide in memory
//! first and call the store afterwards to record outcomes. The engine is
//! generic over `DataStore` so tests can substitute failing or instrumented
//! stores.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::game::GameMode;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("profile not found: {0}")]
    ProfileNotFound(Uuid),
    #[error("session not found: {0}")]
    SessionNotFound(Uuid),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// Public profile snapshot, as shown to opponents and carried in rooms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub level: u32,
    pub xp: u64,
    pub gems: u64,
    pub wins: u32,
    pub losses: u32,
    pub total_games: u32,
    pub status: PresenceStatus,
    pub equipped_hat: String,
    pub equipped_color: String,
}

impl Profile {
    fn fresh(id: Uuid, username: &str) -> Self {
        Self {
            id,
            username: username.to_string(),
            display_name: username.to_string(),
            level: 1,
            xp: 0,
            gems: 0,
            wins: 0,
            losses: 0,
            total_games: 0,
            status: PresenceStatus::Offline,
            equipped_hat: "none".to_string(),
            equipped_color: "white".to_string(),
        }
    }
}

/// Stat delta applied to a profile when a match resolves.
#[derive(Debug, Clone, Copy)]
pub struct Award {
    pub xp: u64,
    pub gems: u64,
    pub won: bool,
}

#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub user_id: Uuid,
    pub mode: GameMode,
    pub rating: u64,
    pub joined_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Finished,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: Uuid,
    pub player1: Uuid,
    pub player2: Uuid,
    pub room_code: String,
    pub mode: GameMode,
    pub status: SessionStatus,
    pub winner: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub finished_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    Won,
    Lost,
}

#[derive(Debug, Clone)]
pub struct RoundRecord {
    pub session_id: Uuid,
    pub round_number: u32,
    pub word: String,
    pub category: String,
    pub guesser: Uuid,
    pub setter: Uuid,
    pub guessed_letters: Vec<char>,
    pub wrong_guesses: u8,
    pub outcome: Option<RoundOutcome>,
    pub completed_at: Option<OffsetDateTime>,
}

/// The persistence operations the match engine needs.
///
/// Declared with explicit `impl Future + Send` returns so generic callers can
/// spawn work that awaits these methods.
pub trait DataStore: Clone + Send + Sync + 'static {
    /// Fetch a profile, creating a default one on first sight of the user.
    fn ensure_profile(
        &self,
        user: Uuid,
        username: &str,
    ) -> impl Future<Output = Result<Profile, StoreError>> + Send;

    fn fetch_profile(
        &self,
        user: Uuid,
    ) -> impl Future<Output = Result<Profile, StoreError>> + Send;

    fn update_status(
        &self,
        user: Uuid,
        status: PresenceStatus,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Top profiles by XP.
    fn leaderboard(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Profile>, StoreError>> + Send;

    /// Apply a match award: XP, gems and win/loss/game counters.
    fn grant_award(
        &self,
        user: Uuid,
        award: Award,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Upsert a queue entry, replacing any prior entry for the user.
    fn upsert_queue(
        &self,
        entry: QueueEntry,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Atomically pair `user` with the oldest waiting entry of the same mode
    /// and a different user. On success both entries are removed and the
    /// opponent's entry is returned; otherwise the requester stays queued.
    fn claim_opponent(
        &self,
        user: Uuid,
        mode: GameMode,
    ) -> impl Future<Output = Result<Option<QueueEntry>, StoreError>> + Send;

    /// Remove the user's queue entry, if any.
    fn remove_queue(&self, user: Uuid) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn queue_len(&self) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Drop entries older than `max_age`; returns how many were removed.
    fn sweep_stale_queue(
        &self,
        max_age: Duration,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    fn create_session(
        &self,
        player1: Uuid,
        player2: Uuid,
        room_code: &str,
        mode: GameMode,
    ) -> impl Future<Output = Result<Uuid, StoreError>> + Send;

    fn finish_session(
        &self,
        session: Uuid,
        winner: Uuid,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn insert_round(
        &self,
        record: RoundRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn complete_round(
        &self,
        session: Uuid,
        round_number: u32,
        guessed_letters: Vec<char>,
        wrong_guesses: u8,
        outcome: RoundOutcome,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// DashMap-backed store. The queue sits behind a single mutex so pairing
/// claims are atomic with respect to each other.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    profiles: DashMap<Uuid, Profile>,
    queue: Mutex<HashMap<Uuid, QueueEntry>>,
    sessions: DashMap<Uuid, SessionRecord>,
    rounds: Mutex<Vec<RoundRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/inspection helper: all round records for a session, in insert order.
    pub fn rounds_for(&self, session: Uuid) -> Vec<RoundRecord> {
        self.inner
            .rounds
            .lock()
            .iter()
            .filter(|r| r.session_id == session)
            .cloned()
            .collect()
    }

    pub fn session(&self, id: Uuid) -> Option<SessionRecord> {
        self.inner.sessions.get(&id).map(|s| s.clone())
    }
}

impl DataStore for MemoryStore {
    async fn ensure_profile(&self, user: Uuid, username: &str) -> Result<Profile, StoreError> {
        Ok(self
            .inner
            .profiles
            .entry(user)
            .or_insert_with(|| Profile::fresh(user, username))
            .clone())
    }

    async fn fetch_profile(&self, user: Uuid) -> Result<Profile, StoreError> {
        self.inner
            .profiles
            .get(&user)
            .map(|p| p.clone())
            .ok_or(StoreError::ProfileNotFound(user))
    }

    async fn update_status(&self, user: Uuid, status: PresenceStatus) -> Result<(), StoreError> {
        let mut profile = self
            .inner
            .profiles
            .get_mut(&user)
            .ok_or(StoreError::ProfileNotFound(user))?;
        profile.status = status;
        Ok(())
    }

    async fn leaderboard(&self, limit: usize) -> Result<Vec<Profile>, StoreError> {
        let mut all: Vec<Profile> = self.inner.profiles.iter().map(|p| p.clone()).collect();
        all.sort_by(|a, b| b.xp.cmp(&a.xp));
        all.truncate(limit);
        Ok(all)
    }

    async fn grant_award(&self, user: Uuid, award: Award) -> Result<(), StoreError> {
        let mut profile = self
            .inner
            .profiles
            .get_mut(&user)
            .ok_or(StoreError::ProfileNotFound(user))?;
        profile.xp += award.xp;
        profile.gems += award.gems;
        profile.total_games += 1;
        if award.won {
            profile.wins += 1;
        } else {
            profile.losses += 1;
        }
        profile.level = 1 + (profile.xp / 500) as u32;
        Ok(())
    }

    async fn upsert_queue(&self, entry: QueueEntry) -> Result<(), StoreError> {
        self.inner.queue.lock().insert(entry.user_id, entry);
        Ok(())
    }

    async fn claim_opponent(
        &self,
        user: Uuid,
        mode: GameMode,
    ) -> Result<Option<QueueEntry>, StoreError> {
        let mut queue = self.inner.queue.lock();
        let opponent_id = queue
            .values()
            .filter(|e| e.mode == mode && e.user_id != user)
            .min_by_key(|e| e.joined_at)
            .map(|e| e.user_id);
        Ok(opponent_id.map(|id| {
            queue.remove(&user);
            queue.remove(&id).expect("opponent entry present under lock")
        }))
    }

    async fn remove_queue(&self, user: Uuid) -> Result<(), StoreError> {
        self.inner.queue.lock().remove(&user);
        Ok(())
    }

    async fn queue_len(&self) -> Result<usize, StoreError> {
        Ok(self.inner.queue.lock().len())
    }

    async fn sweep_stale_queue(&self, max_age: Duration) -> Result<usize, StoreError> {
        let cutoff = OffsetDateTime::now_utc() - max_age;
        let mut queue = self.inner.queue.lock();
        let before = queue.len();
        queue.retain(|_, e| e.joined_at >= cutoff);
        Ok(before - queue.len())
    }

    async fn create_session(
        &self,
        player1: Uuid,
        player2: Uuid,
        room_code: &str,
        mode: GameMode,
    ) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        self.inner.sessions.insert(
            id,
            SessionRecord {
                id,
                player1,
                player2,
                room_code: room_code.to_string(),
                mode,
                status: SessionStatus::Active,
                winner: None,
                created_at: OffsetDateTime::now_utc(),
                finished_at: None,
            },
        );
        Ok(id)
    }

    async fn finish_session(&self, session: Uuid, winner: Uuid) -> Result<(), StoreError> {
        let mut record = self
            .inner
            .sessions
            .get_mut(&session)
            .ok_or(StoreError::SessionNotFound(session))?;
        record.status = SessionStatus::Finished;
        record.winner = Some(winner);
        record.finished_at = Some(OffsetDateTime::now_utc());
        Ok(())
    }

    async fn insert_round(&self, record: RoundRecord) -> Result<(), StoreError> {
        self.inner.rounds.lock().push(record);
        Ok(())
    }

    async fn complete_round(
        &self,
        session: Uuid,
        round_number: u32,
        guessed_letters: Vec<char>,
        wrong_guesses: u8,
        outcome: RoundOutcome,
    ) -> Result<(), StoreError> {
        let mut rounds = self.inner.rounds.lock();
        let record = rounds
            .iter_mut()
            .find(|r| r.session_id == session && r.round_number == round_number)
            .ok_or(StoreError::SessionNotFound(session))?;
        record.guessed_letters = guessed_letters;
        record.wrong_guesses = wrong_guesses;
        record.outcome = Some(outcome);
        record.completed_at = Some(OffsetDateTime::now_utc());
        Ok(())
    }
}
