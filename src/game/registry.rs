//! Registry of live rooms: the single in-memory source of truth for
//! gameplay. A room exists here from creation until the instant a match
//! winner is determined (or a stale private lobby is pruned).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::{distributions::Alphanumeric, Rng};
use time::OffsetDateTime;
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::game::state::{MatchState, PlayerSlot};
use crate::game::GameMode;

#[derive(Debug)]
pub enum Phase {
    /// Private lobby: host alone, waiting for a joiner.
    Waiting { host: PlayerSlot },
    Active(MatchState),
}

#[derive(Debug)]
pub struct Room {
    pub code: String,
    pub session_id: Option<Uuid>,
    pub mode: GameMode,
    pub is_private: bool,
    pub host: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub phase: Phase,
    /// Handle of the scheduled round-advance task, if one is pending.
    pub pending_advance: Option<AbortHandle>,
}

impl Room {
    pub fn matched(code: String, session_id: Uuid, mode: GameMode, state: MatchState) -> Self {
        Self {
            code,
            session_id: Some(session_id),
            mode,
            is_private: false,
            host: None,
            created_at: OffsetDateTime::now_utc(),
            phase: Phase::Active(state),
            pending_advance: None,
        }
    }

    pub fn private_lobby(code: String, host: PlayerSlot) -> Self {
        let host_id = host.id;
        Self {
            code,
            session_id: None,
            mode: GameMode::Casual,
            is_private: true,
            host: Some(host_id),
            created_at: OffsetDateTime::now_utc(),
            phase: Phase::Waiting { host },
            pending_advance: None,
        }
    }
}

#[derive(Default)]
pub struct MatchRegistry {
    rooms: DashMap<String, Arc<Mutex<Room>>>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a short shareable room code, unique among live rooms.
    pub fn fresh_code(&self) -> String {
        loop {
            let code: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(6)
                .map(|c| (c as char).to_ascii_uppercase())
                .collect();
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }

    pub fn insert(&self, room: Room) -> Arc<Mutex<Room>> {
        let code = room.code.clone();
        let handle = Arc::new(Mutex::new(room));
        self.rooms.insert(code, handle.clone());
        handle
    }

    pub fn get(&self, code: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms.get(code).map(|r| r.clone())
    }

    /// Remove the room from the registry. Does not lock the room, so it is
    /// safe to call while holding its mutex; the caller is responsible for
    /// aborting any pending advance task it finds there.
    pub fn remove(&self, code: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms.remove(code).map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Drop private lobbies that never got a second player. Active matches
    /// are never pruned. Room locks are taken outside the map iteration so
    /// this never holds a shard lock and a room lock at the same time.
    pub fn prune_stale_lobbies(&self, max_age: Duration) -> usize {
        let cutoff = OffsetDateTime::now_utc() - max_age;
        let candidates: Vec<(String, Arc<Mutex<Room>>)> = self
            .rooms
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let mut removed = 0;
        for (code, room) in candidates {
            let stale = {
                let room = room.lock();
                matches!(room.phase, Phase::Waiting { .. }) && room.created_at < cutoff
            };
            if stale && self.rooms.remove(&code).is_some() {
                removed += 1;
            }
        }
        removed
    }
}
