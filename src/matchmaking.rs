//! Matchmaking queue coordination: join/leave and the pairing path.
//!
//! Pairing is asymmetric on purpose: the player whose join completes the
//! pair always guesses round 1, and the player who was already waiting sets
//! the first word. That keeps the assignment reproducible without a coin
//! flip.

use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::game::engine::Engine;
use crate::game::registry::Room;
use crate::game::state::{MatchState, PlayerSlot};
use crate::game::GameMode;
use crate::store::{DataStore, Profile, QueueEntry, RoundRecord};
use crate::ws::protocol::{QueuePhase, Role, ServerEvent};

/// Queue entries older than this are considered abandoned.
pub const QUEUE_ENTRY_MAX_AGE: std::time::Duration = std::time::Duration::from_secs(5 * 60);

impl<S: DataStore> Engine<S> {
    /// Join the matchmaking queue and immediately try to pair. Re-joining
    /// replaces the prior entry.
    pub async fn join_queue(&self, user: Uuid, mode: GameMode) {
        let profile = match self.store().fetch_profile(user).await {
            Ok(p) => p,
            Err(err) => {
                warn!(%user, %err, "failed to load profile for queue join");
                self.presence()
                    .send_to(user, ServerEvent::Error { message: "Profile unavailable".into() });
                return;
            }
        };

        let entry = QueueEntry {
            user_id: user,
            mode,
            rating: profile.xp,
            joined_at: OffsetDateTime::now_utc(),
        };
        if let Err(err) = self.store().upsert_queue(entry).await {
            warn!(%user, %err, "failed to enqueue for matchmaking");
            self.presence()
                .send_to(user, ServerEvent::Error { message: "Matchmaking unavailable".into() });
            return;
        }
        self.presence()
            .send_to(user, ServerEvent::QueueStatus { status: QueuePhase::Searching });

        match self.store().claim_opponent(user, mode).await {
            Ok(Some(opponent)) => self.pair_players(user, profile, opponent, mode).await,
            Ok(None) => {}
            Err(err) => warn!(%user, %err, "pairing attempt failed"),
        }
    }

    /// Remove the user's queue entry; a no-op if absent.
    pub async fn leave_queue(&self, user: Uuid) {
        if let Err(err) = self.store().remove_queue(user).await {
            warn!(%user, %err, "failed to leave queue");
        }
        self.presence()
            .send_to(user, ServerEvent::QueueStatus { status: QueuePhase::Idle });
    }

    /// Both queue entries are already claimed. Create the session and the
    /// room; the requester guesses first, the waiting opponent sets the word.
    async fn pair_players(
        &self,
        requester: Uuid,
        requester_profile: Profile,
        opponent: QueueEntry,
        mode: GameMode,
    ) {
        let opponent_profile = match self.store().fetch_profile(opponent.user_id).await {
            Ok(p) => p,
            Err(err) => {
                warn!(opponent = %opponent.user_id, %err, "paired opponent has no profile");
                self.restore_queue_pair(requester, &requester_profile, opponent, mode).await;
                return;
            }
        };

        let room_code = self.registry().fresh_code();
        let session = match self
            .store()
            .create_session(requester, opponent.user_id, &room_code, mode)
            .await
        {
            Ok(id) => id,
            Err(err) => {
                // Critical write failed: put both entries back and tell both
                // players, rather than leaving them matched with no session.
                warn!(room = %room_code, %err, "failed to create matchmade session");
                let opponent_id = opponent.user_id;
                self.restore_queue_pair(requester, &requester_profile, opponent, mode).await;
                let event = ServerEvent::RoomError { message: "Could not start match".into() };
                self.presence().send_to(requester, event.clone());
                self.presence().send_to(opponent_id, event);
                return;
            }
        };

        let draw = self.words().pick(&mut rand::thread_rng());
        let state = MatchState::new(
            PlayerSlot::new(requester_profile.clone()),
            PlayerSlot::new(opponent_profile.clone()),
            draw.clone(),
        );
        self.registry()
            .insert(Room::matched(room_code.clone(), session, mode, state));
        info!(room = %room_code, %requester, opponent = %opponent.user_id, "match found");

        // Targeted announcements: each player learns their own role, and the
        // payload never carries the word. If the opponent's connection is
        // already gone, delivery is simply skipped; the match stands.
        self.presence().send_to(
            requester,
            ServerEvent::MatchFound {
                room_code: room_code.clone(),
                session_id: session,
                opponent: opponent_profile,
                your_role: Role::Guesser,
                round: 1,
                category: draw.category.clone(),
                word_length: draw.word.len(),
                guesser: requester,
            },
        );
        self.presence().send_to(
            opponent.user_id,
            ServerEvent::MatchFound {
                room_code: room_code.clone(),
                session_id: session,
                opponent: requester_profile,
                your_role: Role::Setter,
                round: 1,
                category: draw.category.clone(),
                word_length: draw.word.len(),
                guesser: requester,
            },
        );
        self.presence().send_to(
            opponent.user_id,
            ServerEvent::RoundWord { word: draw.word.clone(), category: draw.category.clone() },
        );

        if let Err(err) = self
            .store()
            .insert_round(RoundRecord {
                session_id: session,
                round_number: 1,
                word: draw.word,
                category: draw.category,
                guesser: requester,
                setter: opponent.user_id,
                guessed_letters: Vec::new(),
                wrong_guesses: 0,
                outcome: None,
                completed_at: None,
            })
            .await
        {
            warn!(%session, %err, "failed to record opening round");
        }
    }

    async fn restore_queue_pair(
        &self,
        requester: Uuid,
        requester_profile: &Profile,
        opponent: QueueEntry,
        mode: GameMode,
    ) {
        // The opponent keeps their original timestamp and thus their place
        // in line; the requester re-enters at the back.
        if let Err(err) = self.store().upsert_queue(opponent).await {
            warn!(%err, "failed to restore opponent queue entry");
        }
        if let Err(err) = self
            .store()
            .upsert_queue(QueueEntry {
                user_id: requester,
                mode,
                rating: requester_profile.xp,
                joined_at: OffsetDateTime::now_utc(),
            })
            .await
        {
            warn!(%err, "failed to restore requester queue entry");
        }
    }
}
