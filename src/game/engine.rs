//! Match engine: turns in-memory decisions into messages and persistence.
//!
//! Every handler follows the same shape: lock the room, make the state
//! transition synchronously, release the lock, then deliver messages and
//! record the outcome in the store. The store never gates a legality check,
//! so two near-simultaneous events cannot both close the same round.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::game::registry::{MatchRegistry, Phase, Room};
use crate::game::state::{GuessOutcome, MatchState, PlayerSlot, RoundStart, RoundSummary};
use crate::game::GameMode;
use crate::presence::Presence;
use crate::rewards;
use crate::store::{DataStore, PresenceStatus, RoundRecord};
use crate::words::WordBank;
use crate::ws::protocol::ServerEvent;

/// Pause between a round ending and the next one starting, so players see
/// the round-end banner.
pub const ROUND_ADVANCE_DELAY: Duration = Duration::from_millis(3000);
/// Chat messages are cut to this many characters before broadcast.
pub const CHAT_MAX_CHARS: usize = 100;

pub struct Engine<S> {
    registry: Arc<MatchRegistry>,
    presence: Arc<Presence>,
    words: Arc<WordBank>,
    store: S,
}

impl<S: Clone> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            presence: self.presence.clone(),
            words: self.words.clone(),
            store: self.store.clone(),
        }
    }
}

enum GuessPlan {
    Continue {
        ids: [Uuid; 2],
        letter: char,
        correct: bool,
        guessed_letters: Vec<char>,
        wrong_guesses: u8,
    },
    RoundOver {
        ids: [Uuid; 2],
        summary: RoundSummary,
        session_id: Option<Uuid>,
    },
}

impl<S: DataStore> Engine<S> {
    pub fn new(
        registry: Arc<MatchRegistry>,
        presence: Arc<Presence>,
        words: Arc<WordBank>,
        store: S,
    ) -> Self {
        Self { registry, presence, words, store }
    }

    pub fn registry(&self) -> &MatchRegistry {
        &self.registry
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn words(&self) -> &WordBank {
        &self.words
    }

    fn broadcast(&self, ids: [Uuid; 2], event: ServerEvent) {
        for id in ids {
            self.presence.send_to(id, event.clone());
        }
    }

    // ---- connection lifecycle -------------------------------------------

    /// Register presence and mark the profile online. The status write is
    /// best-effort; a store failure never blocks the session.
    pub async fn on_connect(
        &self,
        user: Uuid,
        username: &str,
        tx: tokio::sync::mpsc::UnboundedSender<ServerEvent>,
    ) {
        self.presence.register(user, tx);
        if let Err(err) = self.store.ensure_profile(user, username).await {
            warn!(%user, %err, "failed to ensure profile on connect");
        }
        if let Err(err) = self.store.update_status(user, PresenceStatus::Online).await {
            warn!(%user, %err, "failed to mark user online");
        }
        info!(%user, "user connected");
    }

    /// Always runs when a connection ends, however it ended. The three
    /// cleanup actions are independent: a failure in one never skips the
    /// others.
    pub async fn on_disconnect(&self, user: Uuid) {
        self.presence.unregister(user);
        if let Err(err) = self.store.update_status(user, PresenceStatus::Offline).await {
            warn!(%user, %err, "failed to mark user offline");
        }
        if let Err(err) = self.store.remove_queue(user).await {
            warn!(%user, %err, "failed to clear queue entry on disconnect");
        }
        info!(%user, "user disconnected");
    }

    // ---- guessing -------------------------------------------------------

    /// Process a letter guess. Illegal guesses (unknown room, wrong caller,
    /// duplicate letter) are silent no-ops.
    pub async fn guess_letter(&self, user: Uuid, room_code: &str, letter: char) {
        let Some(room) = self.registry.get(room_code) else { return };

        let plan = {
            let mut room = room.lock();
            let session_id = room.session_id;
            let (plan, match_over) = {
                let Phase::Active(state) = &mut room.phase else { return };
                match state.apply_guess(user, letter) {
                    GuessOutcome::Rejected => return,
                    GuessOutcome::Continue { letter, correct } => (
                        GuessPlan::Continue {
                            ids: state.pair.ids(),
                            letter,
                            correct,
                            guessed_letters: state.board.guessed_letters(),
                            wrong_guesses: state.board.wrong_guesses,
                        },
                        false,
                    ),
                    GuessOutcome::RoundOver(summary) => {
                        let over = summary.match_winner.is_some();
                        (GuessPlan::RoundOver { ids: state.pair.ids(), summary, session_id }, over)
                    }
                }
            };
            if match_over {
                // The room leaves the registry the moment a match winner
                // exists, before anything is awaited.
                if let Some(handle) = room.pending_advance.take() {
                    handle.abort();
                }
                self.registry.remove(room_code);
            }
            plan
        };

        match plan {
            GuessPlan::Continue { ids, letter, correct, guessed_letters, wrong_guesses } => {
                self.broadcast(
                    ids,
                    ServerEvent::LetterGuessed {
                        letter,
                        is_correct: correct,
                        guessed_letters,
                        wrong_guesses,
                    },
                );
            }
            GuessPlan::RoundOver { ids, summary, session_id } => {
                self.finish_round(room_code, ids, summary, session_id).await;
            }
        }
    }

    async fn finish_round(
        &self,
        room_code: &str,
        ids: [Uuid; 2],
        summary: RoundSummary,
        session_id: Option<Uuid>,
    ) {
        self.broadcast(
            ids,
            ServerEvent::RoundEnd {
                winner: summary.winner,
                word: summary.word.clone(),
                scores: summary.scores.clone(),
                guessed_letters: summary.guessed_letters.clone(),
                wrong_guesses: summary.wrong_guesses,
            },
        );

        if let Some(session) = session_id {
            if let Err(err) = self
                .store
                .complete_round(
                    session,
                    summary.round,
                    summary.guessed_letters.clone(),
                    summary.wrong_guesses,
                    summary.outcome,
                )
                .await
            {
                warn!(%session, round = summary.round, %err, "failed to record round result");
            }
        }

        match summary.match_winner {
            Some(winner) => {
                let loser = if ids[0] == winner { ids[1] } else { ids[0] };
                if let Some(session) = session_id {
                    if let Err(err) = self.store.finish_session(session, winner).await {
                        warn!(%session, %err, "failed to record session result");
                    }
                }
                rewards::dispatch(self.store.clone(), winner, loser);
                self.broadcast(ids, ServerEvent::MatchEnd { winner, scores: summary.scores });
                info!(room = room_code, %winner, "match finished");
            }
            None => self.schedule_advance(room_code.to_string(), summary.round),
        }
    }

    /// Schedule the next round after the fixed banner delay. The handle is
    /// kept on the room so teardown can cancel it; a timer that fires anyway
    /// re-checks the room and round before touching anything.
    fn schedule_advance(&self, room_code: String, finished_round: u32) {
        let engine = self.clone();
        let code = room_code.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(ROUND_ADVANCE_DELAY).await;
            engine.advance_round(&code, finished_round).await;
        });
        if let Some(room) = self.registry.get(&room_code) {
            room.lock().pending_advance = Some(task.abort_handle());
        } else {
            task.abort();
        }
    }

    pub async fn advance_round(&self, room_code: &str, finished_round: u32) {
        // The room may have been torn down while the timer was pending.
        let Some(room) = self.registry.get(room_code) else { return };
        let draw = self.words.pick(&mut rand::thread_rng());

        let (start, ids, session_id): (RoundStart, [Uuid; 2], Option<Uuid>) = {
            let mut room = room.lock();
            room.pending_advance = None;
            let session_id = room.session_id;
            let Phase::Active(state) = &mut room.phase else { return };
            if state.round != finished_round {
                return;
            }
            (state.start_next_round(draw), state.pair.ids(), session_id)
        };

        // round_start goes out before the setter-only secret word.
        self.broadcast(
            ids,
            ServerEvent::RoundStart {
                round: start.round,
                category: start.category.clone(),
                guesser: start.guesser,
                word_length: start.word_length,
            },
        );
        self.presence.send_to(
            start.setter,
            ServerEvent::RoundWord { word: start.word.clone(), category: start.category.clone() },
        );

        if let Some(session) = session_id {
            if let Err(err) = self
                .store
                .insert_round(RoundRecord {
                    session_id: session,
                    round_number: start.round,
                    word: start.word,
                    category: start.category,
                    guesser: start.guesser,
                    setter: start.setter,
                    guessed_letters: Vec::new(),
                    wrong_guesses: 0,
                    outcome: None,
                    completed_at: None,
                })
                .await
            {
                warn!(%session, round = start.round, %err, "failed to record new round");
            }
        }
    }

    // ---- private rooms --------------------------------------------------

    pub async fn create_private_room(&self, user: Uuid) {
        let profile = match self.store.fetch_profile(user).await {
            Ok(p) => p,
            Err(err) => {
                warn!(%user, %err, "failed to load profile for private room");
                self.presence
                    .send_to(user, ServerEvent::RoomError { message: "Profile unavailable".into() });
                return;
            }
        };
        let code = self.registry.fresh_code();
        self.registry.insert(Room::private_lobby(code.clone(), PlayerSlot::new(profile)));
        info!(%user, room = %code, "private room created");
        self.presence.send_to(user, ServerEvent::PrivateRoomCreated { room_code: code });
    }

    pub async fn join_private_room(&self, user: Uuid, room_code: &str) {
        let not_found = || ServerEvent::RoomError {
            message: "Room not found or already started".into(),
        };
        let Some(room) = self.registry.get(room_code) else {
            self.presence.send_to(user, not_found());
            return;
        };

        // Validate before doing any external work.
        let host = {
            let room = room.lock();
            if !room.is_private {
                self.presence.send_to(user, not_found());
                return;
            }
            match &room.phase {
                Phase::Waiting { host } if host.id == user => {
                    self.presence.send_to(user, not_found());
                    return;
                }
                Phase::Waiting { host } => host.clone(),
                Phase::Active(_) => {
                    self.presence
                        .send_to(user, ServerEvent::RoomError { message: "Room is full".into() });
                    return;
                }
            }
        };

        let joiner = match self.store.fetch_profile(user).await {
            Ok(p) => p,
            Err(err) => {
                warn!(%user, %err, "failed to load joiner profile");
                self.presence
                    .send_to(user, ServerEvent::RoomError { message: "Profile unavailable".into() });
                return;
            }
        };

        // Session creation failure is surfaced: the lobby stays in waiting
        // and the joiner is told, instead of a match with no session behind it.
        let session = match self
            .store
            .create_session(host.id, user, room_code, GameMode::Casual)
            .await
        {
            Ok(id) => id,
            Err(err) => {
                warn!(room = room_code, %err, "failed to create private session");
                self.presence.send_to(
                    user,
                    ServerEvent::RoomError { message: "Could not start match".into() },
                );
                return;
            }
        };

        let draw = self.words.pick(&mut rand::thread_rng());
        let plan = {
            let mut room = room.lock();
            if !matches!(room.phase, Phase::Waiting { .. }) {
                // Another joiner won the race while we were persisting.
                self.presence
                    .send_to(user, ServerEvent::RoomError { message: "Room is full".into() });
                return;
            }
            // Host guesses round 1; the joiner sets the word.
            let state = MatchState::new(
                host.clone(),
                PlayerSlot::new(joiner.clone()),
                draw.clone(),
            );
            let players = state.pair.profiles();
            room.session_id = Some(session);
            room.phase = Phase::Active(state);
            (players, room.code.clone())
        };
        let (players, code) = plan;

        info!(room = %code, host = %host.id, joiner = %user, "private match starting");
        self.broadcast(
            [host.id, user],
            ServerEvent::PrivateMatchStart {
                room_code: code.clone(),
                players,
                category: draw.category.clone(),
                guesser: host.id,
                word_length: draw.word.len(),
            },
        );
        self.presence.send_to(
            user,
            ServerEvent::RoundWord { word: draw.word.clone(), category: draw.category.clone() },
        );

        if let Err(err) = self
            .store
            .insert_round(RoundRecord {
                session_id: session,
                round_number: 1,
                word: draw.word,
                category: draw.category,
                guesser: host.id,
                setter: user,
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

    // ---- social ---------------------------------------------------------

    /// Deliver an invite if the target is connected; otherwise drop it.
    pub async fn invite_friend(&self, from: Uuid, friend: Uuid, room_code: &str) {
        if !self.presence.is_online(friend) {
            return;
        }
        let username = match self.store.fetch_profile(from).await {
            Ok(p) => p.username,
            Err(err) => {
                warn!(user = %from, %err, "failed to load inviter profile");
                return;
            }
        };
        self.presence.send_to(
            friend,
            ServerEvent::GameInvite {
                from_user_id: from,
                from_username: username,
                room_code: room_code.to_string(),
            },
        );
    }

    /// Broadcast a chat line to the room, capped at `CHAT_MAX_CHARS`.
    pub fn send_chat(&self, user: Uuid, room_code: &str, message: &str) {
        let Some(room) = self.registry.get(room_code) else { return };
        let ids = {
            let room = room.lock();
            match &room.phase {
                Phase::Active(state) => state.pair.ids(),
                Phase::Waiting { host } => [host.id, host.id],
            }
        };
        let capped: String = message.chars().take(CHAT_MAX_CHARS).collect();
        let timestamp = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
        let event = ServerEvent::ChatMessage { user_id: user, message: capped, timestamp };
        self.presence.send_to(ids[0], event.clone());
        if ids[1] != ids[0] {
            self.presence.send_to(ids[1], event);
        }
    }
}
