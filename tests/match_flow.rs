//! End-to-end engine scenarios, driven through the same entry points the
//! socket layer uses. Players are simulated as presence channels.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use uuid::Uuid;

use lastlimb_server::game::engine::{Engine, ROUND_ADVANCE_DELAY};
use lastlimb_server::game::registry::MatchRegistry;
use lastlimb_server::game::GameMode;
use lastlimb_server::presence::Presence;
use lastlimb_server::store::{
    Award, DataStore, MemoryStore, PresenceStatus, Profile, QueueEntry, RoundOutcome, RoundRecord,
    SessionStatus, StoreError,
};
use lastlimb_server::words::{Category, WordBank};
use lastlimb_server::ws::protocol::{QueuePhase, Role, ServerEvent};

struct Harness {
    engine: Engine<MemoryStore>,
    store: MemoryStore,
}

fn harness() -> Harness {
    let store = MemoryStore::new();
    let engine = Engine::new(
        Arc::new(MatchRegistry::new()),
        Arc::new(Presence::new()),
        Arc::new(WordBank::default()),
        store.clone(),
    );
    Harness { engine, store }
}

async fn connect<S: DataStore>(engine: &Engine<S>, name: &str) -> (Uuid, UnboundedReceiver<ServerEvent>) {
    let user = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    engine.on_connect(user, name, tx).await;
    (user, rx)
}

fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn secret_word(events: &[ServerEvent]) -> Option<String> {
    events.iter().find_map(|e| match e {
        ServerEvent::RoundWord { word, .. } => Some(word.clone()),
        _ => None,
    })
}

/// Guess every distinct letter of `word`; the last one closes the round.
async fn solve_round<S: DataStore>(engine: &Engine<S>, guesser: Uuid, room: &str, word: &str) {
    let letters: BTreeSet<char> = word.chars().filter(|c| c.is_ascii_alphabetic()).collect();
    for letter in letters {
        engine.guess_letter(guesser, room, letter).await;
    }
}

#[tokio::test]
async fn queue_pairing_assigns_requester_as_guesser() {
    let h = harness();
    let (a, mut rx_a) = connect(&h.engine, "alice").await;
    let (b, mut rx_b) = connect(&h.engine, "bob").await;

    // A queues first and finds nobody.
    h.engine.join_queue(a, GameMode::Ranked).await;
    let events_a = drain(&mut rx_a);
    assert!(matches!(
        events_a.as_slice(),
        [ServerEvent::QueueStatus { status: QueuePhase::Searching }]
    ));

    // B completes the pair and therefore guesses first.
    h.engine.join_queue(b, GameMode::Ranked).await;
    let events_a = drain(&mut rx_a);
    let events_b = drain(&mut rx_b);

    let found_b = events_b
        .iter()
        .find_map(|e| match e {
            ServerEvent::MatchFound { your_role, guesser, opponent, room_code, .. } => {
                Some((*your_role, *guesser, opponent.id, room_code.clone()))
            }
            _ => None,
        })
        .expect("B receives match_found");
    assert_eq!(found_b.0, Role::Guesser);
    assert_eq!(found_b.1, b);
    assert_eq!(found_b.2, a);

    let found_a = events_a
        .iter()
        .find_map(|e| match e {
            ServerEvent::MatchFound { your_role, guesser, .. } => Some((*your_role, *guesser)),
            _ => None,
        })
        .expect("A receives match_found");
    assert_eq!(found_a, (Role::Setter, b));

    // The secret word went to the setter only.
    assert!(secret_word(&events_a).is_some());
    assert!(secret_word(&events_b).is_none());

    // Both queue entries are gone and the room is live.
    assert_eq!(h.store.queue_len().await.unwrap(), 0);
    assert_eq!(h.engine.registry().len(), 1);
    assert!(h.engine.registry().get(&found_b.3).is_some());
}

#[tokio::test]
async fn queue_entries_of_other_modes_do_not_pair() {
    let h = harness();
    let (a, mut rx_a) = connect(&h.engine, "alice").await;
    let (b, mut rx_b) = connect(&h.engine, "bob").await;

    h.engine.join_queue(a, GameMode::Ranked).await;
    h.engine.join_queue(b, GameMode::Casual).await;

    assert!(!drain(&mut rx_a).iter().any(|e| matches!(e, ServerEvent::MatchFound { .. })));
    assert!(!drain(&mut rx_b).iter().any(|e| matches!(e, ServerEvent::MatchFound { .. })));
    assert_eq!(h.store.queue_len().await.unwrap(), 2);

    h.engine.leave_queue(a).await;
    assert_eq!(h.store.queue_len().await.unwrap(), 1);
    assert!(matches!(
        drain(&mut rx_a).as_slice(),
        [ServerEvent::QueueStatus { status: QueuePhase::Idle }]
    ));
}

#[tokio::test]
async fn private_room_host_guesses_and_joiner_gets_the_word() {
    let h = harness();
    let (host, mut rx_host) = connect(&h.engine, "hana").await;
    let (joiner, mut rx_joiner) = connect(&h.engine, "jo").await;

    h.engine.create_private_room(host).await;
    let code = drain(&mut rx_host)
        .iter()
        .find_map(|e| match e {
            ServerEvent::PrivateRoomCreated { room_code } => Some(room_code.clone()),
            _ => None,
        })
        .expect("host receives the room code");

    h.engine.join_private_room(joiner, &code).await;
    let events_host = drain(&mut rx_host);
    let events_joiner = drain(&mut rx_joiner);

    for events in [&events_host, &events_joiner] {
        let start = events
            .iter()
            .find_map(|e| match e {
                ServerEvent::PrivateMatchStart { guesser, players, .. } => {
                    Some((*guesser, players.len()))
                }
                _ => None,
            })
            .expect("both players see the match start");
        assert_eq!(start, (host, 2));
    }

    // Word secrecy: setter (joiner) only.
    assert!(secret_word(&events_host).is_none());
    assert!(secret_word(&events_joiner).is_some());

    // A third player can no longer join.
    let (late, mut rx_late) = connect(&h.engine, "late").await;
    h.engine.join_private_room(late, &code).await;
    assert!(matches!(
        drain(&mut rx_late).as_slice(),
        [ServerEvent::RoomError { message }] if message == "Room is full"
    ));
}

#[tokio::test]
async fn joining_a_missing_or_started_room_reports_an_error() {
    let h = harness();
    let (user, mut rx) = connect(&h.engine, "uma").await;
    h.engine.join_private_room(user, "NOSUCH").await;
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [ServerEvent::RoomError { message }] if message == "Room not found or already started"
    ));
}

#[tokio::test(start_paused = true)]
async fn best_of_three_runs_to_match_end_and_rewards() {
    let h = harness();
    let (a, mut rx_a) = connect(&h.engine, "alice").await;
    let (b, mut rx_b) = connect(&h.engine, "bob").await;

    h.engine.join_queue(a, GameMode::Ranked).await;
    h.engine.join_queue(b, GameMode::Ranked).await;
    let events_a = drain(&mut rx_a);
    let events_b = drain(&mut rx_b);
    let room = events_b
        .iter()
        .find_map(|e| match e {
            ServerEvent::MatchFound { room_code, session_id, .. } => {
                Some((room_code.clone(), *session_id))
            }
            _ => None,
        })
        .unwrap();
    let (room_code, session) = room;

    // Round 1: B guesses the word A was shown. B leads 1-0.
    let word1 = secret_word(&events_a).unwrap();
    solve_round(&h.engine, b, &room_code, &word1).await;
    let round_end = drain(&mut rx_b)
        .into_iter()
        .find_map(|e| match e {
            ServerEvent::RoundEnd { winner, scores, .. } => Some((winner, scores)),
            _ => None,
        })
        .expect("round 1 ends");
    assert_eq!(round_end.0, b);
    assert_eq!(round_end.1[&b], 1);
    drain(&mut rx_a);

    // Timer advances to round 2; roles swap, so B now sets and A guesses.
    tokio::time::sleep(ROUND_ADVANCE_DELAY + Duration::from_millis(100)).await;
    let events_b = drain(&mut rx_b);
    let word2 = secret_word(&events_b).expect("new setter B receives round 2 word");
    let round2 = drain(&mut rx_a)
        .iter()
        .find_map(|e| match e {
            ServerEvent::RoundStart { round, guesser, .. } => Some((*round, *guesser)),
            _ => None,
        })
        .expect("A sees round 2 start");
    assert_eq!(round2, (2, a));

    // Round 2: A evens the score.
    solve_round(&h.engine, a, &room_code, &word2).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    // Round 3: B guesses again and takes the match 2-1.
    tokio::time::sleep(ROUND_ADVANCE_DELAY + Duration::from_millis(100)).await;
    let word3 = secret_word(&drain(&mut rx_a)).expect("setter A receives round 3 word");
    solve_round(&h.engine, b, &room_code, &word3).await;

    let events_b = drain(&mut rx_b);
    let match_end = events_b
        .iter()
        .find_map(|e| match e {
            ServerEvent::MatchEnd { winner, scores } => Some((*winner, scores.clone())),
            _ => None,
        })
        .expect("match ends");
    assert_eq!(match_end.0, b);
    assert_eq!(match_end.1[&b], 2);
    assert_eq!(match_end.1[&a], 1);

    // Room is gone the moment the match resolves.
    assert!(h.engine.registry().get(&room_code).is_none());
    assert!(h.engine.registry().is_empty());

    // Reward dispatch and session close are recorded.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let record = h.store.session(session).expect("session persisted");
    assert_eq!(record.status, SessionStatus::Finished);
    assert_eq!(record.winner, Some(b));
    assert!(record.finished_at.is_some());

    let winner = h.store.fetch_profile(b).await.unwrap();
    assert_eq!((winner.wins, winner.xp, winner.gems, winner.total_games), (1, 100, 25, 1));
    let loser = h.store.fetch_profile(a).await.unwrap();
    assert_eq!((loser.losses, loser.xp, loser.gems, loser.total_games), (1, 20, 0, 1));

    // Every completed round left a persisted record with an outcome.
    let rounds = h.store.rounds_for(session);
    assert_eq!(rounds.len(), 3);
    assert!(rounds.iter().all(|r| r.outcome.is_some()));
}

#[tokio::test(start_paused = true)]
async fn six_misses_end_the_round_for_the_setter() {
    let bank = WordBank::new(vec![Category { name: "test".into(), words: vec!["dog".into()] }]);
    let store = MemoryStore::new();
    let engine = Engine::new(
        Arc::new(MatchRegistry::new()),
        Arc::new(Presence::new()),
        Arc::new(bank),
        store.clone(),
    );
    let (a, mut rx_a) = connect(&engine, "alice").await;
    let (b, mut rx_b) = connect(&engine, "bob").await;
    engine.join_queue(a, GameMode::Ranked).await;
    engine.join_queue(b, GameMode::Ranked).await;
    let room_code = drain(&mut rx_b)
        .iter()
        .find_map(|e| match e {
            ServerEvent::MatchFound { room_code, .. } => Some(room_code.clone()),
            _ => None,
        })
        .unwrap();
    drain(&mut rx_a);

    for c in ['x', 'y', 'z', 'q', 'w', 'v'] {
        engine.guess_letter(b, &room_code, c).await;
    }

    let events_a = drain(&mut rx_a);
    let end = events_a
        .iter()
        .find_map(|e| match e {
            ServerEvent::RoundEnd { winner, wrong_guesses, word, scores, .. } => {
                Some((*winner, *wrong_guesses, word.clone(), scores.clone()))
            }
            _ => None,
        })
        .expect("round ends after six misses");
    assert_eq!(end.0, a);
    assert_eq!(end.1, 6);
    assert_eq!(end.2, "dog");
    assert_eq!(end.3[&a], 1);

    // Further guesses are dead until the next round starts.
    engine.guess_letter(b, &room_code, 'd').await;
    drain(&mut rx_b);
    assert!(drain(&mut rx_a).is_empty());
}

#[tokio::test(start_paused = true)]
async fn a_won_round_scores_once_even_if_guesses_keep_coming() {
    let bank = WordBank::new(vec![Category { name: "test".into(), words: vec!["ox".into()] }]);
    let store = MemoryStore::new();
    let engine = Engine::new(
        Arc::new(MatchRegistry::new()),
        Arc::new(Presence::new()),
        Arc::new(bank),
        store.clone(),
    );
    let (a, mut rx_a) = connect(&engine, "alice").await;
    let (b, mut rx_b) = connect(&engine, "bob").await;
    engine.join_queue(a, GameMode::Ranked).await;
    engine.join_queue(b, GameMode::Ranked).await;
    let room_code = drain(&mut rx_b)
        .iter()
        .find_map(|e| match e {
            ServerEvent::MatchFound { room_code, .. } => Some(room_code.clone()),
            _ => None,
        })
        .unwrap();
    drain(&mut rx_a);

    // B solves round 1, then fires a stray letter inside the advance window.
    engine.guess_letter(b, &room_code, 'o').await;
    engine.guess_letter(b, &room_code, 'x').await;
    engine.guess_letter(b, &room_code, 'z').await;

    let events_b = drain(&mut rx_b);
    let round_ends: Vec<_> = events_b
        .iter()
        .filter_map(|e| match e {
            ServerEvent::RoundEnd { winner, scores, .. } => Some((*winner, scores.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(round_ends.len(), 1, "the round ends exactly once");
    assert_eq!(round_ends[0].0, b);
    assert_eq!(round_ends[0].1[&b], 1);
    assert!(!events_b.iter().any(|e| matches!(e, ServerEvent::MatchEnd { .. })));

    // The match is still live and waiting on the advance timer.
    assert!(engine.registry().get(&room_code).is_some());
}

#[tokio::test]
async fn chat_is_truncated_and_broadcast() {
    let h = harness();
    let (host, mut rx_host) = connect(&h.engine, "hana").await;
    let (joiner, mut rx_joiner) = connect(&h.engine, "jo").await;
    h.engine.create_private_room(host).await;
    let code = drain(&mut rx_host)
        .iter()
        .find_map(|e| match e {
            ServerEvent::PrivateRoomCreated { room_code } => Some(room_code.clone()),
            _ => None,
        })
        .unwrap();
    h.engine.join_private_room(joiner, &code).await;
    drain(&mut rx_host);
    drain(&mut rx_joiner);

    let long = "y".repeat(150);
    h.engine.send_chat(host, &code, &long);
    for rx in [&mut rx_host, &mut rx_joiner] {
        let events = drain(rx);
        let msg = events
            .iter()
            .find_map(|e| match e {
                ServerEvent::ChatMessage { user_id, message, .. } => {
                    Some((*user_id, message.clone()))
                }
                _ => None,
            })
            .expect("chat reaches both players");
        assert_eq!(msg.0, host);
        assert_eq!(msg.1.chars().count(), 100);
    }
}

#[tokio::test]
async fn invites_reach_online_friends_only() {
    let h = harness();
    let (inviter, _rx) = connect(&h.engine, "ivy").await;
    let (friend, mut rx_friend) = connect(&h.engine, "fern").await;

    h.engine.invite_friend(inviter, friend, "AB12CD").await;
    assert!(matches!(
        drain(&mut rx_friend).as_slice(),
        [ServerEvent::GameInvite { from_username, room_code, .. }]
            if from_username == "ivy" && room_code == "AB12CD"
    ));

    // Offline target: silently dropped.
    h.engine.on_disconnect(friend).await;
    h.engine.invite_friend(inviter, friend, "AB12CD").await;
    assert!(drain(&mut rx_friend).is_empty());
}

#[tokio::test]
async fn disconnect_clears_presence_status_and_queue() {
    let h = harness();
    let (user, _rx) = connect(&h.engine, "uma").await;
    h.engine.join_queue(user, GameMode::Ranked).await;
    assert_eq!(h.store.queue_len().await.unwrap(), 1);
    assert_eq!(
        h.store.fetch_profile(user).await.unwrap().status,
        PresenceStatus::Online
    );

    h.engine.on_disconnect(user).await;
    assert!(!h.engine.presence().is_online(user));
    assert_eq!(h.store.queue_len().await.unwrap(), 0);
    assert_eq!(
        h.store.fetch_profile(user).await.unwrap().status,
        PresenceStatus::Offline
    );
}

#[tokio::test]
async fn stale_advance_timer_is_harmless_after_teardown() {
    let h = harness();
    // No such room: must be a silent no-op.
    h.engine.advance_round("GONE42", 1).await;
    assert!(h.engine.registry().is_empty());
}

/// Store whose session inserts always fail; everything else delegates.
#[derive(Clone)]
struct FailingSessions(MemoryStore);

impl DataStore for FailingSessions {
    async fn ensure_profile(&self, user: Uuid, username: &str) -> Result<Profile, StoreError> {
        self.0.ensure_profile(user, username).await
    }
    async fn fetch_profile(&self, user: Uuid) -> Result<Profile, StoreError> {
        self.0.fetch_profile(user).await
    }
    async fn update_status(&self, user: Uuid, status: PresenceStatus) -> Result<(), StoreError> {
        self.0.update_status(user, status).await
    }
    async fn leaderboard(&self, limit: usize) -> Result<Vec<Profile>, StoreError> {
        self.0.leaderboard(limit).await
    }
    async fn grant_award(&self, user: Uuid, award: Award) -> Result<(), StoreError> {
        self.0.grant_award(user, award).await
    }
    async fn upsert_queue(&self, entry: QueueEntry) -> Result<(), StoreError> {
        self.0.upsert_queue(entry).await
    }
    async fn claim_opponent(
        &self,
        user: Uuid,
        mode: GameMode,
    ) -> Result<Option<QueueEntry>, StoreError> {
        self.0.claim_opponent(user, mode).await
    }
    async fn remove_queue(&self, user: Uuid) -> Result<(), StoreError> {
        self.0.remove_queue(user).await
    }
    async fn queue_len(&self) -> Result<usize, StoreError> {
        self.0.queue_len().await
    }
    async fn sweep_stale_queue(&self, max_age: Duration) -> Result<usize, StoreError> {
        self.0.sweep_stale_queue(max_age).await
    }
    async fn create_session(
        &self,
        _player1: Uuid,
        _player2: Uuid,
        _room_code: &str,
        _mode: GameMode,
    ) -> Result<Uuid, StoreError> {
        Err(StoreError::Unavailable("sessions table down".into()))
    }
    async fn finish_session(&self, session: Uuid, winner: Uuid) -> Result<(), StoreError> {
        self.0.finish_session(session, winner).await
    }
    async fn insert_round(&self, record: RoundRecord) -> Result<(), StoreError> {
        self.0.insert_round(record).await
    }
    async fn complete_round(
        &self,
        session: Uuid,
        round_number: u32,
        guessed_letters: Vec<char>,
        wrong_guesses: u8,
        outcome: RoundOutcome,
    ) -> Result<(), StoreError> {
        self.0
            .complete_round(session, round_number, guessed_letters, wrong_guesses, outcome)
            .await
    }
}

#[tokio::test]
async fn session_failure_restores_the_queue_and_tells_both_players() {
    let store = FailingSessions(MemoryStore::new());
    let engine = Engine::new(
        Arc::new(MatchRegistry::new()),
        Arc::new(Presence::new()),
        Arc::new(WordBank::default()),
        store.clone(),
    );
    let (a, mut rx_a) = connect(&engine, "alice").await;
    let (b, mut rx_b) = connect(&engine, "bob").await;

    engine.join_queue(a, GameMode::Ranked).await;
    engine.join_queue(b, GameMode::Ranked).await;

    let events_a = drain(&mut rx_a);
    let events_b = drain(&mut rx_b);
    for events in [&events_a, &events_b] {
        assert!(
            events
                .iter()
                .any(|e| matches!(e, ServerEvent::RoomError { message } if message == "Could not start match")),
            "both players are told the match could not start"
        );
        assert!(!events.iter().any(|e| matches!(e, ServerEvent::MatchFound { .. })));
    }

    // No half-created match: room absent, both entries back in the queue.
    assert!(engine.registry().is_empty());
    assert_eq!(store.queue_len().await.unwrap(), 2);
}
