//! Wire protocol between clients and the match server.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::GameMode;
use crate::store::Profile;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Ping,
    JoinQueue { mode: GameMode },
    LeaveQueue,
    GuessLetter { room_code: String, letter: char },
    CreatePrivateRoom,
    JoinPrivateRoom { room_code: String },
    InviteFriend { friend_id: Uuid, room_code: String },
    SendChat { room_code: String, message: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Guesser,
    Setter,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueuePhase {
    Idle,
    Searching,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Pong,
    QueueStatus {
        status: QueuePhase,
    },
    /// Sent per player; the secret word is never part of this payload.
    MatchFound {
        room_code: String,
        session_id: Uuid,
        opponent: Profile,
        your_role: Role,
        round: u32,
        category: String,
        word_length: usize,
        guesser: Uuid,
    },
    /// Setter only.
    RoundWord {
        word: String,
        category: String,
    },
    LetterGuessed {
        letter: char,
        is_correct: bool,
        guessed_letters: Vec<char>,
        wrong_guesses: u8,
    },
    RoundEnd {
        winner: Uuid,
        word: String,
        scores: HashMap<Uuid, u8>,
        guessed_letters: Vec<char>,
        wrong_guesses: u8,
    },
    RoundStart {
        round: u32,
        category: String,
        guesser: Uuid,
        word_length: usize,
    },
    MatchEnd {
        winner: Uuid,
        scores: HashMap<Uuid, u8>,
    },
    PrivateRoomCreated {
        room_code: String,
    },
    PrivateMatchStart {
        room_code: String,
        players: HashMap<Uuid, Profile>,
        category: String,
        guesser: Uuid,
        word_length: usize,
    },
    RoomError {
        message: String,
    },
    ChatMessage {
        user_id: Uuid,
        message: String,
        timestamp: i64,
    },
    GameInvite {
        from_user_id: Uuid,
        from_username: String,
        room_code: String,
    },
    Error {
        message: String,
    },
}
