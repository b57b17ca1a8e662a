//! Pure match state: round lifecycle, guess legality, best-of-three scoring.
//!
//! Nothing in this module does I/O. Handlers apply a guess here, get back a
//! decision, and only then broadcast and persist — so the authoritative
//! state transition never waits on the network or the store.

use std::collections::{BTreeSet, HashMap};

use uuid::Uuid;

use crate::store::{Profile, RoundOutcome};
use crate::words::Draw;

/// A round is lost for the guesser at this many incorrect letters.
pub const MAX_WRONG_GUESSES: u8 = 6;
/// Round wins needed to take the match (best of three).
pub const ROUND_WINS_TO_TAKE_MATCH: u8 = 2;

/// One seat in a match: identity, public snapshot, round wins so far.
#[derive(Debug, Clone)]
pub struct PlayerSlot {
    pub id: Uuid,
    pub profile: Profile,
    pub round_wins: u8,
}

impl PlayerSlot {
    pub fn new(profile: Profile) -> Self {
        Self { id: profile.id, profile, round_wins: 0 }
    }
}

/// Exactly two participants with named roles. The guesser is tracked by
/// index; the setter is always the other seat, so a room can never hold a
/// third player or an out-of-room guesser.
#[derive(Debug, Clone)]
pub struct PlayerPair {
    slots: [PlayerSlot; 2],
    guesser: usize,
}

impl PlayerPair {
    /// `guesser` takes the first round's guessing role.
    pub fn new(guesser: PlayerSlot, setter: PlayerSlot) -> Self {
        Self { slots: [guesser, setter], guesser: 0 }
    }

    pub fn guesser(&self) -> &PlayerSlot {
        &self.slots[self.guesser]
    }

    pub fn setter(&self) -> &PlayerSlot {
        &self.slots[1 - self.guesser]
    }

    fn winner_slot_mut(&mut self, outcome: RoundOutcome) -> &mut PlayerSlot {
        match outcome {
            RoundOutcome::Won => &mut self.slots[self.guesser],
            RoundOutcome::Lost => &mut self.slots[1 - self.guesser],
        }
    }

    pub fn swap_roles(&mut self) {
        self.guesser = 1 - self.guesser;
    }

    pub fn ids(&self) -> [Uuid; 2] {
        [self.slots[0].id, self.slots[1].id]
    }

    pub fn scores(&self) -> HashMap<Uuid, u8> {
        self.slots.iter().map(|s| (s.id, s.round_wins)).collect()
    }

    pub fn profiles(&self) -> HashMap<Uuid, Profile> {
        self.slots.iter().map(|s| (s.id, s.profile.clone())).collect()
    }
}

/// The active round's board.
#[derive(Debug, Clone)]
pub struct RoundBoard {
    pub word: String,
    pub category: String,
    pub guessed: BTreeSet<char>,
    pub wrong_guesses: u8,
}

impl RoundBoard {
    pub fn new(draw: Draw) -> Self {
        Self {
            word: draw.word,
            category: draw.category,
            guessed: BTreeSet::new(),
            wrong_guesses: 0,
        }
    }

    pub fn guessed_letters(&self) -> Vec<char> {
        self.guessed.iter().copied().collect()
    }

    /// True once every alphabetic character of the word has been guessed;
    /// spaces and punctuation are auto-satisfied.
    fn solved(&self) -> bool {
        self.word
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .all(|c| self.guessed.contains(&c.to_ascii_lowercase()))
    }
}

/// Result of applying one guess.
#[derive(Debug, Clone)]
pub enum GuessOutcome {
    /// Illegal guess (wrong caller, duplicate letter, round already over).
    /// Silent: the caller gets no error and state is untouched.
    Rejected,
    Continue {
        letter: char,
        correct: bool,
    },
    RoundOver(RoundSummary),
}

/// Everything the effects layer needs to broadcast and persist a round end.
#[derive(Debug, Clone)]
pub struct RoundSummary {
    pub round: u32,
    pub outcome: RoundOutcome,
    pub winner: Uuid,
    pub word: String,
    pub guessed_letters: Vec<char>,
    pub wrong_guesses: u8,
    pub scores: HashMap<Uuid, u8>,
    pub match_winner: Option<Uuid>,
}

/// Announced state for a freshly started round.
#[derive(Debug, Clone)]
pub struct RoundStart {
    pub round: u32,
    pub category: String,
    pub word: String,
    pub word_length: usize,
    pub guesser: Uuid,
    pub setter: Uuid,
}

/// A running best-of-three duel.
#[derive(Debug, Clone)]
pub struct MatchState {
    pub pair: PlayerPair,
    pub round: u32,
    pub board: RoundBoard,
}

impl MatchState {
    pub fn new(guesser: PlayerSlot, setter: PlayerSlot, draw: Draw) -> Self {
        Self {
            pair: PlayerPair::new(guesser, setter),
            round: 1,
            board: RoundBoard::new(draw),
        }
    }

    /// Apply one letter guess. All legality checks and score mutations are
    /// synchronous; the returned outcome is the authoritative decision.
    pub fn apply_guess(&mut self, user: Uuid, letter: char) -> GuessOutcome {
        if self.pair.guesser().id != user {
            return GuessOutcome::Rejected;
        }
        let letter = letter.to_ascii_lowercase();
        if self.board.guessed.contains(&letter) {
            return GuessOutcome::Rejected;
        }
        // Terminal round: a solved board or an exhausted miss budget closes
        // it either way, so a stray guess that lands before the room is
        // advanced or torn down cannot score the round a second time.
        if self.board.solved() || self.board.wrong_guesses >= MAX_WRONG_GUESSES {
            return GuessOutcome::Rejected;
        }

        self.board.guessed.insert(letter);
        let correct = self.board.word.contains(letter);
        if !correct {
            self.board.wrong_guesses += 1;
        }

        // Win is evaluated before loss.
        let outcome = if self.board.solved() {
            Some(RoundOutcome::Won)
        } else if self.board.wrong_guesses >= MAX_WRONG_GUESSES {
            Some(RoundOutcome::Lost)
        } else {
            None
        };

        match outcome {
            None => GuessOutcome::Continue { letter, correct },
            Some(outcome) => {
                let winner_slot = self.pair.winner_slot_mut(outcome);
                winner_slot.round_wins += 1;
                let winner = winner_slot.id;
                let match_winner =
                    (winner_slot.round_wins >= ROUND_WINS_TO_TAKE_MATCH).then_some(winner);
                GuessOutcome::RoundOver(RoundSummary {
                    round: self.round,
                    outcome,
                    winner,
                    word: self.board.word.clone(),
                    guessed_letters: self.board.guessed_letters(),
                    wrong_guesses: self.board.wrong_guesses,
                    scores: self.pair.scores(),
                    match_winner,
                })
            }
        }
    }

    /// Advance to the next round: fresh board, roles swapped.
    pub fn start_next_round(&mut self, draw: Draw) -> RoundStart {
        self.round += 1;
        self.pair.swap_roles();
        self.board = RoundBoard::new(draw);
        RoundStart {
            round: self.round,
            category: self.board.category.clone(),
            word: self.board.word.clone(),
            word_length: self.board.word.len(),
            guesser: self.pair.guesser().id,
            setter: self.pair.setter().id,
        }
    }
}
