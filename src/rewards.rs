//! Reward dispatch on match completion.
//!
//! Fire-and-forget: by the time this runs, the room is already gone and the
//! result broadcast. Store failures are logged and never retried, and they
//! can never reopen a finished match.

use tracing::warn;
use uuid::Uuid;

use crate::store::{Award, DataStore};

pub const WINNER_XP: u64 = 100;
pub const WINNER_GEMS: u64 = 25;
pub const LOSER_XP: u64 = 20;

/// Spawn the winner/loser profile updates in the background.
pub fn dispatch<S: DataStore>(store: S, winner: Uuid, loser: Uuid) {
    tokio::spawn(async move {
        if let Err(err) = store
            .grant_award(winner, Award { xp: WINNER_XP, gems: WINNER_GEMS, won: true })
            .await
        {
            warn!(%winner, %err, "failed to grant winner reward");
        }
        if let Err(err) = store
            .grant_award(loser, Award { xp: LOSER_XP, gems: 0, won: false })
            .await
        {
            warn!(%loser, %err, "failed to grant loser reward");
        }
    });
}
