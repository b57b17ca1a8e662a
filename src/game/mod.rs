pub mod engine;
pub mod registry;
pub mod state;

use serde::{Deserialize, Serialize};

/// Queue/session game mode. Private rooms always record `Casual`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Ranked,
    Casual,
}
