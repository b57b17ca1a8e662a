pub mod auth;
pub mod config;
pub mod game;
pub mod http;
pub mod matchmaking;
pub mod presence;
pub mod rewards;
pub mod store;
pub mod telemetry;
pub mod words;
pub mod ws;
