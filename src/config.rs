//! Configuration from environment variables.

use std::env;
use std::fs::File;
use std::net::{Ipv4Addr, SocketAddr};

use rand::RngCore;
use tracing::{info, warn};

use crate::words::WordBank;

/// Socket address to bind. Reads `PORT` or defaults to 8080, binds 0.0.0.0.
pub fn server_addr() -> SocketAddr {
    let port = env::var("PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8080);
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

/// HMAC key for bearer tokens: `LASTLIMB_HMAC_KEY` as 64 hex chars, or a
/// random per-process key (tokens then die with the process).
pub fn hmac_key() -> [u8; 32] {
    env::var("LASTLIMB_HMAC_KEY")
        .ok()
        .and_then(|hex| hex::decode(hex).ok())
        .and_then(|v| v.try_into().ok())
        .unwrap_or_else(|| {
            let mut key = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut key);
            key
        })
}

/// Word table: JSON file named by `LASTLIMB_WORDS`, else the built-in set.
pub fn word_bank() -> WordBank {
    let Ok(path) = env::var("LASTLIMB_WORDS") else {
        return WordBank::default();
    };
    match File::open(&path).map_err(anyhow::Error::from).and_then(WordBank::from_json) {
        Ok(bank) => {
            info!(%path, "loaded word table");
            bank
        }
        Err(err) => {
            warn!(%path, %err, "failed to load word table, using built-in set");
            WordBank::default()
        }
    }
}
