use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, info};

use lastlimb_server::auth::Auth;
use lastlimb_server::game::engine::Engine;
use lastlimb_server::game::registry::MatchRegistry;
use lastlimb_server::http::routes::{app, AppState};
use lastlimb_server::matchmaking::QUEUE_ENTRY_MAX_AGE;
use lastlimb_server::presence::Presence;
use lastlimb_server::store::{DataStore, MemoryStore};
use lastlimb_server::{config, telemetry};

/// How often abandoned queue entries and lobbies are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Private lobbies that never got a second player are dropped after this.
const LOBBY_MAX_AGE: Duration = Duration::from_secs(30 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let registry = Arc::new(MatchRegistry::new());
    let presence = Arc::new(Presence::new());
    let words = Arc::new(config::word_bank());
    let store = MemoryStore::new();
    let engine = Engine::new(registry.clone(), presence, words, store.clone());
    let auth = Auth::new(config::hmac_key());

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            match store.sweep_stale_queue(QUEUE_ENTRY_MAX_AGE).await {
                Ok(0) => {}
                Ok(n) => info!(removed = n, "swept stale queue entries"),
                Err(err) => debug!(%err, "queue sweep failed"),
            }
            let pruned = registry.prune_stale_lobbies(LOBBY_MAX_AGE);
            if pruned > 0 {
                info!(removed = pruned, "pruned abandoned private lobbies");
            }
        }
    });

    let router = app(AppState { engine, auth });
    let addr = config::server_addr();
    info!(%addr, "listening");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
