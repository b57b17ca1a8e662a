//! Presence directory: user id -> live connection channel.

use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::ws::protocol::ServerEvent;

/// Maps authenticated users to their server-push channels. Registration
/// overwrites any prior handle (reconnects win); deregistration is
/// unconditional and never depends on anything external.
#[derive(Default)]
pub struct Presence {
    channels: DashMap<Uuid, UnboundedSender<ServerEvent>>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user: Uuid, tx: UnboundedSender<ServerEvent>) {
        self.channels.insert(user, tx);
    }

    pub fn unregister(&self, user: Uuid) {
        self.channels.remove(&user);
    }

    pub fn is_online(&self, user: Uuid) -> bool {
        self.channels.contains_key(&user)
    }

    /// Best-effort targeted delivery; silently dropped if the user has no
    /// live connection or the channel is closed.
    pub fn send_to(&self, user: Uuid, event: ServerEvent) {
        if let Some(tx) = self.channels.get(&user) {
            let _ = tx.send(event);
        }
    }
}
