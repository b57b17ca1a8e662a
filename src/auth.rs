//! Lightweight signed bearer tokens.
//!
//! Token format: base64url(json).base64url(hmac_sha256(json))

use anyhow::Context;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use time::OffsetDateTime;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub iat: i64,
}

/// Token issuer/verifier keyed by a process-wide HMAC secret.
#[derive(Clone)]
pub struct Auth {
    key: [u8; 32],
}

impl Auth {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn issue(&self, user_id: Uuid, username: &str) -> anyhow::Result<String> {
        let claims = Claims {
            sub: user_id,
            name: username.to_string(),
            iat: OffsetDateTime::now_utc().unix_timestamp(),
        };
        let payload = serde_json::to_vec(&claims)?;
        let part1 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&payload);
        let part2 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(self.sign(&payload));
        Ok(format!("{}.{}", part1, part2))
    }

    /// Verify a token and return its claims. Any structural or signature
    /// problem is an error; there is no anonymous fallback.
    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut parts = token.split('.');
        let p1 = parts.next().context("missing payload")?;
        let p2 = parts.next().context("missing sig")?;
        if parts.next().is_some() {
            anyhow::bail!("too many parts");
        }
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(p1)?;
        let sig = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(p2)?;
        if sig != self.sign(&payload) {
            anyhow::bail!("bad signature");
        }
        Ok(serde_json::from_slice(&payload)?)
    }

    fn sign(&self, data: &[u8]) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
        mac.update(data);
        mac.finalize().into_bytes().into()
    }
}
