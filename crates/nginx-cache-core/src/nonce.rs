//! Single-use anti-forgery tokens for operator-initiated actions.
//!
//! A token is `HMAC-SHA256(secret, tick|action|principal)` in lowercase hex.
//! Time is split into ticks of half the configured lifetime and a token
//! verifies during the tick it was issued in and the one after, so it lives
//! between one half and one full lifetime.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NonceError {
    #[error("anti-forgery token is malformed")]
    Malformed,
    #[error("anti-forgery token does not match this action")]
    Mismatch,
    #[error("anti-forgery token has expired")]
    Expired,
    #[error("anti-forgery token was already used")]
    Replayed,
    #[error("anti-forgery tokens are not configured")]
    NotConfigured,
}

pub struct NonceIssuer {
    secret: Vec<u8>,
    tick_secs: u64,
    /// Consumed tokens and the tick they were issued in.
    used: Mutex<HashMap<String, u64>>,
}

impl std::fmt::Debug for NonceIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceIssuer")
            .field("tick_secs", &self.tick_secs)
            .finish_non_exhaustive()
    }
}

impl NonceIssuer {
    pub fn new(secret: impl AsRef<[u8]>, lifetime_secs: u64) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            tick_secs: (lifetime_secs / 2).max(1),
            used: Mutex::new(HashMap::new()),
        }
    }

    pub fn issue(&self, action: &str, principal: &str) -> String {
        self.issue_at(action, principal, unix_now())
    }

    pub fn issue_at(&self, action: &str, principal: &str, now: u64) -> String {
        hex::encode(self.mac(self.tick(now), action, principal).finalize().into_bytes())
    }

    pub fn verify(&self, token: &str, action: &str, principal: &str) -> Result<(), NonceError> {
        self.verify_at(token, action, principal, unix_now())
    }

    /// Checks `token` and consumes it. A second call with the same token fails.
    pub fn verify_at(
        &self,
        token: &str,
        action: &str,
        principal: &str,
        now: u64,
    ) -> Result<(), NonceError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(NonceError::Malformed);
        }
        let bytes = hex::decode(token).map_err(|_| NonceError::Malformed)?;
        let current = self.tick(now);

        let issued_tick = [current, current.saturating_sub(1)]
            .into_iter()
            .find(|tick| self.mac(*tick, action, principal).verify_slice(&bytes).is_ok());

        let Some(issued_tick) = issued_tick else {
            // Distinguish stale tokens from forged ones for the operator message.
            let older = (2..=4).any(|back| {
                current >= back
                    && self
                        .mac(current - back, action, principal)
                        .verify_slice(&bytes)
                        .is_ok()
            });
            return Err(if older {
                NonceError::Expired
            } else {
                NonceError::Mismatch
            });
        };

        let key = token.to_ascii_lowercase();
        let mut used = self.used.lock().expect("nonce lock");
        used.retain(|_, tick| *tick + 1 >= current);
        if used.contains_key(&key) {
            return Err(NonceError::Replayed);
        }
        used.insert(key, issued_tick);
        Ok(())
    }

    fn tick(&self, now: u64) -> u64 {
        now / self.tick_secs
    }

    fn mac(&self, tick: u64, action: &str, principal: &str) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("hmac accepts keys of any length");
        mac.update(tick.to_string().as_bytes());
        mac.update(b"|");
        mac.update(action.as_bytes());
        mac.update(b"|");
        mac.update(principal.as_bytes());
        mac
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
