//! Rotating anti-forgery tokens
//!
//! A token is the truncated HMAC-SHA256 of `(tick, action, scope, user)`.
//! The tick advances every half lifetime and a token verifies during the tick
//! it was issued in and the following one, so every token lives between one
//! half and one full lifetime.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Bytes of the MAC kept in the token
const TOKEN_BYTES: usize = 10;

/// Default token lifetime (one day)
pub const DEFAULT_LIFETIME_SECS: u64 = 86_400;

/// Issues and verifies anti-forgery tokens
#[derive(Clone)]
pub struct Nonces {
    secret: Vec<u8>,
    lifetime_secs: u64,
}

impl Nonces {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self::with_lifetime(secret, DEFAULT_LIFETIME_SECS)
    }

    pub fn with_lifetime(secret: impl Into<Vec<u8>>, lifetime_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            lifetime_secs: lifetime_secs.max(2),
        }
    }

    /// Issue a token for `action` on `scope` by `user_id`
    pub fn issue(&self, action: &str, scope: &str, user_id: u64) -> String {
        self.issue_at(action, scope, user_id, now_secs())
    }

    /// Verify a submitted token
    pub fn verify(&self, token: &str, action: &str, scope: &str, user_id: u64) -> bool {
        self.verify_at(token, action, scope, user_id, now_secs())
    }

    pub fn issue_at(&self, action: &str, scope: &str, user_id: u64, now: u64) -> String {
        let tick = self.tick(now);
        match self.mac(tick, action, scope, user_id) {
            Some(mac) => hex::encode(&mac.finalize().into_bytes()[..TOKEN_BYTES]),
            None => String::new(),
        }
    }

    pub fn verify_at(
        &self,
        token: &str,
        action: &str,
        scope: &str,
        user_id: u64,
        now: u64,
    ) -> bool {
        let Ok(tag) = hex::decode(token.trim()) else {
            return false;
        };
        if tag.len() != TOKEN_BYTES {
            return false;
        }

        let tick = self.tick(now);
        [tick, tick.saturating_sub(1)].into_iter().any(|t| {
            self.mac(t, action, scope, user_id)
                .is_some_and(|mac| mac.verify_truncated_left(&tag).is_ok())
        })
    }

    fn tick(&self, now: u64) -> u64 {
        now / (self.lifetime_secs / 2)
    }

    fn mac(&self, tick: u64, action: &str, scope: &str, user_id: u64) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(format!("{}|{}|{}|{}", tick, action, scope, user_id).as_bytes());
        Some(mac)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    #[test]
    fn test_issue_and_verify() {
        let nonces = Nonces::new("secret");
        let token = nonces.issue_at("register_serial", "42", 7, NOW);
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(nonces.verify_at(&token, "register_serial", "42", 7, NOW));
    }

    #[test]
    fn test_token_is_scoped() {
        let nonces = Nonces::new("secret");
        let token = nonces.issue_at("register_serial", "42", 7, NOW);

        assert!(!nonces.verify_at(&token, "register_serial", "43", 7, NOW));
        assert!(!nonces.verify_at(&token, "add_serial", "42", 7, NOW));
        assert!(!nonces.verify_at(&token, "register_serial", "42", 8, NOW));
        assert!(!Nonces::new("other").verify_at(&token, "register_serial", "42", 7, NOW));
    }

    #[test]
    fn test_token_rotates_out() {
        let nonces = Nonces::with_lifetime("secret", 100);
        let token = nonces.issue_at("a", "s", 1, 1_000);

        // still valid during the following tick
        assert!(nonces.verify_at(&token, "a", "s", 1, 1_050));
        assert!(!nonces.verify_at(&token, "a", "s", 1, 1_100));
    }

    #[test]
    fn test_garbage_token_rejected() {
        let nonces = Nonces::new("secret");
        assert!(!nonces.verify_at("", "a", "s", 1, NOW));
        assert!(!nonces.verify_at("not-hex", "a", "s", 1, NOW));
        assert!(!nonces.verify_at("abcd", "a", "s", 1, NOW));
    }
}
