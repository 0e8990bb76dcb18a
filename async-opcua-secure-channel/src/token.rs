// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Token lifecycle: allocation, revised-lifetime computation, and the
//! expiry watchdog (spec §3, §4.2).

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_opcua_types::DateTime;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::ids::AtomicHandle;

/// The default token lifetime used when a client requests `0` (spec §3,
/// §6). The upstream JS source disagrees with itself here — its
/// constructor doc comment says 30000ms while the code actually uses
/// 600000ms (spec §9 "Open questions"). This implementation keeps
/// 600000ms and documents the discrepancy rather than reproducing it; see
/// DESIGN.md.
pub const DEFAULT_SECURE_TOKEN_LIFETIME_MS: u32 = 600_000;

/// The watchdog fires at `revisedLifeTime * GRACE_FACTOR` after token
/// creation (spec §3, §4.2, §8).
pub const GRACE_FACTOR: f64 = 1.20;

/// The unit of symmetric-key validity (spec §3).
#[derive(Debug, Clone)]
pub struct SecurityToken {
    pub secure_channel_id: u32,
    pub token_id: u32,
    pub created_at: DateTime,
    pub revised_life_time: u32,
    expired: Arc<AtomicBool>,
}

impl SecurityToken {
    /// Has the watchdog fired for this token? Firing flips this flag but
    /// does not by itself close the channel (spec §4.2).
    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }
}

impl PartialEq for SecurityToken {
    fn eq(&self, other: &Self) -> bool {
        self.secure_channel_id == other.secure_channel_id
            && self.token_id == other.token_id
            && self.created_at == other.created_at
            && self.revised_life_time == other.revised_life_time
    }
}
impl Eq for SecurityToken {}

/// Allocates `tokenId`s, computes revised lifetimes, and arms/cancels the
/// expiry watchdog. Retains the previous token for the grace window
/// described in spec §9 (REDESIGN FLAGS: the literal upstream behavior
/// drops the old token immediately on renewal; this implementation keeps
/// it until its own watchdog fires or it is superseded again).
pub struct TokenManager {
    secure_channel_id: u32,
    last_token_id: AtomicHandle,
    default_lifetime_ms: u32,
    grace_factor: f64,
    current: Option<SecurityToken>,
    previous: Option<SecurityToken>,
    watchdog: Option<JoinHandle<()>>,
}

impl TokenManager {
    pub fn new(secure_channel_id: u32, default_lifetime_ms: u32) -> Self {
        Self {
            secure_channel_id,
            last_token_id: AtomicHandle::new(1),
            default_lifetime_ms,
            grace_factor: GRACE_FACTOR,
            current: None,
            previous: None,
            watchdog: None,
        }
    }

    /// Overrides the watchdog grace multiplier (spec §4.2, §6:
    /// `tokenRenewalGraceFactor`), in place of the `GRACE_FACTOR` default.
    pub fn with_grace_factor(mut self, grace_factor: f64) -> Self {
        self.grace_factor = grace_factor;
        self
    }

    pub fn current(&self) -> Option<&SecurityToken> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&SecurityToken> {
        self.previous.as_ref()
    }

    /// True if `token_id` is one the channel currently recognises as
    /// live: the current token, or the previous one while it has not yet
    /// expired (spec §3 invariant: "at most two tokens simultaneously").
    pub fn accepts(&self, token_id: u32) -> bool {
        if let Some(cur) = &self.current {
            if cur.token_id == token_id && !cur.is_expired() {
                return true;
            }
        }
        if let Some(prev) = &self.previous {
            if prev.token_id == token_id && !prev.is_expired() {
                return true;
            }
        }
        false
    }

    /// Computes the revised lifetime per spec §3: 0 means "use the
    /// server default", otherwise the smaller of the server default and
    /// the request.
    pub fn revise_lifetime(&self, requested: u32) -> u32 {
        if requested == 0 {
            self.default_lifetime_ms
        } else {
            self.default_lifetime_ms.min(requested)
        }
    }

    /// Issues a new token (spec §4.2). `issue` and `renew` are
    /// behaviorally identical at this level — the upstream distinction is
    /// purely informational for the caller (spec §4.2) — so both funnel
    /// through this method; callers use [`Self::issue`]/[`Self::renew`]
    /// to keep that informational distinction visible at the call site.
    fn allocate(&mut self, requested_lifetime: u32) -> SecurityToken {
        if let Some(handle) = self.watchdog.take() {
            handle.abort();
        }
        self.previous = self.current.take();

        let token_id = self.last_token_id.next();
        let revised_life_time = self.revise_lifetime(requested_lifetime);
        let token = SecurityToken {
            secure_channel_id: self.secure_channel_id,
            token_id,
            created_at: DateTime::now(),
            revised_life_time,
            expired: Arc::new(AtomicBool::new(false)),
        };

        self.arm_watchdog(&token);
        self.current = Some(token.clone());
        token
    }

    pub fn issue(&mut self, requested_lifetime: u32) -> SecurityToken {
        debug!("issuing security token on channel {}", self.secure_channel_id);
        self.allocate(requested_lifetime)
    }

    pub fn renew(&mut self, requested_lifetime: u32) -> SecurityToken {
        debug!("renewing security token on channel {}", self.secure_channel_id);
        self.allocate(requested_lifetime)
    }

    fn arm_watchdog(&mut self, token: &SecurityToken) {
        let millis = (token.revised_life_time as f64 * self.grace_factor) as u64;
        let expired = token.expired.clone();
        let channel_id = self.secure_channel_id;
        let token_id = token.token_id;
        self.watchdog = Some(tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
            expired.store(true, Ordering::Release);
            warn!(
                "token {} on channel {} expired after grace window",
                token_id, channel_id
            );
        }));
    }

    /// Cancels any pending watchdog. Cancellation is best-effort: a timer
    /// whose callback already ran is a no-op (spec §5).
    pub fn cancel_watchdog(&mut self) {
        if let Some(handle) = self.watchdog.take() {
            handle.abort();
        }
    }
}

impl Drop for TokenManager {
    fn drop(&mut self) {
        self.cancel_watchdog();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn token_ids_are_strictly_monotonic() {
        let mut tokens = TokenManager::new(1, 600_000);
        let first = tokens.issue(0);
        let second = tokens.renew(0);
        let third = tokens.renew(0);
        assert_eq!(first.token_id, 1);
        assert_eq!(second.token_id, 2);
        assert_eq!(third.token_id, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn requested_lifetime_zero_uses_server_default() {
        let mut tokens = TokenManager::new(1, 600_000);
        let token = tokens.issue(0);
        assert_eq!(token.revised_life_time, 600_000);
    }

    #[tokio::test(start_paused = true)]
    async fn requested_lifetime_above_default_is_capped() {
        let mut tokens = TokenManager::new(1, 600_000);
        let token = tokens.issue(10_000_000);
        assert_eq!(token.revised_life_time, 600_000);
    }

    #[tokio::test(start_paused = true)]
    async fn requested_lifetime_below_default_is_honored() {
        let mut tokens = TokenManager::new(1, 600_000);
        let token = tokens.issue(1_000);
        assert_eq!(token.revised_life_time, 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn accepts_current_and_previous_token_during_grace_window() {
        let mut tokens = TokenManager::new(1, 600_000);
        let first = tokens.issue(1_000);
        let second = tokens.renew(1_000);

        assert!(tokens.accepts(first.token_id));
        assert!(tokens.accepts(second.token_id));
        assert!(!tokens.accepts(999));
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_expires_token_after_grace_window() {
        let mut tokens = TokenManager::new(1, 600_000);
        let token = tokens.issue(1_000);
        assert!(!token.is_expired());

        tokio::time::advance(std::time::Duration::from_millis(1_201)).await;
        tokio::task::yield_now().await;

        assert!(token.is_expired());
        assert!(!tokens.accepts(token.token_id));
    }

    #[tokio::test(start_paused = true)]
    async fn custom_grace_factor_changes_watchdog_timing() {
        let mut tokens = TokenManager::new(1, 600_000).with_grace_factor(2.0);
        let token = tokens.issue(1_000);

        tokio::time::advance(std::time::Duration::from_millis(1_500)).await;
        tokio::task::yield_now().await;
        assert!(!token.is_expired(), "1.5s < 1s * 2.0 grace window");

        tokio::time::advance(std::time::Duration::from_millis(600)).await;
        tokio::task::yield_now().await;
        assert!(token.is_expired(), "2.1s >= 1s * 2.0 grace window");
    }
}
