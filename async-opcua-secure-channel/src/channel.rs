// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The channel data model (spec §3).

use std::collections::HashSet;

use async_opcua_types::{
    AsymmetricSecurityHeader, Certificate, MessageSecurityMode, SecurityPolicy,
};

use crate::{
    collaborators::DerivedKeys,
    config::SecureChannelConfig,
    token::{SecurityToken, TokenManager},
};

/// Running totals and the most recent per-transaction timing, exposed as a
/// cheap-to-clone snapshot (spec §4.4, SPEC_FULL §10.6).
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelStatistics {
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub transactions_count: u64,
}

/// The top-level secure channel entity (spec §3).
///
/// Invariant: `security_mode == MessageSecurityMode::None` iff
/// `derived_keys` is absent iff `security_policy == SecurityPolicy::None`.
pub struct SecureChannel {
    pub secure_channel_id: u32,
    pub protocol_version: u32,
    pub security_mode: MessageSecurityMode,
    pub security_policy: SecurityPolicy,
    pub tokens: TokenManager,

    pub client_nonce: Vec<u8>,
    pub server_nonce: Vec<u8>,
    /// `(serverKeys, clientKeys)`, absent for policy `None`.
    pub derived_keys: Option<(DerivedKeys, DerivedKeys)>,

    pub client_certificate: Option<Certificate>,
    pub receiver_public_key_length: Option<usize>,
    pub client_security_header: Option<AsymmetricSecurityHeader>,

    pub session_tokens: HashSet<String>,
    pub statistics: ChannelStatistics,
}

impl SecureChannel {
    pub fn new(secure_channel_id: u32, default_token_lifetime_ms: u32) -> Self {
        Self {
            secure_channel_id,
            protocol_version: 0,
            security_mode: MessageSecurityMode::Invalid,
            security_policy: SecurityPolicy::None,
            tokens: TokenManager::new(secure_channel_id, default_token_lifetime_ms),
            client_nonce: Vec::new(),
            server_nonce: Vec::new(),
            derived_keys: None,
            client_certificate: None,
            receiver_public_key_length: None,
            client_security_header: None,
            session_tokens: HashSet::new(),
            statistics: ChannelStatistics::default(),
        }
    }

    /// Builds a channel whose token manager honors the configured default
    /// lifetime and renewal grace factor (spec §6), instead of `new`'s
    /// hardcoded grace factor.
    pub fn from_config(secure_channel_id: u32, config: &SecureChannelConfig) -> Self {
        Self {
            tokens: TokenManager::new(secure_channel_id, config.default_secure_token_lifetime_ms)
                .with_grace_factor(config.token_renewal_grace_factor),
            ..Self::new(secure_channel_id, config.default_secure_token_lifetime_ms)
        }
    }

    /// Invariant check used by tests and debug assertions: mode/policy/keys
    /// must agree on whether security is in effect at all. `Invalid` is the
    /// pre-negotiation mode (before the first OPN has been processed) and
    /// is always consistent, since nothing has been decided yet.
    pub fn security_invariant_holds(&self) -> bool {
        if self.security_mode == MessageSecurityMode::Invalid {
            return true;
        }
        let none = self.security_mode == MessageSecurityMode::None;
        none == self.derived_keys.is_none() && none == (self.security_policy == SecurityPolicy::None)
    }

    pub fn current_token(&self) -> Option<&SecurityToken> {
        self.tokens.current()
    }

    pub fn signing_enabled(&self) -> bool {
        self.security_policy != SecurityPolicy::None
            && matches!(
                self.security_mode,
                MessageSecurityMode::Sign | MessageSecurityMode::SignAndEncrypt
            )
    }

    pub fn encryption_enabled(&self) -> bool {
        self.security_policy != SecurityPolicy::None
            && self.security_mode == MessageSecurityMode::SignAndEncrypt
    }
}
