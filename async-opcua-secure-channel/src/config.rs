// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Secure channel configuration, in the style of
//! `async-opcua-client::config::ClientConfig`: a plain, serde-derived
//! struct with `#[serde(default = "...")]` functions for every field and a
//! `validate` method that collects every problem instead of bailing on the
//! first one.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::token::{DEFAULT_SECURE_TOKEN_LIFETIME_MS, GRACE_FACTOR};

/// The configuration options enumerated in spec §6: the initial-OPN wait,
/// the default/cap applied to token lifetime revision, and the renewal
/// grace multiplier. `objectFactory` and `parent` from the same list are
/// collaborator handles, not configuration data, and are supplied at
/// construction rather than modelled here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecureChannelConfig {
    /// Milliseconds to wait for the first `OpenSecureChannelRequest`
    /// before aborting (spec §4.1, §6). Default 10000.
    #[serde(default = "defaults::initial_opn_timeout_ms")]
    pub initial_opn_timeout_ms: u64,

    /// Milliseconds: the server default/cap used when revising a client's
    /// requested token lifetime (spec §3, §6). Default 600000.
    #[serde(default = "defaults::default_secure_token_lifetime_ms")]
    pub default_secure_token_lifetime_ms: u32,

    /// Multiplier applied to `revisedLifeTime` to get the watchdog delay
    /// (spec §4.2). Default 1.20.
    #[serde(default = "defaults::token_renewal_grace_factor")]
    pub token_renewal_grace_factor: f64,
}

impl SecureChannelConfig {
    /// Collects every configuration problem rather than stopping at the
    /// first, the way `async-opcua-client`'s `Config::validate` does.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.initial_opn_timeout_ms == 0 {
            errors.push("initial_opn_timeout_ms must be greater than zero".to_owned());
        }
        if self.default_secure_token_lifetime_ms == 0 {
            errors.push("default_secure_token_lifetime_ms must be greater than zero".to_owned());
        }
        if self.token_renewal_grace_factor < 1.0 {
            errors.push(
                "token_renewal_grace_factor must be >= 1.0 (a token cannot expire before its own \
                 revised lifetime elapses)"
                    .to_owned(),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn initial_opn_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_opn_timeout_ms)
    }
}

impl Default for SecureChannelConfig {
    fn default() -> Self {
        Self {
            initial_opn_timeout_ms: defaults::initial_opn_timeout_ms(),
            default_secure_token_lifetime_ms: defaults::default_secure_token_lifetime_ms(),
            token_renewal_grace_factor: defaults::token_renewal_grace_factor(),
        }
    }
}

mod defaults {
    use super::{DEFAULT_SECURE_TOKEN_LIFETIME_MS, GRACE_FACTOR};
    use crate::lifecycle::DEFAULT_INITIAL_OPN_TIMEOUT_MS;

    pub fn initial_opn_timeout_ms() -> u64 {
        DEFAULT_INITIAL_OPN_TIMEOUT_MS
    }

    pub fn default_secure_token_lifetime_ms() -> u32 {
        DEFAULT_SECURE_TOKEN_LIFETIME_MS
    }

    pub fn token_renewal_grace_factor() -> f64 {
        GRACE_FACTOR
    }
}
