// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Server-side OPC UA secure channel: the handshake state machine, token
//! lifecycle, and request/response correlation that sit between the raw
//! framed transport and the service dispatcher.
//!
//! This crate owns the secure channel core. It does not own, and is
//! handed at construction, the transport, the message builder/chunker,
//! the crypto provider, and the endpoint registry (see the
//! [`collaborators`] module) — the same split upstream keeps between
//! `opcua-core`'s `comms::secure_channel` and the concrete transport/codec
//! crates above it.

pub mod certificate;
pub mod channel;
pub mod collaborators;
pub mod config;
pub mod events;
pub mod handshake;
mod ids;
pub mod lifecycle;
pub mod security_header;
pub mod session;
pub mod token;

#[cfg(test)]
mod test_support;

pub use certificate::CertificateValidator;
pub use channel::{ChannelStatistics, SecureChannel};
pub use config::SecureChannelConfig;
pub use events::{ChannelObserver, NullObserver, TransactionStats};
pub use handshake::{HandshakeResponse, HandshakeResult};
pub use ids::AtomicHandle;
pub use lifecycle::{LifecycleController, LifecycleState};
pub use session::{ChannelSession, OutgoingResponse, RequestCorrelation, TransactionTiming};
pub use token::{SecurityToken, TokenManager};

use std::sync::OnceLock;

/// The process-wide `secureChannelId` allocator (spec §3: "monotonically
/// assigned 32-bit identifier, unique per process instance"; spec §9,
/// design note: "shared mutable `last_channel_id`... replace with an
/// atomic counter owned by the endpoint or process; start at 1").
static SECURE_CHANNEL_IDS: OnceLock<AtomicHandle> = OnceLock::new();

/// Allocates the next process-wide `secureChannelId`.
pub fn next_secure_channel_id() -> u32 {
    SECURE_CHANNEL_IDS
        .get_or_init(|| AtomicHandle::new(1))
        .next()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn secure_channel_ids_are_unique_and_monotonic() {
        let ids: Vec<u32> = (0..100).map(|_| next_secure_channel_id()).collect();
        let unique: HashSet<u32> = ids.iter().copied().collect();
        assert_eq!(ids.len(), unique.len());
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }
}
