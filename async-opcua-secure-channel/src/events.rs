// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Observer fan-out for the three events the channel emits (spec §6,
//! design note 9.1).
//!
//! The upstream JS source uses a dynamic event emitter for `message`,
//! `abort`, and `transaction_done`. Replacing that with an explicit trait,
//! registered once at construction, gets the same fan-out without runtime
//! string dispatch; the single-threaded-per-channel executor model (spec
//! §5) means no locking is needed around the calls.

use async_opcua_types::StatusCode;

use crate::collaborators::IncomingMessage;

/// Per-transaction timing, recorded once the response for a request has
/// been fully flushed (spec §4.4).
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionStats {
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub lap_reception: std::time::Duration,
    pub lap_processing: std::time::Duration,
    pub lap_emission: std::time::Duration,
}

/// Registered once per channel; receives the three observable events
/// (spec §6).
pub trait ChannelObserver: Send {
    /// A decoded non-OPN/non-CLO request arrived (spec §6). Every call
    /// here has `request_id > 0` (spec §8 invariant).
    fn on_message(&mut self, message: IncomingMessage) {
        let _ = message;
    }

    /// The channel has terminated. Emitted at most once per channel
    /// lifetime (spec §5, §8 invariant).
    fn on_abort(&mut self, reason: StatusCode) {
        let _ = reason;
    }

    /// An outbound response has been fully flushed to the transport
    /// (spec §4.4, §5).
    fn on_transaction_done(&mut self, stats: TransactionStats) {
        let _ = stats;
    }
}

/// An observer that does nothing; useful as a default when the upper
/// dispatcher has not yet been wired in (e.g. in tests that only exercise
/// the handshake).
#[derive(Debug, Default)]
pub struct NullObserver;

impl ChannelObserver for NullObserver {}
