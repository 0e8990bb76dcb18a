// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Monotonic ID allocation.
//!
//! The upstream JS source keeps `last_channel_id` as a shared mutable
//! variable on the endpoint closure (design note 9.3); here it is an atomic
//! counter, safe to share across the independent per-channel executors
//! described in spec §5.

use std::sync::atomic::{AtomicU32, Ordering};

/// A strictly increasing `u32` counter, starting at a configurable value.
/// Used both for the process-wide `secureChannelId` allocator and for the
/// per-channel `tokenId` allocator (spec §3, §4.2).
#[derive(Debug)]
pub struct AtomicHandle {
    next: AtomicU32,
}

impl AtomicHandle {
    pub fn new(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first),
        }
    }

    /// Returns the next value and advances the counter. Wrapping is not a
    /// concern in practice: a `u32` counter incrementing once per
    /// handshake or channel would take centuries to wrap at any realistic
    /// connection rate.
    pub fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
