// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! A `ByteString` distinguishes a null value from an empty one, which
//! matters throughout the handshake (spec §4.3 step 5, §4.6): a zero-length
//! `senderCertificate` is treated as absent, but a zero-length nonce under
//! policy `None` is a legitimate value, not a missing one.

/// An opaque byte sequence that can be null, as opposed to merely empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ByteString(Option<Vec<u8>>);

impl ByteString {
    pub fn null() -> Self {
        Self(None)
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.0.as_deref()
    }

    pub fn into_value(self) -> Option<Vec<u8>> {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Length of the contained bytes, or 0 for a null value. Spec §4.3 step
    /// 5 treats a zero-length certificate the same as a null one, so most
    /// callers should prefer this over matching on `is_null`.
    pub fn len(&self) -> usize {
        self.0.as_ref().map_or(0, |v| v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<u8>> for ByteString {
    fn from(v: Vec<u8>) -> Self {
        Self(Some(v))
    }
}

impl From<Option<Vec<u8>>> for ByteString {
    fn from(v: Option<Vec<u8>>) -> Self {
        Self(v)
    }
}
