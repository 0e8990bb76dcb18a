// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Security-related enumerations shared between the handshake state machine
//! and the channel data model: security mode, security policy, and the
//! open-secure-channel request kind.

/// `MessageSecurityMode` as used on the wire and by the handshake, see
/// spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageSecurityMode {
    /// Invalid is the default state and is never legal on a completed
    /// handshake.
    #[default]
    Invalid,
    None,
    Sign,
    SignAndEncrypt,
}

/// The recognised security policy URIs (spec §6). Any other URI does not
/// parse to a `SecurityPolicy` and must be rejected with
/// `BadSecurityPolicyRejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SecurityPolicy {
    #[default]
    None,
    Basic128Rsa15,
    Basic256,
}

impl SecurityPolicy {
    pub const NONE_URI: &'static str = "http://opcfoundation.org/UA/SecurityPolicy#None";
    pub const BASIC_128_RSA_15_URI: &'static str =
        "http://opcfoundation.org/UA/SecurityPolicy#Basic128Rsa15";
    pub const BASIC_256_URI: &'static str = "http://opcfoundation.org/UA/SecurityPolicy#Basic256";

    /// Parses a security policy URI, per spec §6. Unrecognised URIs
    /// (including the empty string) return `None`, letting the caller
    /// decide how to fail (`BadSecurityPolicyRejected`).
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            Self::NONE_URI => Some(Self::None),
            Self::BASIC_128_RSA_15_URI => Some(Self::Basic128Rsa15),
            Self::BASIC_256_URI => Some(Self::Basic256),
            _ => None,
        }
    }

    pub fn as_uri(self) -> &'static str {
        match self {
            Self::None => Self::NONE_URI,
            Self::Basic128Rsa15 => Self::BASIC_128_RSA_15_URI,
            Self::Basic256 => Self::BASIC_256_URI,
        }
    }

    /// Length in bytes of the symmetric key material for this policy, and
    /// therefore the expected length of both nonces exchanged during the
    /// handshake (spec §3, §8). The actual value is ultimately a crypto
    /// provider constant; this mirrors the sizes fixed by the OPC UA
    /// SecurityPolicy profiles so that nonce-length validation does not
    /// require a crypto provider round trip.
    pub fn symmetric_key_size(self) -> usize {
        match self {
            Self::None => 0,
            Self::Basic128Rsa15 => 16,
            Self::Basic256 => 32,
        }
    }
}

/// Whether an `OpenSecureChannelRequest` is the first handshake on a channel
/// or a renewal of an already-open one (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SecurityTokenRequestType {
    Issue,
    Renew,
}
