// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The small vocabulary of `StatusCode`s the secure channel layer produces or
//! consumes. This is a hand-picked subset of the full OPC UA status code
//! table (Part 4, Table 37) rather than the generated, exhaustive one —
//! decoding and dispatch of the full table belongs to the object factory
//! and service dispatcher, both external to this crate.

use thiserror::Error;

/// Result status of an operation or a response.
///
/// `StatusCode` doubles as the crate's error type: fallible operations
/// return `Result<T, StatusCode>` rather than a separate error enum, the
/// same way the upstream service layer treats bad status codes as the
/// error channel.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StatusCode {
    #[error("Good")]
    Good,
    #[error("BadCommunicationError")]
    BadCommunicationError,
    #[error("BadSecurityPolicyRejected")]
    BadSecurityPolicyRejected,
    #[error("BadSecurityModeRejected")]
    BadSecurityModeRejected,
    #[error("BadCertificateInvalid")]
    BadCertificateInvalid,
    #[error("BadCertificateTimeInvalid")]
    BadCertificateTimeInvalid,
    #[error("BadSecurityChecksFailed")]
    BadSecurityChecksFailed,
    #[error("BadNonceInvalid")]
    BadNonceInvalid,
    #[error("BadRequestTypeInvalid")]
    BadRequestTypeInvalid,
    #[error("BadTimeout")]
    BadTimeout,
    #[error("BadConnectionClosed")]
    BadConnectionClosed,
    #[error("BadTcpSecureChannelUnknown")]
    BadTcpSecureChannelUnknown,
    #[error("BadUnexpectedError")]
    BadUnexpectedError,
    #[error("BadDecodingError")]
    BadDecodingError,
    #[error("BadEncodingError")]
    BadEncodingError,
    #[error("BadApplicationSignatureInvalid")]
    BadApplicationSignatureInvalid,
    #[error("BadServerHalted")]
    BadServerHalted,
}

impl StatusCode {
    /// True for `Good`, the only status that does not terminate the channel
    /// when it appears as a `serviceResult` (see spec §7 propagation policy).
    pub fn is_good(self) -> bool {
        matches!(self, StatusCode::Good)
    }

    /// Complement of [`Self::is_good`].
    pub fn is_bad(self) -> bool {
        !self.is_good()
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::Good
    }
}
