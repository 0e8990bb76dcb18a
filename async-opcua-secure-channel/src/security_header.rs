// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Construction of outbound security headers (spec §4.6).

use async_opcua_types::{
    AsymmetricSecurityHeader, ByteString, MessageSecurityMode, SecurityPolicy,
    SymmetricSecurityHeader,
};

use crate::collaborators::CryptoProvider;

/// Builds the outbound asymmetric header for an OPN response (spec §4.6).
///
/// - Mode `None`: policy URI is the "None" URI, no certificate, no
///   thumbprint.
/// - Mode `Sign`/`SignAndEncrypt`: policy URI is the client's requested
///   one, `senderCertificate` is the server certificate chain, and
///   `receiverCertificateThumbprint` is the SHA-1 digest of the client
///   certificate, or null if there is no client certificate.
pub fn build_asymmetric_header(
    mode: MessageSecurityMode,
    policy: SecurityPolicy,
    server_certificate_der: &[u8],
    client_certificate_der: Option<&[u8]>,
    crypto: &dyn CryptoProvider,
) -> AsymmetricSecurityHeader {
    if mode == MessageSecurityMode::None {
        return AsymmetricSecurityHeader::none();
    }

    let receiver_certificate_thumbprint = match client_certificate_der {
        Some(der) => ByteString::from(crypto.sha1_thumbprint(der).to_vec()),
        None => ByteString::null(),
    };

    AsymmetricSecurityHeader {
        security_policy_uri: policy.as_uri().to_owned(),
        sender_certificate: ByteString::from(server_certificate_der.to_vec()),
        receiver_certificate_thumbprint,
    }
}

/// Builds the outbound symmetric header for a `MSG` (spec §4.6): just the
/// token id.
pub fn build_symmetric_header(token_id: u32) -> SymmetricSecurityHeader {
    SymmetricSecurityHeader { token_id }
}
