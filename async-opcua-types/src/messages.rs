// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The small set of typed messages the secure channel layer itself
//! produces or consumes: `OpenSecureChannelRequest`/`Response`, the
//! security token they carry, the asymmetric/symmetric security headers,
//! and `ServiceFault`. Every other request/response type is opaque to this
//! crate — decoding them is the object factory's job, and dispatching them
//! is the service dispatcher's (spec §1).

use crate::{
    byte_string::ByteString,
    date_time::DateTime,
    headers::{RequestHeader, ResponseHeader},
    security::{MessageSecurityMode, SecurityTokenRequestType},
    status_code::StatusCode,
};

/// The fields of `OpenSecureChannelRequest` the handshake consumes
/// (spec §6).
#[derive(Debug, Clone)]
pub struct OpenSecureChannelRequest {
    pub request_header: RequestHeader,
    pub client_protocol_version: u32,
    pub request_type: SecurityTokenRequestType,
    pub security_mode: MessageSecurityMode,
    pub client_nonce: ByteString,
    pub requested_lifetime: u32,
}

/// The token fields returned inside `OpenSecureChannelResponse`
/// (spec §3, "SecurityToken").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSecurityToken {
    pub channel_id: u32,
    pub token_id: u32,
    pub created_at: DateTime,
    pub revised_lifetime: u32,
}

/// The fields of `OpenSecureChannelResponse` the handshake produces
/// (spec §6).
#[derive(Debug, Clone)]
pub struct OpenSecureChannelResponse {
    pub response_header: ResponseHeader,
    pub server_protocol_version: u32,
    pub security_token: ChannelSecurityToken,
    pub server_nonce: ByteString,
}

/// A fault response, sent in place of the expected response type whenever
/// a request cannot be serviced (spec §7).
#[derive(Debug, Clone)]
pub struct ServiceFault {
    pub response_header: ResponseHeader,
}

impl ServiceFault {
    pub fn new(request_header: &RequestHeader, status: StatusCode) -> Self {
        Self {
            response_header: ResponseHeader::new_error(request_header, status),
        }
    }
}

/// The asymmetric (RSA-era handshake) security header, spec §6.
#[derive(Debug, Clone, Default)]
pub struct AsymmetricSecurityHeader {
    pub security_policy_uri: String,
    pub sender_certificate: ByteString,
    pub receiver_certificate_thumbprint: ByteString,
}

impl AsymmetricSecurityHeader {
    /// The header sent for policy `None` (spec §4.6).
    pub fn none() -> Self {
        Self {
            security_policy_uri: crate::security::SecurityPolicy::None.as_uri().to_owned(),
            sender_certificate: ByteString::null(),
            receiver_certificate_thumbprint: ByteString::null(),
        }
    }
}

/// The symmetric (steady-state) security header, spec §6: carries only
/// `tokenId`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymmetricSecurityHeader {
    pub token_id: u32,
}

/// Either security header variant, selected per-message by `msgType`
/// (spec §1, data flow step 3 and §6).
#[derive(Debug, Clone)]
pub enum SecurityHeader {
    Asymmetric(AsymmetricSecurityHeader),
    Symmetric(SymmetricSecurityHeader),
}

/// The three wire message type tags (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// `OPN` — asymmetric-secured OpenSecureChannel request/response.
    Open,
    /// `MSG` — symmetric-secured application message.
    Message,
    /// `CLO` — close request.
    Close,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Open => "OPN",
            MessageType::Message => "MSG",
            MessageType::Close => "CLO",
        }
    }
}
