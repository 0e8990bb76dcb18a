// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! A minimal binary codec for just the handful of messages this crate
//! defines (`OpenSecureChannelResponse`, `ServiceFault`, and the headers
//! they carry).
//!
//! General-purpose binary decoding of arbitrary service messages is the
//! object factory's job and stays out of scope (spec.md §1). But the wire
//! shape of the OPN response is fully enumerated in spec.md §6, and the
//! round-trip law in spec.md §8 ("encoding the OPN response and decoding
//! it yields an object equal to the original") is only testable if this
//! crate can actually encode and decode it, so that much is implemented
//! here rather than stubbed.

use std::io::{self, Read, Write};

use chrono::{TimeZone, Utc};

use crate::{
    byte_string::ByteString,
    date_time::DateTime,
    headers::{RequestHeader, ResponseHeader},
    messages::{ChannelSecurityToken, OpenSecureChannelResponse, ServiceFault},
    security::SecurityTokenRequestType,
    status_code::StatusCode,
};

/// Errors are reported as `io::Error` at this layer and translated to
/// `StatusCode::BadDecodingError` by callers, matching how a real binary
/// decoder surfaces truncation/corruption.
pub type CodecResult<T> = io::Result<T>;

fn write_u32(w: &mut impl Write, v: u32) -> CodecResult<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u32(r: &mut impl Read) -> CodecResult<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn write_i32(w: &mut impl Write, v: i32) -> CodecResult<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_i32(r: &mut impl Read) -> CodecResult<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn write_i64(w: &mut impl Write, v: i64) -> CodecResult<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_i64(r: &mut impl Read) -> CodecResult<i64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn write_byte_string(w: &mut impl Write, bs: &ByteString) -> CodecResult<()> {
    match bs.value() {
        None => write_i32(w, -1),
        Some(bytes) => {
            write_i32(w, bytes.len() as i32)?;
            w.write_all(bytes)
        }
    }
}

fn read_byte_string(r: &mut impl Read) -> CodecResult<ByteString> {
    let len = read_i32(r)?;
    if len < 0 {
        return Ok(ByteString::null());
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(ByteString::from(buf))
}

fn write_date_time(w: &mut impl Write, dt: &DateTime) -> CodecResult<()> {
    let chrono_dt = dt.as_chrono();
    write_i64(w, chrono_dt.timestamp())?;
    write_u32(w, chrono_dt.timestamp_subsec_nanos())
}

fn read_date_time(r: &mut impl Read) -> CodecResult<DateTime> {
    let secs = read_i64(r)?;
    let nanos = read_u32(r)?;
    let chrono_dt = Utc
        .timestamp_opt(secs, nanos)
        .single()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "invalid timestamp"))?;
    Ok(date_time_from_chrono(chrono_dt))
}

// `DateTime` intentionally exposes no public "from chrono" constructor
// other than `now()`/`null()`, since nothing outside the codec needs one;
// this keeps it crate-local.
fn date_time_from_chrono(dt: chrono::DateTime<Utc>) -> DateTime {
    let epoch = Utc.timestamp_opt(0, 0).unwrap();
    if dt == epoch {
        DateTime::null()
    } else {
        // Reconstructed via the public arithmetic operators: null() + (dt - epoch).
        DateTime::null() + (dt - epoch)
    }
}

fn write_request_header(w: &mut impl Write, h: &RequestHeader) -> CodecResult<()> {
    write_date_time(w, &h.timestamp)?;
    write_u32(w, h.request_handle)?;
    write_u32(w, h.timeout_hint)
}

fn read_request_header(r: &mut impl Read) -> CodecResult<RequestHeader> {
    Ok(RequestHeader {
        timestamp: read_date_time(r)?,
        request_handle: read_u32(r)?,
        timeout_hint: read_u32(r)?,
    })
}

fn write_status_code(w: &mut impl Write, s: StatusCode) -> CodecResult<()> {
    write_u32(w, status_to_wire(s))
}

fn read_status_code(r: &mut impl Read) -> CodecResult<StatusCode> {
    status_from_wire(read_u32(r)?)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "unknown status code"))
}

fn status_to_wire(s: StatusCode) -> u32 {
    match s {
        StatusCode::Good => 0,
        StatusCode::BadCommunicationError => 1,
        StatusCode::BadSecurityPolicyRejected => 2,
        StatusCode::BadSecurityModeRejected => 3,
        StatusCode::BadCertificateInvalid => 4,
        StatusCode::BadCertificateTimeInvalid => 5,
        StatusCode::BadSecurityChecksFailed => 6,
        StatusCode::BadNonceInvalid => 7,
        StatusCode::BadRequestTypeInvalid => 8,
        StatusCode::BadTimeout => 9,
        StatusCode::BadConnectionClosed => 10,
        StatusCode::BadTcpSecureChannelUnknown => 11,
        StatusCode::BadUnexpectedError => 12,
        StatusCode::BadDecodingError => 13,
        StatusCode::BadEncodingError => 14,
        StatusCode::BadApplicationSignatureInvalid => 15,
        StatusCode::BadServerHalted => 16,
    }
}

fn status_from_wire(v: u32) -> Result<StatusCode, ()> {
    Ok(match v {
        0 => StatusCode::Good,
        1 => StatusCode::BadCommunicationError,
        2 => StatusCode::BadSecurityPolicyRejected,
        3 => StatusCode::BadSecurityModeRejected,
        4 => StatusCode::BadCertificateInvalid,
        5 => StatusCode::BadCertificateTimeInvalid,
        6 => StatusCode::BadSecurityChecksFailed,
        7 => StatusCode::BadNonceInvalid,
        8 => StatusCode::BadRequestTypeInvalid,
        9 => StatusCode::BadTimeout,
        10 => StatusCode::BadConnectionClosed,
        11 => StatusCode::BadTcpSecureChannelUnknown,
        12 => StatusCode::BadUnexpectedError,
        13 => StatusCode::BadDecodingError,
        14 => StatusCode::BadEncodingError,
        15 => StatusCode::BadApplicationSignatureInvalid,
        16 => StatusCode::BadServerHalted,
        _ => return Err(()),
    })
}

fn write_response_header(w: &mut impl Write, h: &ResponseHeader) -> CodecResult<()> {
    write_date_time(w, &h.timestamp)?;
    write_u32(w, h.request_handle)?;
    write_status_code(w, h.service_result)
}

fn read_response_header(r: &mut impl Read) -> CodecResult<ResponseHeader> {
    Ok(ResponseHeader {
        timestamp: read_date_time(r)?,
        request_handle: read_u32(r)?,
        service_result: read_status_code(r)?,
    })
}

fn write_security_token(w: &mut impl Write, t: &ChannelSecurityToken) -> CodecResult<()> {
    write_u32(w, t.channel_id)?;
    write_u32(w, t.token_id)?;
    write_date_time(w, &t.created_at)?;
    write_u32(w, t.revised_lifetime)
}

fn read_security_token(r: &mut impl Read) -> CodecResult<ChannelSecurityToken> {
    Ok(ChannelSecurityToken {
        channel_id: read_u32(r)?,
        token_id: read_u32(r)?,
        created_at: read_date_time(r)?,
        revised_lifetime: read_u32(r)?,
    })
}

/// Encodes an `OpenSecureChannelResponse` (spec §6, §8 round-trip law).
pub fn encode_open_secure_channel_response(
    msg: &OpenSecureChannelResponse,
) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    write_response_header(&mut buf, &msg.response_header)?;
    write_u32(&mut buf, msg.server_protocol_version)?;
    write_security_token(&mut buf, &msg.security_token)?;
    write_byte_string(&mut buf, &msg.server_nonce)?;
    Ok(buf)
}

pub fn decode_open_secure_channel_response(
    bytes: &[u8],
) -> CodecResult<OpenSecureChannelResponse> {
    let mut cursor = io::Cursor::new(bytes);
    Ok(OpenSecureChannelResponse {
        response_header: read_response_header(&mut cursor)?,
        server_protocol_version: read_u32(&mut cursor)?,
        security_token: read_security_token(&mut cursor)?,
        server_nonce: read_byte_string(&mut cursor)?,
    })
}

/// Encodes a `ServiceFault` (spec §7).
pub fn encode_service_fault(msg: &ServiceFault) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    write_response_header(&mut buf, &msg.response_header)?;
    Ok(buf)
}

pub fn decode_service_fault(bytes: &[u8]) -> CodecResult<ServiceFault> {
    let mut cursor = io::Cursor::new(bytes);
    Ok(ServiceFault {
        response_header: read_response_header(&mut cursor)?,
    })
}

/// Encodes an `OpenSecureChannelRequest`, used by the server-side test
/// doubles that act as the client half of round-trip tests.
pub fn encode_open_secure_channel_request(
    msg: &crate::messages::OpenSecureChannelRequest,
) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    write_request_header(&mut buf, &msg.request_header)?;
    write_u32(&mut buf, msg.client_protocol_version)?;
    write_u32(
        &mut buf,
        match msg.request_type {
            SecurityTokenRequestType::Issue => 0,
            SecurityTokenRequestType::Renew => 1,
        },
    )?;
    write_u32(&mut buf, msg.security_mode as u32)?;
    write_byte_string(&mut buf, &msg.client_nonce)?;
    write_u32(&mut buf, msg.requested_lifetime)
}
