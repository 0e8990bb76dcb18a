// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Request and response headers. Only the fields the secure channel layer
//! reads or writes are modelled (spec §3, "Message envelope").

use crate::{date_time::DateTime, status_code::StatusCode};

/// Standard request header, as consumed by the handshake and echoed back
/// into every response (spec §4.4: `requestHandle` correlation).
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RequestHeader {
    pub timestamp: DateTime,
    pub request_handle: u32,
    pub timeout_hint: u32,
}

/// Standard response header.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResponseHeader {
    pub timestamp: DateTime,
    pub request_handle: u32,
    pub service_result: StatusCode,
}

impl ResponseHeader {
    /// A response header with `serviceResult = Good` and the request
    /// handle copied from `request_header`, mirroring the call site
    /// pattern `ResponseHeader::new_good(&request.request_header)` used
    /// throughout the upstream service layer.
    pub fn new_good(request_header: &RequestHeader) -> Self {
        Self {
            timestamp: DateTime::now(),
            request_handle: request_header.request_handle,
            service_result: StatusCode::Good,
        }
    }

    pub fn new_error(request_header: &RequestHeader, service_result: StatusCode) -> Self {
        Self {
            timestamp: DateTime::now(),
            request_handle: request_header.request_handle,
            service_result,
        }
    }
}
