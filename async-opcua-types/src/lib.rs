// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Wire types shared by the secure channel layer.
//!
//! This crate is a deliberately small slice of the full OPC UA type system
//! (the complete one runs to hundreds of generated structs): only the types
//! the secure channel handshake and send path actually touch. Everything
//! else — typed service requests/responses, the address space's data
//! types, binary/XML/JSON codecs — belongs to the object factory and is
//! out of scope here (see spec.md §1).

mod byte_string;
mod certificate;
pub mod codec;
mod date_time;
mod headers;
mod messages;
mod security;
mod status_code;

pub use byte_string::ByteString;
pub use certificate::Certificate;
pub use date_time::DateTime;
pub use headers::{RequestHeader, ResponseHeader};
pub use messages::{
    AsymmetricSecurityHeader, ChannelSecurityToken, MessageType, OpenSecureChannelRequest,
    OpenSecureChannelResponse, SecurityHeader, ServiceFault, SymmetricSecurityHeader,
};
pub use security::{MessageSecurityMode, SecurityPolicy, SecurityTokenRequestType};
pub use status_code::StatusCode;
