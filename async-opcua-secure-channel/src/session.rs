// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The channel session: the per-request send path (spec §4.4).
//!
//! Everything here runs after a request has already been decoded by the
//! message builder. It correlates the response to the request, picks the
//! right security options for the message type, drives the chunker and
//! transport, and records per-transaction statistics.

use std::time::Instant;

use async_opcua_types::{
    AsymmetricSecurityHeader, MessageSecurityMode, MessageType, ResponseHeader, SecurityHeader,
    StatusCode, SymmetricSecurityHeader,
};
use tracing::{debug, trace};

use crate::{
    channel::SecureChannel,
    collaborators::{ChunkingOptions, CryptoProvider, MessageChunker, SecurityOptions, Transport},
    events::{ChannelObserver, TransactionStats},
};

/// The correlation carried from a decoded request to its eventual response
/// (spec §4.4: "requestId > 0", "copies requestHandle").
#[derive(Debug, Clone, Copy)]
pub struct RequestCorrelation {
    pub request_id: u32,
    pub request_handle: u32,
}

/// The two instants bracketing chunk reception for a single request, plus
/// the bytes actually read off the transport for it, supplied by the
/// lifecycle loop that does the reading (spec §4.4, "lap_reception",
/// "bytesRead... deltas since the previous transaction").
#[derive(Debug, Clone, Copy)]
pub struct TransactionTiming {
    pub received_first_chunk_at: Instant,
    pub received_last_chunk_at: Instant,
    pub bytes_read: u64,
}

/// A typed outbound message this crate knows how to correlate and encode.
/// Implemented here for `OpenSecureChannelResponse`/`ServiceFault`; any
/// other response type is encoded upstream by the object factory before
/// it ever reaches the channel (spec §1), so it is out of scope for this
/// trait.
pub trait OutgoingResponse {
    fn response_header(&self) -> &ResponseHeader;

    /// Spec §4.4: "copies request.requestHeader.requestHandle into
    /// response.responseHeader.requestHandle".
    fn set_request_handle(&mut self, handle: u32);

    fn encode(&self) -> Vec<u8>;
}

impl OutgoingResponse for async_opcua_types::OpenSecureChannelResponse {
    fn response_header(&self) -> &ResponseHeader {
        &self.response_header
    }

    fn set_request_handle(&mut self, handle: u32) {
        self.response_header.request_handle = handle;
    }

    fn encode(&self) -> Vec<u8> {
        async_opcua_types::codec::encode_open_secure_channel_response(self)
            .expect("encoding an in-memory OpenSecureChannelResponse cannot fail")
    }
}

impl OutgoingResponse for async_opcua_types::ServiceFault {
    fn response_header(&self) -> &ResponseHeader {
        &self.response_header
    }

    fn set_request_handle(&mut self, handle: u32) {
        self.response_header.request_handle = handle;
    }

    fn encode(&self) -> Vec<u8> {
        async_opcua_types::codec::encode_service_fault(self)
            .expect("encoding an in-memory ServiceFault cannot fail")
    }
}

/// Drives the send half of a secure channel: correlation, security option
/// selection, chunking, transport writes, and statistics.
pub struct ChannelSession {
    #[cfg(feature = "debug-duplicate-detection")]
    sent_request_ids: std::collections::HashSet<u32>,
}

impl ChannelSession {
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "debug-duplicate-detection")]
            sent_request_ids: std::collections::HashSet::new(),
        }
    }

    /// Sends a response for a completed request (spec §4.4).
    ///
    /// `outbound_asym_header` must be `Some` when `msg_type` is
    /// [`MessageType::Open`] (the handshake already computed it — see
    /// `HandshakeResult::outbound_security_header`) and is ignored
    /// otherwise, since `MSG`/`CLO` use the symmetric header built from the
    /// channel's own current token.
    #[allow(clippy::too_many_arguments)]
    pub async fn send_response(
        &mut self,
        channel: &mut SecureChannel,
        msg_type: MessageType,
        mut response: Box<dyn OutgoingResponse + Send>,
        correlation: RequestCorrelation,
        timing: TransactionTiming,
        outbound_asym_header: Option<&AsymmetricSecurityHeader>,
        transport: &mut dyn Transport,
        chunker: &dyn MessageChunker,
        crypto: &dyn CryptoProvider,
        observer: &mut dyn ChannelObserver,
    ) -> Result<(), StatusCode> {
        // Spec §8 invariant: every response correlates to a request whose
        // requestId was greater than zero.
        assert!(correlation.request_id > 0, "requestId must be > 0");

        #[cfg(feature = "debug-duplicate-detection")]
        {
            if !self.sent_request_ids.insert(correlation.request_id) {
                panic!(
                    "duplicate response sent for request id {}",
                    correlation.request_id
                );
            }
        }

        response.set_request_handle(correlation.request_handle);

        let token_id = channel.current_token().map(|t| t.token_id).unwrap_or(0);
        let (security_header, security) =
            self.security_options(channel, msg_type, outbound_asym_header, crypto);

        let opts = ChunkingOptions {
            request_id: correlation.request_id,
            secure_channel_id: channel.secure_channel_id,
            token_id,
            chunk_size: transport.receive_buffer_size(),
        };

        let payload = response.encode();
        let chunks = chunker.chunk(msg_type, &security_header, &payload, opts, &security)?;

        let t2 = Instant::now();
        let mut bytes_written = 0u64;
        for chunk in chunks {
            bytes_written += chunk.len() as u64;
            transport.send_chunk(chunk).await?;
        }
        let t3 = Instant::now();

        channel.statistics.bytes_written += bytes_written;
        channel.statistics.transactions_count += 1;

        trace!(
            channel_id = channel.secure_channel_id,
            request_id = correlation.request_id,
            status = %response.response_header().service_result,
            "response flushed"
        );

        observer.on_transaction_done(TransactionStats {
            bytes_read: timing.bytes_read,
            bytes_written,
            lap_reception: timing
                .received_last_chunk_at
                .saturating_duration_since(timing.received_first_chunk_at),
            lap_processing: t2.saturating_duration_since(timing.received_last_chunk_at),
            lap_emission: t3.saturating_duration_since(t2),
        });

        Ok(())
    }

    /// Sends a `ServiceFault` in place of the expected response and closes
    /// the channel afterwards (spec §4.4, §7: "every failure mode after
    /// the handshake funnels through this path").
    #[allow(clippy::too_many_arguments)]
    pub async fn send_error_and_abort(
        &mut self,
        channel: &mut SecureChannel,
        status: StatusCode,
        correlation: RequestCorrelation,
        timing: TransactionTiming,
        transport: &mut dyn Transport,
        chunker: &dyn MessageChunker,
        crypto: &dyn CryptoProvider,
        observer: &mut dyn ChannelObserver,
    ) -> Result<(), StatusCode> {
        debug!(
            channel_id = channel.secure_channel_id,
            request_id = correlation.request_id,
            %status,
            "aborting with service fault"
        );

        let header = async_opcua_types::RequestHeader {
            request_handle: correlation.request_handle,
            ..Default::default()
        };
        let fault = async_opcua_types::ServiceFault::new(&header, status);

        let result = self
            .send_response(
                channel,
                MessageType::Message,
                Box::new(fault),
                correlation,
                timing,
                None,
                transport,
                chunker,
                crypto,
                observer,
            )
            .await;

        transport.close().await;
        observer.on_abort(status);
        result
    }

    /// Selects the security header and options for an outbound message
    /// (spec §4.4): asymmetric for `OPN`, symmetric (the channel's current
    /// token and derived server keys) for everything else. Mode `None`
    /// always yields [`SecurityOptions::None`].
    fn security_options(
        &self,
        channel: &SecureChannel,
        msg_type: MessageType,
        outbound_asym_header: Option<&AsymmetricSecurityHeader>,
        crypto: &dyn CryptoProvider,
    ) -> (SecurityHeader, SecurityOptions) {
        match msg_type {
            MessageType::Open => {
                let header = outbound_asym_header
                    .cloned()
                    .unwrap_or_else(AsymmetricSecurityHeader::none);
                let options = if channel.security_mode == MessageSecurityMode::None {
                    SecurityOptions::None
                } else {
                    let plain_block_size = channel
                        .receiver_public_key_length
                        .map(|len| len.saturating_sub(crypto_block_padding_size()))
                        .unwrap_or(0);
                    SecurityOptions::Asymmetric {
                        sign: true,
                        encrypt: channel.security_mode == MessageSecurityMode::SignAndEncrypt,
                        signature_length: crypto.server_rsa_modulus_length(),
                        plain_block_size,
                        sender_certificate_der: header
                            .sender_certificate
                            .value()
                            .map(|v| v.to_vec())
                            .unwrap_or_default(),
                    }
                };
                (SecurityHeader::Asymmetric(header), options)
            }
            MessageType::Message | MessageType::Close => {
                let token_id = channel.current_token().map(|t| t.token_id).unwrap_or(0);
                let header = SymmetricSecurityHeader { token_id };
                let options = match (&channel.derived_keys, channel.security_mode) {
                    (Some((server_keys, _)), mode) if mode != MessageSecurityMode::None => {
                        SecurityOptions::Symmetric {
                            sign: true,
                            encrypt: mode == MessageSecurityMode::SignAndEncrypt,
                            keys: server_keys.clone(),
                        }
                    }
                    _ => SecurityOptions::None,
                };
                (SecurityHeader::Symmetric(header), options)
            }
        }
    }
}

impl Default for ChannelSession {
    fn default() -> Self {
        Self::new()
    }
}

/// RSA PKCS#1 v1.5 padding overhead subtracted from the receiver's public
/// key length to get the usable plaintext block size (spec §4.4). Fixed by
/// the padding scheme, not by key size or policy, so it lives here rather
/// than on `CryptoProvider`.
fn crypto_block_padding_size() -> usize {
    11
}
