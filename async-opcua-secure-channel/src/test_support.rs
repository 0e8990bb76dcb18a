// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Hand-written test doubles for the collaborator traits (spec §1's
//! external components). Used by the `#[cfg(test)]` modules throughout
//! this crate instead of a mocking framework, matching the teacher's own
//! test style.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use async_opcua_types::{
    Certificate, MessageSecurityMode, MessageType, SecurityHeader, SecurityPolicy, StatusCode,
};
use sha1::{Digest, Sha1};

use crate::{
    collaborators::{
        ChunkingOptions, CryptoProvider, DerivedKeys, EndpointRegistry, IncomingMessage,
        MessageBuilder, MessageChunker, SecurityOptions, Transport,
    },
    events::{ChannelObserver, TransactionStats},
};

/// A crypto provider whose certificate parsing is a canned lookup table
/// rather than real X.509 decoding, and whose key derivation is a
/// deterministic, inspectable stand-in for the real PRF.
pub struct FakeCrypto {
    pub rsa_modulus_length: usize,
    pub certificates: HashMap<Vec<u8>, Certificate>,
}

impl FakeCrypto {
    pub fn new() -> Self {
        Self {
            rsa_modulus_length: 256,
            certificates: HashMap::new(),
        }
    }

    pub fn with_certificate(mut self, der: Vec<u8>, cert: Certificate) -> Self {
        self.certificates.insert(der, cert);
        self
    }
}

impl Default for FakeCrypto {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoProvider for FakeCrypto {
    fn server_rsa_modulus_length(&self) -> usize {
        self.rsa_modulus_length
    }

    fn public_key_length(&self, der_certificate: &[u8]) -> Result<usize, StatusCode> {
        self.certificates
            .get(der_certificate)
            .map(|_| self.rsa_modulus_length)
            .ok_or(StatusCode::BadCertificateInvalid)
    }

    fn parse_certificate(&self, der: &[u8]) -> Result<Certificate, StatusCode> {
        self.certificates
            .get(der)
            .cloned()
            .ok_or(StatusCode::BadCertificateInvalid)
    }

    fn random_bytes(&self, len: usize) -> Vec<u8> {
        vec![0x42; len]
    }

    fn derive_keys(&self, secret: &[u8], seed: &[u8], _policy: SecurityPolicy) -> DerivedKeys {
        DerivedKeys {
            signing_key: secret.to_vec(),
            encrypting_key: seed.to_vec(),
            iv: vec![0u8; 16],
        }
    }

    fn sha1_thumbprint(&self, der_certificate: &[u8]) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(der_certificate);
        hasher.finalize().into()
    }
}

/// Supports exactly the (mode, policy) pairs it is constructed with.
pub struct FakeEndpointRegistry {
    pub server_certificate_der: Vec<u8>,
    pub supported: Vec<(MessageSecurityMode, SecurityPolicy)>,
}

impl FakeEndpointRegistry {
    pub fn new(server_certificate_der: Vec<u8>) -> Self {
        Self {
            server_certificate_der,
            supported: vec![
                (MessageSecurityMode::None, SecurityPolicy::None),
                (MessageSecurityMode::Sign, SecurityPolicy::Basic128Rsa15),
                (MessageSecurityMode::Sign, SecurityPolicy::Basic256),
                (MessageSecurityMode::SignAndEncrypt, SecurityPolicy::Basic128Rsa15),
                (MessageSecurityMode::SignAndEncrypt, SecurityPolicy::Basic256),
            ],
        }
    }
}

impl EndpointRegistry for FakeEndpointRegistry {
    fn server_certificate_der(&self) -> &[u8] {
        &self.server_certificate_der
    }

    fn supports(&self, mode: MessageSecurityMode, policy: SecurityPolicy) -> bool {
        self.supported.contains(&(mode, policy))
    }
}

/// A message builder that does no real chunk reassembly: it is pre-loaded
/// with the decoded messages to hand back, one per `process_chunk` call,
/// and records the calls made against it so tests can assert on them.
#[derive(Default)]
pub struct FakeMessageBuilder {
    pub queued: VecDeque<IncomingMessage>,
    pub security_modes_seen: Vec<MessageSecurityMode>,
    pub installed_tokens: Vec<(u32, Option<DerivedKeys>)>,
}

impl FakeMessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: IncomingMessage) {
        self.queued.push_back(message);
    }
}

impl MessageBuilder for FakeMessageBuilder {
    fn process_chunk(&mut self, _chunk: Vec<u8>) -> Result<Option<IncomingMessage>, StatusCode> {
        Ok(self.queued.pop_front())
    }

    fn set_security_mode(&mut self, mode: MessageSecurityMode) {
        self.security_modes_seen.push(mode);
    }

    fn install_inbound_token(&mut self, token_id: u32, keys: Option<DerivedKeys>) {
        self.installed_tokens.push((token_id, keys));
    }
}

/// A chunker that does not actually chunk: the whole payload becomes one
/// chunk, tagged with a one-byte `msgType` marker so tests can see which
/// kind of message was sent. Every call is recorded.
#[derive(Default)]
pub struct FakeChunker {
    pub calls: std::sync::Mutex<Vec<(MessageType, ChunkingOptions)>>,
}

impl FakeChunker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageChunker for FakeChunker {
    fn chunk(
        &self,
        msg_type: MessageType,
        _security_header: &SecurityHeader,
        payload: &[u8],
        opts: ChunkingOptions,
        _security: &SecurityOptions,
    ) -> Result<Vec<Vec<u8>>, StatusCode> {
        self.calls.lock().unwrap().push((msg_type, opts));
        Ok(vec![payload.to_vec()])
    }
}

/// An in-memory transport: inbound chunks are drained from a queue,
/// outbound chunks are recorded. `recv_chunk` returns `Ok(None)` once the
/// inbound queue is empty and `peer_closed` has been set (simulating the
/// peer closing the socket); otherwise, on an empty queue, it pends
/// forever, the same as a real socket with nothing to read — this lets
/// tests exercise timeouts racing against `recv_chunk` under
/// `tokio::time::pause`.
#[derive(Default)]
pub struct FakeTransport {
    pub inbound: VecDeque<Vec<u8>>,
    pub outbound: Vec<Vec<u8>>,
    pub closed: bool,
    pub peer_closed: bool,
    pub receive_buffer_size: usize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            receive_buffer_size: 8192,
            ..Default::default()
        }
    }

    pub fn with_inbound(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.inbound = chunks.into();
        self
    }

    /// Marks the transport so a subsequent `recv_chunk` on an empty queue
    /// reports the peer having closed the socket, instead of pending.
    pub fn with_peer_closed(mut self) -> Self {
        self.peer_closed = true;
        self
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn receive_buffer_size(&self) -> usize {
        self.receive_buffer_size
    }

    async fn send_chunk(&mut self, chunk: Vec<u8>) -> Result<(), StatusCode> {
        if self.closed {
            return Err(StatusCode::BadConnectionClosed);
        }
        self.outbound.push(chunk);
        Ok(())
    }

    async fn recv_chunk(&mut self) -> Result<Option<Vec<u8>>, StatusCode> {
        if let Some(chunk) = self.inbound.pop_front() {
            return Ok(Some(chunk));
        }
        if self.peer_closed {
            return Ok(None);
        }
        std::future::pending().await
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

/// Records every event fired on it, for assertion.
#[derive(Default)]
pub struct RecordingObserver {
    pub messages: Vec<IncomingMessage>,
    pub aborts: Vec<StatusCode>,
    pub transactions: Vec<TransactionStats>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChannelObserver for RecordingObserver {
    fn on_message(&mut self, message: IncomingMessage) {
        self.messages.push(message);
    }

    fn on_abort(&mut self, reason: StatusCode) {
        self.aborts.push(reason);
    }

    fn on_transaction_done(&mut self, stats: TransactionStats) {
        self.transactions.push(stats);
    }
}
