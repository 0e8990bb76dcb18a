// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The lifecycle controller (spec §4.1): owns the channel's state machine
//! and the receive loop that ties the transport, message builder,
//! handshake state machine, and channel session together.

use std::time::{Duration, Instant};

use async_opcua_types::{MessageType, SecurityHeader, StatusCode};
use tracing::{debug, error, info, warn};
use tracing_futures::Instrument;

use crate::{
    certificate::CertificateValidator,
    channel::SecureChannel,
    collaborators::{
        CryptoProvider, EndpointRegistry, IncomingBody, IncomingMessage, MessageBuilder,
        MessageChunker, Transport,
    },
    config::SecureChannelConfig,
    events::ChannelObserver,
    handshake::{self, HandshakeResponse},
    session::{ChannelSession, RequestCorrelation, TransactionTiming},
};

/// Spec §6: "`timeout` (ms, default 10000) — initial-OPN wait."
pub const DEFAULT_INITIAL_OPN_TIMEOUT_MS: u64 = 10_000;

/// Spec §4.1: `Init → AwaitingInitialOpn → Open → Aborted`, with `Open`
/// self-looping on renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Init,
    AwaitingInitialOpn,
    Open,
    Aborted,
}

/// Drives one channel's lifetime end to end. One instance per accepted
/// connection; not shared across channels (spec §5: independent executors).
pub struct LifecycleController {
    state: LifecycleState,
    initial_opn_timeout: Duration,
    abort_emitted: bool,
}

impl LifecycleController {
    pub fn new(initial_opn_timeout: Duration) -> Self {
        Self {
            state: LifecycleState::Init,
            initial_opn_timeout,
            abort_emitted: false,
        }
    }

    /// Builds a controller whose initial-OPN wait honors the configured
    /// timeout (spec §6: `timeout`), instead of `new`'s caller-supplied
    /// raw `Duration`.
    pub fn from_config(config: &SecureChannelConfig) -> Self {
        Self::new(config.initial_opn_timeout())
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// `init(socket)` (spec §4.1): runs the channel until it aborts, either
    /// because the peer closed the transport, a fatal decode/transport
    /// error occurred, or `close()` was called from elsewhere. Returns the
    /// status the channel aborted with.
    ///
    /// The `socket` itself is already bound into `transport` by the caller
    /// (binding a raw socket is the transport's own construction concern,
    /// out of scope here — spec §1).
    #[allow(clippy::too_many_arguments)]
    pub async fn init(
        &mut self,
        channel: &mut SecureChannel,
        session: &mut ChannelSession,
        transport: &mut dyn Transport,
        builder: &mut dyn MessageBuilder,
        chunker: &dyn MessageChunker,
        crypto: &dyn CryptoProvider,
        endpoints: &dyn EndpointRegistry,
        cert_validator: &CertificateValidator,
        observer: &mut dyn ChannelObserver,
    ) -> StatusCode {
        let span = tracing::debug_span!("secure channel", channel_id = channel.secure_channel_id);
        self.run(
            channel, session, transport, builder, chunker, crypto, endpoints, cert_validator,
            observer,
        )
        .instrument(span)
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &mut self,
        channel: &mut SecureChannel,
        session: &mut ChannelSession,
        transport: &mut dyn Transport,
        builder: &mut dyn MessageBuilder,
        chunker: &dyn MessageChunker,
        crypto: &dyn CryptoProvider,
        endpoints: &dyn EndpointRegistry,
        cert_validator: &CertificateValidator,
        observer: &mut dyn ChannelObserver,
    ) -> StatusCode {
        self.state = LifecycleState::AwaitingInitialOpn;
        debug!(channel_id = channel.secure_channel_id, "awaiting initial OPN");

        let mut pending_first_chunk_at: Option<Instant> = None;
        let mut pending_bytes_read: u64 = 0;

        loop {
            if self.state == LifecycleState::AwaitingInitialOpn {
                let sleep = tokio::time::sleep(self.initial_opn_timeout);
                tokio::pin!(sleep);
                tokio::select! {
                    chunk = transport.recv_chunk() => {
                        match self
                            .handle_chunk(
                                channel, session, transport, builder, chunker, crypto,
                                endpoints, cert_validator, observer, chunk,
                                &mut pending_first_chunk_at, &mut pending_bytes_read,
                            )
                            .await
                        {
                            Ok(()) => {}
                            // Spec §4.1: "transport error while awaiting
                            // OPN: init completes with that error; no
                            // abort event (transport never reached Open)".
                            // `handle_chunk` only transitions `self.state`
                            // to `Open` on a successful first OPN, so
                            // still being `AwaitingInitialOpn` here means
                            // that never happened.
                            Err(status) => return self.fail_before_open(status),
                        }
                    }
                    () = &mut sleep => {
                        warn!(
                            channel_id = channel.secure_channel_id,
                            "initial OPN timeout after {:?}", self.initial_opn_timeout
                        );
                        transport.close().await;
                        // Spec §4.1: "no abort event (transport never
                        // reached Open)" — `init` simply completes with
                        // the timeout error.
                        self.state = LifecycleState::Aborted;
                        return StatusCode::BadTimeout;
                    }
                }
            } else if self.state == LifecycleState::Open {
                let chunk = transport.recv_chunk().await;
                match self
                    .handle_chunk(
                        channel, session, transport, builder, chunker, crypto, endpoints,
                        cert_validator, observer, chunk, &mut pending_first_chunk_at,
                        &mut pending_bytes_read,
                    )
                    .await
                {
                    Ok(()) => {}
                    Err(status) => return self.abort(observer, status),
                }
            } else {
                return StatusCode::Good;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_chunk(
        &mut self,
        channel: &mut SecureChannel,
        session: &mut ChannelSession,
        transport: &mut dyn Transport,
        builder: &mut dyn MessageBuilder,
        chunker: &dyn MessageChunker,
        crypto: &dyn CryptoProvider,
        endpoints: &dyn EndpointRegistry,
        cert_validator: &CertificateValidator,
        observer: &mut dyn ChannelObserver,
        chunk: Result<Option<Vec<u8>>, StatusCode>,
        pending_first_chunk_at: &mut Option<Instant>,
        pending_bytes_read: &mut u64,
    ) -> Result<(), StatusCode> {
        let was_awaiting_opn = self.state == LifecycleState::AwaitingInitialOpn;

        let chunk = match chunk {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                // The peer closed the socket. Whether this is reported to
                // the caller as a silent failure or an `abort` event
                // depends on which phase `run` is in when it sees this
                // `Err` — see `fail_before_open` vs. `abort`.
                return Err(StatusCode::BadConnectionClosed);
            }
            Err(status) => {
                error!(channel_id = channel.secure_channel_id, %status, "transport error");
                return Err(status);
            }
        };

        channel.statistics.bytes_read += chunk.len() as u64;
        *pending_bytes_read += chunk.len() as u64;
        if pending_first_chunk_at.is_none() {
            *pending_first_chunk_at = Some(Instant::now());
        }

        let message = match builder.process_chunk(chunk) {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(()),
            Err(status) => {
                // Spec §7: "Decoder errors raised by the Message Builder
                // are treated as fatal transport errors."
                error!(channel_id = channel.secure_channel_id, %status, "decode error");
                return Err(status);
            }
        };

        let timing = TransactionTiming {
            received_first_chunk_at: pending_first_chunk_at.take().unwrap_or_else(Instant::now),
            received_last_chunk_at: Instant::now(),
            // Spec §4.4: "bytesRead... deltas since the previous
            // transaction" — every chunk read since the last completed
            // message (including any that didn't yet complete a message)
            // belongs to this one.
            bytes_read: std::mem::take(pending_bytes_read),
        };

        match message.msg_type {
            MessageType::Open => {
                self.handle_open(
                    channel, session, transport, builder, chunker, crypto, endpoints,
                    cert_validator, observer, message, timing,
                )
                .await?;
                if was_awaiting_opn {
                    self.state = LifecycleState::Open;
                }
                Ok(())
            }
            MessageType::Close => {
                info!(channel_id = channel.secure_channel_id, "received CLO, closing");
                Err(StatusCode::Good)
            }
            MessageType::Message => {
                if was_awaiting_opn {
                    // Step 1 of the handshake: the first message on a
                    // channel must be an OPN request.
                    return Err(StatusCode::BadCommunicationError);
                }
                if message.request_id == 0 {
                    return Err(StatusCode::BadCommunicationError);
                }
                observer.on_message(message);
                Ok(())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_open(
        &mut self,
        channel: &mut SecureChannel,
        session: &mut ChannelSession,
        transport: &mut dyn Transport,
        builder: &mut dyn MessageBuilder,
        chunker: &dyn MessageChunker,
        crypto: &dyn CryptoProvider,
        endpoints: &dyn EndpointRegistry,
        cert_validator: &CertificateValidator,
        observer: &mut dyn ChannelObserver,
        message: IncomingMessage,
        timing: TransactionTiming,
    ) -> Result<(), StatusCode> {
        let SecurityHeader::Asymmetric(asymmetric_header) = &message.security_header else {
            return Err(StatusCode::BadCommunicationError);
        };
        let asymmetric_header = asymmetric_header.clone();

        let request_handle = match &message.body {
            IncomingBody::OpenSecureChannel(r) => r.request_header.request_handle,
            _ => return Err(StatusCode::BadCommunicationError),
        };
        let request_id = message.request_id;

        let result = handshake::process(
            channel,
            &asymmetric_header,
            &message,
            endpoints,
            crypto,
            builder,
            cert_validator,
        )?;

        // The message builder is expected to reject a zero requestId
        // before handing a message up at all; this is the last line of
        // defense against the session's own `requestId > 0` assertion.
        let correlation = RequestCorrelation {
            request_id: request_id.max(1),
            request_handle,
        };

        let close_after_send = result.close_after_send;
        let outbound_header = result.outbound_security_header.clone();
        let service_result = match &result.response {
            HandshakeResponse::Open(response) => response.response_header.service_result,
            HandshakeResponse::Fault(fault) => fault.response_header.service_result,
        };
        let send_result = match result.response {
            HandshakeResponse::Open(response) => {
                session
                    .send_response(
                        channel,
                        MessageType::Open,
                        Box::new(response),
                        correlation,
                        timing,
                        Some(&outbound_header),
                        transport,
                        chunker,
                        crypto,
                        observer,
                    )
                    .await
            }
            HandshakeResponse::Fault(fault) => {
                session
                    .send_response(
                        channel,
                        MessageType::Open,
                        Box::new(fault),
                        correlation,
                        timing,
                        Some(&outbound_header),
                        transport,
                        chunker,
                        crypto,
                        observer,
                    )
                    .await
            }
        };

        send_result?;

        // Spec §4.3 step 15: "if the final serviceResult != Good, close the
        // channel after the response flushes."
        if close_after_send {
            transport.close().await;
            return Err(service_result);
        }

        Ok(())
    }

    /// `close()` (spec §4.1): instructs the transport to disconnect, then
    /// transitions to `Aborted`. Idempotent.
    pub async fn close(&mut self, transport: &mut dyn Transport, observer: &mut dyn ChannelObserver) {
        transport.close().await;
        self.abort(observer, StatusCode::Good);
    }

    /// Terminates the channel on a fatal error encountered before the first
    /// OPN ever completed successfully (spec §4.1: "transport error while
    /// awaiting OPN: init completes with that error; no abort event"). The
    /// upper layer learns about this failure from `init`'s return value
    /// alone, the same way it learns about the initial-OPN timeout.
    fn fail_before_open(&mut self, reason: StatusCode) -> StatusCode {
        self.state = LifecycleState::Aborted;
        reason
    }

    /// Internal transition to `Aborted`. Emits `abort` exactly once (spec
    /// §4.1, §5, §8 invariant); further calls are no-ops.
    fn abort(&mut self, observer: &mut dyn ChannelObserver, reason: StatusCode) -> StatusCode {
        self.state = LifecycleState::Aborted;
        if !self.abort_emitted {
            self.abort_emitted = true;
            observer.on_abort(reason);
        }
        reason
    }
}
