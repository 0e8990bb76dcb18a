// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The handshake state machine (spec §4.3): processes an
//! `OpenSecureChannelRequest`, derives keys, installs a new token, and
//! builds the OPN response.

use async_opcua_types::{
    AsymmetricSecurityHeader, ChannelSecurityToken, MessageSecurityMode, OpenSecureChannelRequest,
    OpenSecureChannelResponse, ResponseHeader, SecurityPolicy, SecurityTokenRequestType,
    ServiceFault, StatusCode,
};
use tracing::{debug, trace, warn};

use crate::{
    certificate::CertificateValidator,
    channel::SecureChannel,
    collaborators::{CryptoProvider, EndpointRegistry, IncomingBody, IncomingMessage, MessageBuilder},
    security_header,
};

/// Either a (possibly degraded) OPN response, or a fault sent in its
/// place (spec §4.3 step 14).
#[derive(Debug)]
pub enum HandshakeResponse {
    Open(OpenSecureChannelResponse),
    Fault(ServiceFault),
}

#[derive(Debug)]
pub struct HandshakeResult {
    pub response: HandshakeResponse,
    /// Spec §4.3 step 15 / §7: the channel must close after this response
    /// flushes whenever the final result was not `Good`.
    pub close_after_send: bool,
    /// The asymmetric header the OPN response must be chunked with (spec
    /// §4.3 step 11, §4.6), even when the response is a `ServiceFault`.
    pub outbound_security_header: AsymmetricSecurityHeader,
}

/// Entry point (spec §4.3). Returns `Err(status)` for the one failure mode
/// that has no well-formed response to send at all: the first decoded
/// message on the channel was not an `OpenSecureChannelRequest` (step 1).
/// Every other failure is reported inside a `HandshakeResult`.
pub fn process(
    channel: &mut SecureChannel,
    asymmetric_header: &AsymmetricSecurityHeader,
    message: &IncomingMessage,
    endpoints: &dyn EndpointRegistry,
    crypto: &dyn CryptoProvider,
    message_builder: &mut dyn MessageBuilder,
    cert_validator: &CertificateValidator,
) -> Result<HandshakeResult, StatusCode> {
    let request = match &message.body {
        IncomingBody::OpenSecureChannel(r) => r,
        _ => return Err(StatusCode::BadCommunicationError),
    };

    Ok(process_request(
        channel,
        asymmetric_header,
        request,
        endpoints,
        crypto,
        message_builder,
        cert_validator,
    ))
}

fn process_request(
    channel: &mut SecureChannel,
    asymmetric_header: &AsymmetricSecurityHeader,
    request: &OpenSecureChannelRequest,
    endpoints: &dyn EndpointRegistry,
    crypto: &dyn CryptoProvider,
    message_builder: &mut dyn MessageBuilder,
    cert_validator: &CertificateValidator,
) -> HandshakeResult {
    let request_header = &request.request_header;

    // Step 2: validate security policy.
    let Some(policy) = SecurityPolicy::from_uri(&asymmetric_header.security_policy_uri) else {
        warn!(
            "rejecting unrecognised security policy uri {}",
            asymmetric_header.security_policy_uri
        );
        return fault(
            request_header,
            StatusCode::BadSecurityPolicyRejected,
            AsymmetricSecurityHeader::none(),
        );
    };

    // Step 3: adopt requested security mode.
    let mode = request.security_mode;
    channel.security_mode = mode;
    channel.security_policy = policy;
    message_builder.set_security_mode(mode);

    // Step 4: endpoint check.
    if !endpoints.supports(mode, policy) {
        warn!("no endpoint supports (mode={:?}, policy={:?})", mode, policy);
        return fault(
            request_header,
            StatusCode::BadSecurityPolicyRejected,
            AsymmetricSecurityHeader::none(),
        );
    }

    // Step 5: cache client certificate, derive receiver public key length.
    channel.client_security_header = Some(asymmetric_header.clone());
    match asymmetric_header.sender_certificate.value() {
        Some(der) if !der.is_empty() => {
            channel.receiver_public_key_length = crypto.public_key_length(der).ok();
            channel.client_certificate = crypto.parse_certificate(der).ok();
        }
        _ => {
            channel.receiver_public_key_length = None;
            channel.client_certificate = None;
        }
    }

    // Step 6: capture client nonce.
    channel.client_nonce = request
        .client_nonce
        .value()
        .map(|v| v.to_vec())
        .unwrap_or_default();

    // Step 7 + 8: revised lifetime and token allocation.
    let token = match request.request_type {
        SecurityTokenRequestType::Issue => {
            trace!("request type == issue");
            channel.tokens.issue(request.requested_lifetime)
        }
        SecurityTokenRequestType::Renew => {
            trace!("request type == renew");
            channel.tokens.renew(request.requested_lifetime)
        }
    };

    // Step 9: server nonce and derived keys.
    let mut service_result = StatusCode::Good;
    if policy == SecurityPolicy::None {
        channel.server_nonce.clear();
        channel.derived_keys = None;
    } else {
        let server_nonce = crypto.random_bytes(policy.symmetric_key_size());
        if channel.client_nonce.len() != server_nonce.len() {
            warn!(
                "nonce length mismatch: client {} vs server {}",
                channel.client_nonce.len(),
                server_nonce.len()
            );
            service_result = StatusCode::BadSecurityModeRejected;
            channel.derived_keys = None;
        } else {
            let server_keys = crypto.derive_keys(&server_nonce, &channel.client_nonce, policy);
            let client_keys = crypto.derive_keys(&channel.client_nonce, &server_nonce, policy);
            channel.derived_keys = Some((server_keys, client_keys));
        }
        channel.server_nonce = server_nonce;
    }

    // Step 10: install new inbound token with the derived client keys.
    let inbound_keys = channel
        .derived_keys
        .as_ref()
        .map(|(_, client_keys)| client_keys.clone());
    message_builder.install_inbound_token(token.token_id, inbound_keys);

    // Step 11: outbound asymmetric security header.
    let outbound_header = security_header::build_asymmetric_header(
        mode,
        policy,
        endpoints.server_certificate_der(),
        channel.client_certificate.as_ref().map(|c| c.der.as_slice()),
        crypto,
    );

    // Step 12: the chunker is stateless here (security options are passed
    // per outbound message by the channel session), so there is no
    // persistent "install" step to perform beyond having computed
    // `outbound_header` and `channel.derived_keys` above.

    // Step 13: verify thumbprints.
    if service_result.is_good() && mode != MessageSecurityMode::None {
        let expected = crypto.sha1_thumbprint(endpoints.server_certificate_der());
        let matches = asymmetric_header
            .receiver_certificate_thumbprint
            .value()
            .map(|actual| hex_eq(actual, &expected))
            .unwrap_or(false);
        if !matches {
            warn!("receiver certificate thumbprint mismatch");
            service_result = StatusCode::BadCertificateInvalid;
        }
    }

    // Step 14: client certificate presence and validity window. Takes
    // precedence over step 13: it replaces the response with a
    // ServiceFault rather than a degraded OPN response. Spec §7: "Missing
    // cert | BadSecurityChecksFailed | Cert required but absent" sits
    // alongside the validity-window check, both only binding when the
    // negotiated mode actually requires a certificate.
    let cert_status = cert_validator.validate(channel.client_certificate.as_ref());
    if mode != MessageSecurityMode::None
        && matches!(
            cert_status,
            StatusCode::BadCertificateTimeInvalid | StatusCode::BadSecurityChecksFailed
        )
    {
        debug!(%cert_status, "client certificate failed presence/validity check");
        return fault(request_header, cert_status, outbound_header);
    }

    // Step 15: send response, closing afterwards if the result was bad.
    let response_header = if service_result.is_good() {
        ResponseHeader::new_good(request_header)
    } else {
        ResponseHeader::new_error(request_header, service_result)
    };

    let response = OpenSecureChannelResponse {
        response_header,
        server_protocol_version: channel.protocol_version,
        security_token: ChannelSecurityToken {
            channel_id: channel.secure_channel_id,
            token_id: token.token_id,
            created_at: token.created_at,
            revised_lifetime: token.revised_life_time,
        },
        server_nonce: channel.server_nonce.clone().into(),
    };

    HandshakeResult {
        close_after_send: service_result.is_bad(),
        response: HandshakeResponse::Open(response),
        outbound_security_header: outbound_header,
    }
}

fn fault(
    request_header: &async_opcua_types::RequestHeader,
    status: StatusCode,
    outbound_security_header: AsymmetricSecurityHeader,
) -> HandshakeResult {
    HandshakeResult {
        response: HandshakeResponse::Fault(ServiceFault::new(request_header, status)),
        close_after_send: true,
        outbound_security_header,
    }
}

/// Byte-exact thumbprint comparison (spec §4.3 step 13: "hex form, both
/// sides lowercase" is equivalent to a raw byte-for-byte comparison of
/// the two 20-byte SHA-1 digests).
fn hex_eq(a: &[u8], b: &[u8]) -> bool {
    a == b
}

#[cfg(test)]
mod tests {
    use async_opcua_types::{ByteString, DateTime, RequestHeader, SecurityHeader};

    use super::*;
    use crate::{
        collaborators::IncomingBody,
        test_support::{FakeCrypto, FakeEndpointRegistry, FakeMessageBuilder},
    };

    const SERVER_CERT: &[u8] = b"server-certificate-der";
    const CLIENT_CERT: &[u8] = b"client-certificate-der";

    fn incoming(
        request: OpenSecureChannelRequest,
        header: AsymmetricSecurityHeader,
    ) -> IncomingMessage {
        IncomingMessage {
            msg_type: async_opcua_types::MessageType::Open,
            request_id: 1,
            secure_channel_id: 1,
            security_header: SecurityHeader::Asymmetric(header),
            body: IncomingBody::OpenSecureChannel(request),
        }
    }

    fn request(
        mode: MessageSecurityMode,
        nonce_len: usize,
        requested_lifetime: u32,
    ) -> OpenSecureChannelRequest {
        OpenSecureChannelRequest {
            request_header: RequestHeader {
                request_handle: 77,
                ..Default::default()
            },
            client_protocol_version: 0,
            request_type: SecurityTokenRequestType::Issue,
            security_mode: mode,
            client_nonce: ByteString::from(vec![0x11; nonce_len]),
            requested_lifetime,
        }
    }

    fn valid_client_cert() -> async_opcua_types::Certificate {
        async_opcua_types::Certificate::new(
            CLIENT_CERT.to_vec(),
            DateTime::now() - chrono::Duration::hours(1),
            DateTime::now() + chrono::Duration::hours(1),
        )
    }

    #[test]
    fn scenario_1_policy_none_successful_open() {
        let mut channel = SecureChannel::new(1, 600_000);
        let header = AsymmetricSecurityHeader::none();
        let req = request(MessageSecurityMode::None, 0, 0);
        let message = incoming(req, header.clone());

        let crypto = FakeCrypto::new();
        let endpoints = FakeEndpointRegistry::new(SERVER_CERT.to_vec());
        let mut builder = FakeMessageBuilder::new();
        let validator = CertificateValidator::new();

        let result = process(
            &mut channel, &header, &message, &endpoints, &crypto, &mut builder, &validator,
        )
        .unwrap();

        match result.response {
            HandshakeResponse::Open(response) => {
                assert!(response.response_header.service_result.is_good());
                assert_eq!(response.security_token.token_id, 1);
                assert_eq!(response.security_token.revised_lifetime, 600_000);
                assert!(response.server_nonce.is_empty());
            }
            HandshakeResponse::Fault(_) => panic!("expected an OPN response"),
        }
        assert!(!result.close_after_send);
        assert!(channel.security_invariant_holds());
    }

    #[test]
    fn scenario_2_unknown_policy_rejected() {
        let mut channel = SecureChannel::new(1, 600_000);
        let header = AsymmetricSecurityHeader {
            security_policy_uri: "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss"
                .to_owned(),
            sender_certificate: ByteString::null(),
            receiver_certificate_thumbprint: ByteString::null(),
        };
        let req = request(MessageSecurityMode::Sign, 32, 0);
        let message = incoming(req, header.clone());

        let crypto = FakeCrypto::new();
        let endpoints = FakeEndpointRegistry::new(SERVER_CERT.to_vec());
        let mut builder = FakeMessageBuilder::new();
        let validator = CertificateValidator::new();

        let result = process(
            &mut channel, &header, &message, &endpoints, &crypto, &mut builder, &validator,
        )
        .unwrap();

        match result.response {
            HandshakeResponse::Fault(fault) => {
                assert_eq!(
                    fault.response_header.service_result,
                    StatusCode::BadSecurityPolicyRejected
                );
            }
            HandshakeResponse::Open(_) => panic!("expected a fault"),
        }
        assert!(result.close_after_send);
    }

    #[test]
    fn scenario_3_thumbprint_mismatch_under_sign_and_encrypt() {
        let mut channel = SecureChannel::new(1, 600_000);
        let header = AsymmetricSecurityHeader {
            security_policy_uri: SecurityPolicy::Basic256.as_uri().to_owned(),
            sender_certificate: ByteString::from(CLIENT_CERT.to_vec()),
            receiver_certificate_thumbprint: ByteString::from(vec![0xAA; 20]),
        };
        let req = request(MessageSecurityMode::SignAndEncrypt, 32, 0);
        let message = incoming(req, header.clone());

        let crypto = FakeCrypto::new().with_certificate(CLIENT_CERT.to_vec(), valid_client_cert());
        let endpoints = FakeEndpointRegistry::new(SERVER_CERT.to_vec());
        let mut builder = FakeMessageBuilder::new();
        let validator = CertificateValidator::new();

        let result = process(
            &mut channel, &header, &message, &endpoints, &crypto, &mut builder, &validator,
        )
        .unwrap();

        match result.response {
            HandshakeResponse::Open(response) => {
                assert_eq!(
                    response.response_header.service_result,
                    StatusCode::BadCertificateInvalid
                );
            }
            HandshakeResponse::Fault(_) => panic!("expected a degraded OPN response, not a fault"),
        }
        assert!(result.close_after_send);
    }

    #[test]
    fn scenario_4_expired_client_certificate() {
        let mut channel = SecureChannel::new(1, 600_000);
        let expired = async_opcua_types::Certificate::new(
            CLIENT_CERT.to_vec(),
            DateTime::now() - chrono::Duration::hours(2),
            DateTime::now() - chrono::Duration::hours(1),
        );
        let crypto = FakeCrypto::new().with_certificate(CLIENT_CERT.to_vec(), expired);
        let endpoints = FakeEndpointRegistry::new(SERVER_CERT.to_vec());
        let thumbprint = crypto.sha1_thumbprint(SERVER_CERT);

        let header = AsymmetricSecurityHeader {
            security_policy_uri: SecurityPolicy::Basic256.as_uri().to_owned(),
            sender_certificate: ByteString::from(CLIENT_CERT.to_vec()),
            receiver_certificate_thumbprint: ByteString::from(thumbprint.to_vec()),
        };
        let req = request(MessageSecurityMode::SignAndEncrypt, 32, 0);
        let message = incoming(req, header.clone());
        let mut builder = FakeMessageBuilder::new();
        let validator = CertificateValidator::new();

        let result = process(
            &mut channel, &header, &message, &endpoints, &crypto, &mut builder, &validator,
        )
        .unwrap();

        match result.response {
            HandshakeResponse::Fault(fault) => {
                assert_eq!(
                    fault.response_header.service_result,
                    StatusCode::BadCertificateTimeInvalid
                );
            }
            HandshakeResponse::Open(_) => panic!("expected a fault"),
        }
        assert!(result.close_after_send);
    }

    #[test]
    fn scenario_4b_missing_client_certificate_under_sign() {
        let mut channel = SecureChannel::new(1, 600_000);
        let crypto = FakeCrypto::new();
        let endpoints = FakeEndpointRegistry::new(SERVER_CERT.to_vec());
        let thumbprint = crypto.sha1_thumbprint(SERVER_CERT);

        let header = AsymmetricSecurityHeader {
            security_policy_uri: SecurityPolicy::Basic256.as_uri().to_owned(),
            // No sender certificate at all, even though the negotiated
            // mode requires one.
            sender_certificate: ByteString::null(),
            receiver_certificate_thumbprint: ByteString::from(thumbprint.to_vec()),
        };
        let req = request(MessageSecurityMode::Sign, 32, 0);
        let message = incoming(req, header.clone());
        let mut builder = FakeMessageBuilder::new();
        let validator = CertificateValidator::new();

        let result = process(
            &mut channel, &header, &message, &endpoints, &crypto, &mut builder, &validator,
        )
        .unwrap();

        match result.response {
            HandshakeResponse::Fault(fault) => {
                assert_eq!(
                    fault.response_header.service_result,
                    StatusCode::BadSecurityChecksFailed
                );
            }
            HandshakeResponse::Open(_) => panic!("expected a fault"),
        }
        assert!(result.close_after_send);
    }

    #[test]
    fn scenario_5_nonce_length_mismatch() {
        let mut channel = SecureChannel::new(1, 600_000);
        // A present, valid client certificate — this scenario isolates the
        // nonce-length check (step 9), not certificate presence (step 14).
        let header = AsymmetricSecurityHeader {
            security_policy_uri: SecurityPolicy::Basic128Rsa15.as_uri().to_owned(),
            sender_certificate: ByteString::from(CLIENT_CERT.to_vec()),
            receiver_certificate_thumbprint: ByteString::null(),
        };
        // Basic128Rsa15's symmetric key size is 16 bytes; send an 8-byte nonce.
        let req = request(MessageSecurityMode::Sign, 8, 0);
        let message = incoming(req, header.clone());

        let crypto = FakeCrypto::new().with_certificate(CLIENT_CERT.to_vec(), valid_client_cert());
        let endpoints = FakeEndpointRegistry::new(SERVER_CERT.to_vec());
        let mut builder = FakeMessageBuilder::new();
        let validator = CertificateValidator::new();

        let result = process(
            &mut channel, &header, &message, &endpoints, &crypto, &mut builder, &validator,
        )
        .unwrap();

        match result.response {
            HandshakeResponse::Open(response) => {
                assert_eq!(
                    response.response_header.service_result,
                    StatusCode::BadSecurityModeRejected
                );
            }
            HandshakeResponse::Fault(_) => panic!("expected a degraded OPN response, not a fault"),
        }
        assert!(result.close_after_send);
        assert!(channel.derived_keys.is_none());
    }

    #[test]
    fn scenario_6_renewal_allocates_next_token_and_preserves_request_handle() {
        let mut channel = SecureChannel::new(1, 600_000);
        let header = AsymmetricSecurityHeader::none();
        let crypto = FakeCrypto::new();
        let endpoints = FakeEndpointRegistry::new(SERVER_CERT.to_vec());
        let mut builder = FakeMessageBuilder::new();
        let validator = CertificateValidator::new();

        let first = request(MessageSecurityMode::None, 0, 0);
        let message = incoming(first, header.clone());
        let first_result = process(
            &mut channel, &header, &message, &endpoints, &crypto, &mut builder, &validator,
        )
        .unwrap();
        let HandshakeResponse::Open(first_response) = first_result.response else {
            panic!("expected an OPN response");
        };
        assert_eq!(first_response.security_token.token_id, 1);

        let mut renew = request(MessageSecurityMode::None, 0, 0);
        renew.request_type = SecurityTokenRequestType::Renew;
        renew.request_header.request_handle = 99;
        let message = incoming(renew, header.clone());
        let renew_result = process(
            &mut channel, &header, &message, &endpoints, &crypto, &mut builder, &validator,
        )
        .unwrap();

        match renew_result.response {
            HandshakeResponse::Open(response) => {
                assert_eq!(response.security_token.token_id, 2);
                assert_eq!(response.response_header.request_handle, 99);
            }
            HandshakeResponse::Fault(_) => panic!("expected an OPN response"),
        }
        assert!(!renew_result.close_after_send);
    }
}
