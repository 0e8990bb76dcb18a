// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Certificate validity-window checking (spec §4.5).
//!
//! Revocation checking, trust-list management, chain path validation
//! beyond the immediate certificate, and hostname/URI cross-checks are
//! explicit non-goals (spec §1, §9) and remain hooks here, each traced at
//! `trace!` so it is visible in logs that the check was skipped rather
//! than silently passed.

use async_opcua_types::{Certificate, DateTime, StatusCode};
use tracing::trace;

/// Validates a client certificate against the rules this crate owns:
/// presence and validity window. Everything else is a hook.
#[derive(Debug, Default)]
pub struct CertificateValidator;

impl CertificateValidator {
    pub fn new() -> Self {
        Self
    }

    /// Spec §4.5:
    /// - missing certificate -> `BadSecurityChecksFailed`
    /// - `now < notBefore` or `now >= notAfter` -> `BadCertificateTimeInvalid`
    /// - otherwise -> `Good`.
    pub fn validate(&self, cert: Option<&Certificate>) -> StatusCode {
        let Some(cert) = cert else {
            return StatusCode::BadSecurityChecksFailed;
        };

        if !cert.is_valid_at(DateTime::now()) {
            return StatusCode::BadCertificateTimeInvalid;
        }

        self.check_revocation(cert);
        self.check_trust(cert);
        self.check_uri(cert);

        StatusCode::Good
    }

    /// Hook: certificate revocation checking (CRL/OCSP). Not implemented
    /// (spec §1 Non-goals).
    fn check_revocation(&self, _cert: &Certificate) {
        trace!("certificate revocation check skipped (not implemented)");
    }

    /// Hook: trust-list / issuer chain validation beyond the immediate
    /// certificate's validity window. Not implemented (spec §1 Non-goals).
    fn check_trust(&self, _cert: &Certificate) {
        trace!("certificate trust-chain check skipped (not implemented)");
    }

    /// Hook: hostname/application-URI cross-check against the
    /// certificate's subject alternative name. Not implemented (spec §1
    /// Non-goals).
    fn check_uri(&self, _cert: &Certificate) {
        trace!("certificate URI cross-check skipped (not implemented)");
    }
}
