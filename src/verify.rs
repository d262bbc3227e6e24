//! Verification of the certificate material a scenario produces.
//!
//! A cert scenario emits three PEM artifacts: the leaf certificate, its
//! private key and the issuing CA. Each check here answers one question
//! (does the key match, did this CA sign it, is it currently valid) and
//! fails with a [`HarnessError::Verification`] naming the check, so a test
//! failure reads as a statement about the material rather than a parser
//! backtrace.

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::debug;
use x509_parser::certificate::X509Certificate;
use x509_parser::pem::{Pem, parse_x509_pem};

use crate::errors::{HarnessError, HarnessResult};
use crate::scenario::ScenarioOutcome;

/// The three PEM artifacts of one issued certificate.
#[derive(Debug, Clone)]
pub struct CertificateBundle {
    pub cert_pem: String,
    pub key_pem: String,
    pub ca_pem: String,
}

impl CertificateBundle {
    pub fn new(
        cert_pem: impl Into<String>,
        key_pem: impl Into<String>,
        ca_pem: impl Into<String>,
    ) -> Self {
        Self {
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
            ca_pem: ca_pem.into(),
        }
    }

    /// Collect the bundle from a cert scenario's artifacts, given the same
    /// path prefix the scenario was invoked with.
    pub fn from_outcome(outcome: &ScenarioOutcome, prefix: &str) -> HarnessResult<Self> {
        Ok(Self {
            cert_pem: outcome.artifact_utf8(&format!("{prefix}.pem"))?,
            key_pem: outcome.artifact_utf8(&format!("{prefix}-key.pem"))?,
            ca_pem: outcome.artifact_utf8(&format!("{prefix}-ca.pem"))?,
        })
    }

    /// Run every check: leaf parses with the expected common name, the
    /// private key matches the leaf, the CA is a CA, the CA signed the
    /// leaf, and both certificates are inside their validity windows.
    pub fn verify(&self, expected_common_name: &str) -> HarnessResult<()> {
        self.check_common_name(expected_common_name)?;
        self.check_key_matches_certificate()?;
        self.check_ca_is_authority()?;
        self.check_signed_by_ca()?;
        self.check_validity()?;
        debug!(common_name = expected_common_name, "certificate bundle verified");
        Ok(())
    }

    /// The leaf certificate carries the requested common name.
    pub fn check_common_name(&self, expected: &str) -> HarnessResult<()> {
        let pem = parse_pem("leaf certificate", &self.cert_pem)?;
        let cert = parse_cert("leaf certificate", &pem)?;

        let found = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok());
        match found {
            Some(cn) if cn == expected => Ok(()),
            Some(cn) => Err(verification(format!(
                "leaf common name is '{cn}', expected '{expected}'"
            ))),
            None => Err(verification("leaf certificate has no common name")),
        }
    }

    /// The private key artifact is the key of the leaf certificate.
    ///
    /// Compared via the DER encoding of the derived public key against the
    /// certificate's subject public key info.
    pub fn check_key_matches_certificate(&self) -> HarnessResult<()> {
        let key = parse_private_key(&self.key_pem)?;
        let public = RsaPublicKey::from(&key);
        let spki = public
            .to_public_key_der()
            .map_err(|err| verification(format!("private key re-encoding failed: {err}")))?;

        let pem = parse_pem("leaf certificate", &self.cert_pem)?;
        let cert = parse_cert("leaf certificate", &pem)?;

        if cert.public_key().raw == spki.as_bytes() {
            Ok(())
        } else {
            Err(verification(
                "private key does not match the leaf certificate's public key",
            ))
        }
    }

    /// The CA artifact is actually a certificate authority.
    pub fn check_ca_is_authority(&self) -> HarnessResult<()> {
        let pem = parse_pem("CA certificate", &self.ca_pem)?;
        let ca = parse_cert("CA certificate", &pem)?;

        match ca.basic_constraints() {
            Ok(Some(constraints)) if constraints.value.ca => Ok(()),
            Ok(_) => Err(verification(
                "CA certificate does not assert the CA basic constraint",
            )),
            Err(err) => Err(verification(format!(
                "CA basic constraints unreadable: {err}"
            ))),
        }
    }

    /// The CA issued and signed the leaf certificate.
    pub fn check_signed_by_ca(&self) -> HarnessResult<()> {
        let leaf_pem = parse_pem("leaf certificate", &self.cert_pem)?;
        let leaf = parse_cert("leaf certificate", &leaf_pem)?;
        let ca_pem = parse_pem("CA certificate", &self.ca_pem)?;
        let ca = parse_cert("CA certificate", &ca_pem)?;

        if leaf.issuer().as_raw() != ca.subject().as_raw() {
            return Err(verification(format!(
                "leaf issuer '{}' is not the CA subject '{}'",
                leaf.issuer(),
                ca.subject()
            )));
        }

        leaf.verify_signature(Some(ca.public_key()))
            .map_err(|err| verification(format!("leaf signature check against CA failed: {err}")))
    }

    /// Both certificates are currently inside their validity windows.
    pub fn check_validity(&self) -> HarnessResult<()> {
        for (label, text) in [
            ("leaf certificate", &self.cert_pem),
            ("CA certificate", &self.ca_pem),
        ] {
            let pem = parse_pem(label, text)?;
            let cert = parse_cert(label, &pem)?;
            if !cert.validity().is_valid() {
                return Err(verification(format!(
                    "{label} is outside its validity window ({} to {})",
                    cert.validity().not_before,
                    cert.validity().not_after
                )));
            }
        }
        Ok(())
    }
}

fn verification(check: impl Into<String>) -> HarnessError {
    HarnessError::Verification {
        check: check.into(),
    }
}

fn parse_pem(label: &str, text: &str) -> HarnessResult<Pem> {
    let (_, pem) = parse_x509_pem(text.as_bytes())
        .map_err(|err| verification(format!("{label} is not valid PEM: {err}")))?;
    Ok(pem)
}

fn parse_cert<'a>(label: &str, pem: &'a Pem) -> HarnessResult<X509Certificate<'a>> {
    pem.parse_x509()
        .map_err(|err| verification(format!("{label} is not a valid certificate: {err}")))
}

/// Accepts both PKCS#1 (`BEGIN RSA PRIVATE KEY`) and PKCS#8
/// (`BEGIN PRIVATE KEY`) encodings; issuers emit either.
fn parse_private_key(pem: &str) -> HarnessResult<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
        .map_err(|err| verification(format!("private key is not parseable RSA: {err}")))
}
