//! Certificate bundle verification against static PEM fixtures
//! (tests/fixtures/pki, generated with openssl; the leaf is signed by
//! ca.pem and carries CN kube-apiserver).

mod common;

use vault_harness::{CertificateBundle, HarnessError};

fn good_bundle() -> CertificateBundle {
    CertificateBundle::new(
        common::pki_fixture("leaf.pem"),
        common::pki_fixture("leaf-key.pem"),
        common::pki_fixture("ca.pem"),
    )
}

#[test]
fn valid_bundle_passes_every_check() {
    common::init_test_logging();
    good_bundle().verify("kube-apiserver").unwrap();
}

#[test]
fn pkcs1_encoded_key_is_accepted() {
    let bundle = CertificateBundle::new(
        common::pki_fixture("leaf.pem"),
        common::pki_fixture("leaf-key-pkcs1.pem"),
        common::pki_fixture("ca.pem"),
    );
    bundle.check_key_matches_certificate().unwrap();
}

#[test]
fn wrong_common_name_is_rejected() {
    let err = good_bundle().verify("etcd").unwrap_err();
    assert!(
        matches!(err, HarnessError::Verification { check } if check.contains("kube-apiserver"))
    );
}

#[test]
fn mismatched_key_is_rejected() {
    let bundle = CertificateBundle::new(
        common::pki_fixture("leaf.pem"),
        common::pki_fixture("other-key.pem"),
        common::pki_fixture("ca.pem"),
    );
    let err = bundle.check_key_matches_certificate().unwrap_err();
    assert!(matches!(err, HarnessError::Verification { check } if check.contains("does not match")));
}

#[test]
fn wrong_ca_is_rejected() {
    let bundle = CertificateBundle::new(
        common::pki_fixture("leaf.pem"),
        common::pki_fixture("leaf-key.pem"),
        common::pki_fixture("other-ca.pem"),
    );
    let err = bundle.check_signed_by_ca().unwrap_err();
    assert!(matches!(err, HarnessError::Verification { .. }));
}

#[test]
fn leaf_is_not_mistaken_for_a_ca() {
    let bundle = CertificateBundle::new(
        common::pki_fixture("leaf.pem"),
        common::pki_fixture("leaf-key.pem"),
        common::pki_fixture("leaf.pem"),
    );
    let err = bundle.check_ca_is_authority().unwrap_err();
    assert!(
        matches!(err, HarnessError::Verification { check } if check.contains("basic constraint"))
    );
}

#[test]
fn garbage_pem_is_a_verification_failure_not_a_panic() {
    let bundle = CertificateBundle::new("not a pem", "also not", "nope");
    let err = bundle.verify("kube-apiserver").unwrap_err();
    assert!(matches!(err, HarnessError::Verification { .. }));
}

#[test]
fn certificates_are_inside_their_validity_windows() {
    good_bundle().check_validity().unwrap();
}
