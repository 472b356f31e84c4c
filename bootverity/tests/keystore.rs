/*
 * SPDX-FileCopyrightText: 2026 The bootverity developers
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::time::Duration;

use assert_matches::assert_matches;
use pkcs8::EncodePublicKey;
use rsa::RsaPrivateKey;

use bootverity::{
    crypto::{self, RustCrypto},
    format::keystore::{Error, Keystore},
    ops,
};

fn get_test_key() -> RsaPrivateKey {
    crypto::generate_rsa_key_pair(2048).unwrap()
}

#[test]
fn round_trip_keystore() {
    let key = get_test_key();
    let cert = crypto::generate_cert(&key, 1, Duration::from_secs(3600), "CN=bootverity test")
        .unwrap();

    let trusted = get_test_key();
    let trusted_der = trusted
        .to_public_key()
        .to_public_key_der()
        .unwrap()
        .into_vec();

    let encoded = ops::sign_keystore(cert, &key, &[trusted_der], &RustCrypto).unwrap();

    assert!(ops::verify_keystore(&encoded, &RustCrypto).unwrap());

    // The parsed key bag must preserve insertion order and key material.
    let keystore = Keystore::from_der(&encoded).unwrap();
    assert_eq!(keystore.key_bag().len(), 1);
    assert_eq!(
        keystore.key_bag()[0].public_key().unwrap(),
        trusted.to_public_key(),
    );
}

#[test]
fn garbage_input_is_malformed() {
    assert_matches!(
        Keystore::from_der(b"not a keystore"),
        Err(Error::MalformedEncoding(_))
    );
}
