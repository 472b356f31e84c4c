/*
 * SPDX-FileCopyrightText: 2026 The bootverity developers
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::io::{Read, Seek};

use rsa::{RsaPrivateKey, RsaPublicKey};
use thiserror::Error;
use tracing::debug;
use x509_cert::Certificate;

use crate::{
    crypto::{self, CryptoProvider},
    format::{ext4, keystore::Keystore, verity},
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Ext4 error")]
    Ext4(#[from] ext4::Error),
    #[error("Verity metadata error")]
    Verity(#[from] verity::Error),
    #[error("Keystore error")]
    Keystore(#[from] crate::format::keystore::Error),
    #[error("Crypto error")]
    Crypto(#[from] crypto::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// The outcome of a signature check over a structurally valid input. A
/// structural failure is reported as an [`Error`] instead, so the three
/// cases remain distinguishable by callers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VerifyResult {
    Valid,
    Invalid,
}

/// Build a signed keystore from a certificate, a signing key, and a list of
/// DER-encoded public keys, returning the encoded result.
pub fn sign_keystore(
    certificate: Certificate,
    private_key: &RsaPrivateKey,
    public_keys: &[Vec<u8>],
    provider: &dyn CryptoProvider,
) -> Result<Vec<u8>> {
    let mut keystore = Keystore::new();

    for der in public_keys {
        keystore.add_public_key(der, provider)?;
    }

    keystore.attach_certificate(certificate)?;
    keystore.sign(private_key, provider)?;

    Ok(keystore.to_der()?)
}

/// Check the signature of an encoded keystore against the key in its own
/// embedded certificate.
pub fn verify_keystore(data: &[u8], provider: &dyn CryptoProvider) -> Result<bool> {
    let keystore = Keystore::from_der(data)?;

    Ok(keystore.verify(provider)?)
}

/// Verify the verity signature embedded in a raw (non-sparse) filesystem
/// image: locate the metadata block from the superblock geometry, then check
/// the table signature against `public_key`.
pub fn verify_image(
    mut reader: impl Read + Seek,
    public_key: &RsaPublicKey,
    provider: &dyn CryptoProvider,
) -> Result<VerifyResult> {
    let offset = ext4::payload_size(&mut reader)?;
    debug!("Expecting verity metadata at offset {offset}");

    let metadata = verity::Metadata::read_at(&mut reader, offset)?;
    debug!("Verity table is {} bytes", metadata.table.len());

    let algo = provider.algorithm_for_key(public_key)?;

    if provider.verify(public_key, &metadata.table, &metadata.signature, algo)? {
        Ok(VerifyResult::Valid)
    } else {
        Ok(VerifyResult::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Cursor, sync::OnceLock, time::Duration};

    use assert_matches::assert_matches;
    use pkcs8::EncodePublicKey;
    use rsa::RsaPrivateKey;

    use crate::crypto::RustCrypto;

    use super::*;

    fn test_key() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| crypto::generate_rsa_key_pair(2048).unwrap())
    }

    /// A minimal ext4-shaped image: a 4 KiB payload (4 blocks of 1 KiB) with
    /// the verity metadata block appended directly after it.
    fn build_image(table: &[u8], signature: &[u8]) -> Vec<u8> {
        let mut image = vec![0u8; 4096];
        image[0x438..0x43a].copy_from_slice(&crate::format::ext4::MAGIC.to_le_bytes());
        image[0x418..0x41c].copy_from_slice(&0u32.to_le_bytes());
        image[0x404..0x408].copy_from_slice(&4u32.to_le_bytes());
        image[0x550..0x554].copy_from_slice(&0u32.to_le_bytes());

        image.extend_from_slice(&verity::MAGIC.to_le_bytes());
        image.extend_from_slice(&verity::VERSION.to_le_bytes());
        image.extend_from_slice(signature);
        image.extend_from_slice(&(table.len() as u32).to_le_bytes());
        image.extend_from_slice(table);
        image
    }

    #[test]
    fn keystore_sign_verify_round_trip() {
        let cert =
            crypto::generate_cert(test_key(), 1, Duration::from_secs(3600), "CN=test").unwrap();
        let public_key_der = test_key()
            .to_public_key()
            .to_public_key_der()
            .unwrap()
            .into_vec();

        let encoded =
            sign_keystore(cert, test_key(), &[public_key_der], &RustCrypto).unwrap();

        assert!(verify_keystore(&encoded, &RustCrypto).unwrap());
    }

    #[test]
    fn verify_image_valid_and_tampered() {
        let table = b"1 /dev/sda1 /dev/sda1 4096 4096 1024 1025 sha256 abc123 def456";
        let signature = RustCrypto.sign(test_key(), table).unwrap();

        let image = build_image(table, &signature);
        let result =
            verify_image(Cursor::new(&image), &test_key().to_public_key(), &RustCrypto).unwrap();
        assert_eq!(result, VerifyResult::Valid);

        // Corrupt one signature byte. The image stays structurally valid, so
        // this must surface as Invalid rather than an error.
        let mut tampered = image.clone();
        tampered[4096 + 8] ^= 0x01;
        let result =
            verify_image(Cursor::new(&tampered), &test_key().to_public_key(), &RustCrypto)
                .unwrap();
        assert_eq!(result, VerifyResult::Invalid);

        // Corrupt a table byte instead.
        let mut tampered = image;
        let table_start = 4096 + 8 + 256 + 4;
        tampered[table_start] ^= 0x01;
        let result =
            verify_image(Cursor::new(&tampered), &test_key().to_public_key(), &RustCrypto)
                .unwrap();
        assert_eq!(result, VerifyResult::Invalid);
    }

    #[test]
    fn verify_image_bad_superblock_is_structural() {
        let table = b"table";
        let signature = RustCrypto.sign(test_key(), table).unwrap();

        let mut image = build_image(table, &signature);
        image[0x438..0x43a].copy_from_slice(&0u16.to_le_bytes());

        let err = verify_image(Cursor::new(&image), &test_key().to_public_key(), &RustCrypto)
            .unwrap_err();
        assert_matches!(err, Error::Ext4(ext4::Error::CorruptImage(0)));
    }
}
