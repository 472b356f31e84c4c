/*
 * SPDX-FileCopyrightText: 2026 The bootverity developers
 * SPDX-License-Identifier: GPL-3.0-only
 */

//! The boot keystore is a signed DER container of trusted public keys:
//!
//! ```text
//! BootKeystore  ::= SEQUENCE {
//!     formatVersion INTEGER,
//!     keyBag        SEQUENCE OF BootKey,
//!     signature     SignatureEnvelope
//! }
//! BootKey       ::= SEQUENCE { algorithm AlgorithmIdentifier, publicKey RSAPublicKey }
//! RSAPublicKey  ::= SEQUENCE { modulus INTEGER, publicExponent INTEGER }
//! SignatureEnvelope ::= SEQUENCE {
//!     length       INTEGER,
//!     rawSignature OCTET STRING,
//!     algorithm    AlgorithmIdentifier,
//!     certificate  Certificate
//! }
//! ```
//!
//! The signature covers the canonical DER encoding of `(formatVersion,
//! keyBag)` only. The envelope and the certificate are never part of the
//! signed region, and reordering keys in the bag invalidates an existing
//! signature.

use der::{
    asn1::{OctetString, Uint},
    Decode, Encode, Sequence,
};
use rsa::{traits::PublicKeyParts, BigUint, RsaPrivateKey, RsaPublicKey};
use thiserror::Error;
use x509_cert::{spki::AlgorithmIdentifierOwned, Certificate};

use crate::crypto::{self, CryptoProvider, SignatureAlgorithm};

pub const FORMAT_VERSION: u64 = 0;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unsupported keystore format version: {0}")]
    UnsupportedFormatVersion(u64),
    #[error("Operation {op:?} is invalid in keystore state {state:?}")]
    InvalidStateTransition { op: &'static str, state: State },
    #[error("Invalid RSA public key")]
    InvalidKey(#[source] rsa::Error),
    #[error("Malformed DER encoding")]
    MalformedEncoding(#[from] der::Error),
    #[error("Crypto error")]
    Crypto(#[from] crypto::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// `RSAPublicKey` from PKCS#1: the modulus and public exponent as
/// arbitrary-precision integers.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct RsaKeyMaterial {
    pub modulus: Uint,
    pub public_exponent: Uint,
}

impl RsaKeyMaterial {
    pub fn from_key(key: &RsaPublicKey) -> Result<Self> {
        Ok(Self {
            modulus: Uint::new(&key.n().to_bytes_be())?,
            public_exponent: Uint::new(&key.e().to_bytes_be())?,
        })
    }

    pub fn to_key(&self) -> Result<RsaPublicKey> {
        RsaPublicKey::new(
            BigUint::from_bytes_be(self.modulus.as_bytes()),
            BigUint::from_bytes_be(self.public_exponent.as_bytes()),
        )
        .map_err(Error::InvalidKey)
    }
}

/// One trusted public key in the key bag, paired with the signature
/// algorithm identifier derived from the key.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct BootKey {
    pub algorithm: AlgorithmIdentifierOwned,
    pub key_material: RsaKeyMaterial,
}

impl BootKey {
    /// Build an entry from a public key. The algorithm identifier is derived
    /// deterministically from the key via the crypto provider; this module
    /// does not choose digest algorithms itself.
    pub fn from_public_key(key: &RsaPublicKey, provider: &dyn CryptoProvider) -> Result<Self> {
        let algorithm = provider.algorithm_for_key(key)?.to_identifier();

        Ok(Self {
            algorithm,
            key_material: RsaKeyMaterial::from_key(key)?,
        })
    }

    pub fn public_key(&self) -> Result<RsaPublicKey> {
        self.key_material.to_key()
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        Encode::to_der(self).map_err(Error::MalformedEncoding)
    }

    pub fn from_der(data: &[u8]) -> Result<Self> {
        <Self as Decode>::from_der(data).map_err(Error::MalformedEncoding)
    }
}

/// A detached signature over the canonical key bag encoding. The field order
/// is part of the wire format and must not change.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct SignatureEnvelope {
    /// Byte length of the canonical data the signature covers. Stored so a
    /// verifier need not assume it, but always cross-checked against the
    /// actual key bag encoding.
    pub length: u64,
    pub raw_signature: OctetString,
    pub algorithm: AlgorithmIdentifierOwned,
    pub certificate: Certificate,
}

impl SignatureEnvelope {
    /// Extract the signer's public key from the embedded certificate.
    pub fn public_key(&self) -> Result<RsaPublicKey> {
        crypto::get_public_key(&self.certificate).map_err(Error::Crypto)
    }
}

/// The signed region: `(formatVersion, keyBag)` and nothing else.
#[derive(Clone, Debug, Sequence)]
struct InnerKeystore {
    format_version: u64,
    key_bag: Vec<BootKey>,
}

/// The full on-disk structure.
#[derive(Clone, Debug, Sequence)]
struct RawKeystore {
    format_version: u64,
    key_bag: Vec<BootKey>,
    signature: SignatureEnvelope,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Empty,
    KeysAdded,
    CertificateAttached,
    Signed,
}

/// A boot keystore, built incrementally when signing and in one shot when
/// parsing. The builder enforces the lifecycle `Empty -> KeysAdded ->
/// CertificateAttached -> Signed`; once signed, a keystore is immutable and
/// re-signing requires rebuilding the key bag.
#[derive(Clone, Debug)]
pub struct Keystore {
    state: State,
    format_version: u64,
    key_bag: Vec<BootKey>,
    certificate: Option<Certificate>,
    signature: Option<SignatureEnvelope>,
}

impl Default for Keystore {
    fn default() -> Self {
        Self::new()
    }
}

impl Keystore {
    pub fn new() -> Self {
        Self {
            state: State::Empty,
            format_version: FORMAT_VERSION,
            key_bag: vec![],
            certificate: None,
            signature: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The key bag in insertion order. The order is significant: it
    /// participates in the canonical encoding that gets signed.
    pub fn key_bag(&self) -> &[BootKey] {
        &self.key_bag
    }

    pub fn signature(&self) -> Option<&SignatureEnvelope> {
        self.signature.as_ref()
    }

    /// Append a DER-encoded (SubjectPublicKeyInfo) public key to the bag.
    pub fn add_public_key(&mut self, der: &[u8], provider: &dyn CryptoProvider) -> Result<()> {
        match self.state {
            State::Empty | State::KeysAdded => {}
            state => {
                return Err(Error::InvalidStateTransition {
                    op: "add_public_key",
                    state,
                });
            }
        }

        let key = crypto::load_der_public_key(der)?;
        self.key_bag.push(BootKey::from_public_key(&key, provider)?);
        self.state = State::KeysAdded;

        Ok(())
    }

    /// Attach the signer's certificate. No further keys can be added
    /// afterwards.
    pub fn attach_certificate(&mut self, certificate: Certificate) -> Result<()> {
        match self.state {
            State::Empty | State::KeysAdded => {}
            state => {
                return Err(Error::InvalidStateTransition {
                    op: "attach_certificate",
                    state,
                });
            }
        }

        self.certificate = Some(certificate);
        self.state = State::CertificateAttached;

        Ok(())
    }

    /// The canonical DER encoding of `(formatVersion, keyBag)`.
    fn inner_der(&self) -> Result<Vec<u8>> {
        let inner = InnerKeystore {
            format_version: self.format_version,
            key_bag: self.key_bag.clone(),
        };

        inner.to_der().map_err(Error::MalformedEncoding)
    }

    /// Sign the canonical key bag encoding. Only valid once, after the
    /// certificate has been attached.
    pub fn sign(&mut self, key: &RsaPrivateKey, provider: &dyn CryptoProvider) -> Result<()> {
        if self.state != State::CertificateAttached {
            return Err(Error::InvalidStateTransition {
                op: "sign",
                state: self.state,
            });
        }

        // The state guarantees the certificate is present.
        let Some(certificate) = self.certificate.clone() else {
            return Err(Error::InvalidStateTransition {
                op: "sign",
                state: self.state,
            });
        };

        let inner = self.inner_der()?;
        let raw_signature = provider.sign(key, &inner)?;
        let algorithm = provider.algorithm_for_key(&key.to_public_key())?.to_identifier();

        self.signature = Some(SignatureEnvelope {
            length: inner.len() as u64,
            raw_signature: OctetString::new(raw_signature)?,
            algorithm,
            certificate,
        });
        self.state = State::Signed;

        Ok(())
    }

    /// Serialize a signed keystore.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        let Some(signature) = &self.signature else {
            return Err(Error::InvalidStateTransition {
                op: "to_der",
                state: self.state,
            });
        };

        let raw = RawKeystore {
            format_version: self.format_version,
            key_bag: self.key_bag.clone(),
            signature: signature.clone(),
        };

        raw.to_der().map_err(Error::MalformedEncoding)
    }

    /// Parse a keystore. A parsed keystore is assumed already finalized and
    /// decodes directly into the signed state.
    pub fn from_der(data: &[u8]) -> Result<Self> {
        let raw = RawKeystore::from_der(data)?;

        if raw.format_version != FORMAT_VERSION {
            return Err(Error::UnsupportedFormatVersion(raw.format_version));
        }

        Ok(Self {
            state: State::Signed,
            format_version: raw.format_version,
            key_bag: raw.key_bag,
            certificate: Some(raw.signature.certificate.clone()),
            signature: Some(raw.signature),
        })
    }

    /// Recompute the canonical key bag encoding and check the embedded
    /// signature against it with the key extracted from the embedded
    /// certificate. Returns `Ok(false)` on mismatch; structural failures are
    /// errors.
    pub fn verify(&self, provider: &dyn CryptoProvider) -> Result<bool> {
        let Some(envelope) = &self.signature else {
            return Err(Error::InvalidStateTransition {
                op: "verify",
                state: self.state,
            });
        };

        let inner = self.inner_der()?;

        // A stored length that doesn't match the actual signed region means
        // the signature can't be over this key bag.
        if envelope.length != inner.len() as u64 {
            return Ok(false);
        }

        let algo = SignatureAlgorithm::from_identifier(&envelope.algorithm)
            .map_err(Error::Crypto)?;
        let public_key = envelope.public_key()?;

        Ok(provider.verify(
            &public_key,
            &inner,
            envelope.raw_signature.as_bytes(),
            algo,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::OnceLock, time::Duration};

    use assert_matches::assert_matches;
    use pkcs8::EncodePublicKey;
    use rsa::RsaPrivateKey;

    use crate::crypto::RustCrypto;

    use super::*;

    fn test_key() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| crypto::generate_rsa_key_pair(2048).unwrap())
    }

    fn test_cert() -> Certificate {
        crypto::generate_cert(test_key(), 42, Duration::from_secs(3600), "CN=test").unwrap()
    }

    fn public_key_der() -> Vec<u8> {
        test_key()
            .to_public_key()
            .to_public_key_der()
            .unwrap()
            .into_vec()
    }

    fn signed_keystore() -> Keystore {
        let mut keystore = Keystore::new();
        keystore.add_public_key(&public_key_der(), &RustCrypto).unwrap();
        keystore.attach_certificate(test_cert()).unwrap();
        keystore.sign(test_key(), &RustCrypto).unwrap();
        keystore
    }

    fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    #[test]
    fn boot_key_round_trip() {
        let key = test_key().to_public_key();
        let boot_key = BootKey::from_public_key(&key, &RustCrypto).unwrap();

        let encoded = boot_key.to_der().unwrap();
        let decoded = BootKey::from_der(&encoded).unwrap();

        assert_eq!(decoded, boot_key);
        assert_eq!(decoded.public_key().unwrap(), key);
    }

    #[test]
    fn boot_key_rejects_trailing_data() {
        let key = test_key().to_public_key();
        let boot_key = BootKey::from_public_key(&key, &RustCrypto).unwrap();

        let mut encoded = boot_key.to_der().unwrap();
        encoded.push(0x00);

        assert_matches!(BootKey::from_der(&encoded), Err(Error::MalformedEncoding(_)));
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let keystore = signed_keystore();
        assert_eq!(keystore.state(), State::Signed);
        assert!(keystore.verify(&RustCrypto).unwrap());

        // A parsed keystore must verify the same way.
        let encoded = keystore.to_der().unwrap();
        let parsed = Keystore::from_der(&encoded).unwrap();
        assert_eq!(parsed.key_bag(), keystore.key_bag());
        assert!(parsed.verify(&RustCrypto).unwrap());
    }

    #[test]
    fn tampered_key_bag_fails_verification() {
        let keystore = signed_keystore();
        let mut encoded = keystore.to_der().unwrap();

        // Flip a content byte inside the first key's modulus. This keeps the
        // DER structure intact, so the failure must be a signature mismatch
        // rather than a decode error.
        let modulus = test_key().to_public_key().n().to_bytes_be();
        let pos = find_subslice(&encoded, &modulus[..16]).unwrap();
        encoded[pos + 8] ^= 0x01;

        let parsed = Keystore::from_der(&encoded).unwrap();
        assert!(!parsed.verify(&RustCrypto).unwrap());
    }

    #[test]
    fn tampered_certificate_key_fails_verification() {
        let keystore = signed_keystore();
        let mut encoded = keystore.to_der().unwrap();

        // The modulus appears twice: first in the key bag, then in the
        // embedded certificate's SubjectPublicKeyInfo. Corrupting the second
        // copy changes the key the signature is checked against.
        let modulus = test_key().to_public_key().n().to_bytes_be();
        let first = find_subslice(&encoded, &modulus[..16]).unwrap();
        let second =
            first + 1 + find_subslice(&encoded[first + 1..], &modulus[..16]).unwrap();
        encoded[second + 8] ^= 0x01;

        let parsed = Keystore::from_der(&encoded).unwrap();
        assert!(!parsed.verify(&RustCrypto).unwrap());
    }

    #[test]
    fn stored_length_mismatch_fails_verification() {
        let mut keystore = signed_keystore();
        if let Some(envelope) = &mut keystore.signature {
            envelope.length += 1;
        }

        assert!(!keystore.verify(&RustCrypto).unwrap());
    }

    #[test]
    fn unsupported_format_version_is_rejected() {
        let keystore = signed_keystore();
        let raw = RawKeystore {
            format_version: 1,
            key_bag: keystore.key_bag.clone(),
            signature: keystore.signature.clone().unwrap(),
        };
        let encoded = raw.to_der().unwrap();

        assert_matches!(
            Keystore::from_der(&encoded),
            Err(Error::UnsupportedFormatVersion(1))
        );
    }

    #[test]
    fn add_key_after_certificate_is_rejected() {
        let mut keystore = Keystore::new();
        keystore.attach_certificate(test_cert()).unwrap();

        assert_matches!(
            keystore.add_public_key(&public_key_der(), &RustCrypto),
            Err(Error::InvalidStateTransition {
                op: "add_public_key",
                state: State::CertificateAttached,
            })
        );
    }

    #[test]
    fn sign_without_certificate_is_rejected() {
        let mut keystore = Keystore::new();
        keystore.add_public_key(&public_key_der(), &RustCrypto).unwrap();

        assert_matches!(
            keystore.sign(test_key(), &RustCrypto),
            Err(Error::InvalidStateTransition {
                op: "sign",
                state: State::KeysAdded,
            })
        );
    }

    #[test]
    fn double_sign_is_rejected() {
        let mut keystore = signed_keystore();

        assert_matches!(
            keystore.sign(test_key(), &RustCrypto),
            Err(Error::InvalidStateTransition {
                op: "sign",
                state: State::Signed,
            })
        );
    }

    #[test]
    fn serialize_unsigned_is_rejected() {
        let keystore = Keystore::new();

        assert_matches!(
            keystore.to_der(),
            Err(Error::InvalidStateTransition {
                op: "to_der",
                state: State::Empty,
            })
        );
    }
}
