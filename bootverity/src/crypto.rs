/*
 * SPDX-FileCopyrightText: 2026 The bootverity developers
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::{
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
    time::Duration,
};

use const_oid::ObjectIdentifier;
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};
use rsa::{
    pkcs1v15::SigningKey, traits::PublicKeyParts, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey,
};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;
use x509_cert::{
    builder::{Builder, CertificateBuilder, Profile},
    der::{referenced::OwnedToRef, Any, Decode, DecodePem},
    serial_number::SerialNumber,
    spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned},
    time::Validity,
    Certificate,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Signature algorithm not supported: {0:?}")]
    UnsupportedAlgorithm(SignatureAlgorithm),
    #[error("Signature algorithm identifier not supported: {0}")]
    UnsupportedAlgorithmOid(ObjectIdentifier),
    #[error("RSA key size ({}) not supported", .0 * 8)]
    UnsupportedKeySize(usize),
    #[error("PEM has start tag, but no end tag")]
    PemNoEndTag,
    #[error("Failed to load RSA private key")]
    LoadKey(#[source] pkcs8::Error),
    #[error("Failed to load RSA public key")]
    LoadPubKey(#[source] pkcs8::spki::Error),
    #[error("Failed to save RSA public key")]
    SavePubKey(#[source] pkcs8::spki::Error),
    #[error("Failed to load X509 certificate")]
    LoadCert(#[source] x509_cert::der::Error),
    #[error("Failed to generate RSA key")]
    RsaGenerate(#[source] Box<rsa::Error>),
    #[error("Failed to RSA sign digest")]
    RsaSign(#[source] Box<rsa::Error>),
    #[error("Failed to RSA verify signature")]
    RsaVerify(#[source] Box<rsa::Error>),
    #[error("Failed to generate X509 certificate")]
    CertGenerate(#[source] x509_cert::builder::Error),
    #[error("Invalid parameters for X509 certificate generation")]
    CertParams(#[source] x509_cert::der::Error),
    #[error("Failed to read file: {0:?}")]
    ReadFile(PathBuf, #[source] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignatureAlgorithm {
    Sha1WithRsa,
    Sha256WithRsa,
    Sha512WithRsa,
}

impl SignatureAlgorithm {
    /// Compute the digest of the specified data.
    pub fn hash(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1WithRsa => Sha1::digest(data).to_vec(),
            Self::Sha256WithRsa => Sha256::digest(data).to_vec(),
            Self::Sha512WithRsa => Sha512::digest(data).to_vec(),
        }
    }

    pub fn oid(self) -> ObjectIdentifier {
        match self {
            Self::Sha1WithRsa => const_oid::db::rfc5912::SHA_1_WITH_RSA_ENCRYPTION,
            Self::Sha256WithRsa => const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
            Self::Sha512WithRsa => const_oid::db::rfc5912::SHA_512_WITH_RSA_ENCRYPTION,
        }
    }

    pub fn from_oid(oid: ObjectIdentifier) -> Option<Self> {
        match oid {
            const_oid::db::rfc5912::SHA_1_WITH_RSA_ENCRYPTION => Some(Self::Sha1WithRsa),
            const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION => Some(Self::Sha256WithRsa),
            const_oid::db::rfc5912::SHA_512_WITH_RSA_ENCRYPTION => Some(Self::Sha512WithRsa),
            _ => None,
        }
    }

    /// Build the ASN.1 algorithm identifier. The parameters are an explicit
    /// NULL, which is how the PKCS#1 identifiers are conventionally encoded.
    pub fn to_identifier(self) -> AlgorithmIdentifierOwned {
        AlgorithmIdentifierOwned {
            oid: self.oid(),
            parameters: Some(Any::null()),
        }
    }

    /// Parse an ASN.1 algorithm identifier. The parameters are ignored; none
    /// of the supported algorithms use them for anything meaningful.
    pub fn from_identifier(identifier: &AlgorithmIdentifierOwned) -> Result<Self> {
        Self::from_oid(identifier.oid).ok_or(Error::UnsupportedAlgorithmOid(identifier.oid))
    }

    /// Derive the signature algorithm deterministically from the key size.
    /// SHA-1 is never selected; it is accepted for verification only.
    pub fn for_key(key: &RsaPublicKey) -> Result<Self> {
        match key.size() {
            256 => Ok(Self::Sha256WithRsa),
            512 => Ok(Self::Sha512WithRsa),
            size => Err(Error::UnsupportedKeySize(size)),
        }
    }
}

/// The asymmetric-cryptography boundary. Orchestration code receives an
/// implementation explicitly instead of relying on process-wide provider
/// registration.
pub trait CryptoProvider {
    /// Derive the signature algorithm to use for signing with the given key.
    fn algorithm_for_key(&self, key: &RsaPublicKey) -> Result<SignatureAlgorithm>;

    /// Digest and sign `data`, returning the raw signature bytes.
    fn sign(&self, key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>>;

    /// Digest `data` and check `signature` against it. A signature mismatch
    /// is a legitimate answer, not an error.
    fn verify(
        &self,
        key: &RsaPublicKey,
        data: &[u8],
        signature: &[u8],
        algo: SignatureAlgorithm,
    ) -> Result<bool>;
}

fn check_key_size(size: usize) -> Result<()> {
    // RustCrypto does not support 8192-bit keys.
    if size > 4096 / 8 {
        return Err(Error::UnsupportedKeySize(size));
    }

    Ok(())
}

/// Provider backed by the RustCrypto `rsa` implementation.
pub struct RustCrypto;

impl CryptoProvider for RustCrypto {
    fn algorithm_for_key(&self, key: &RsaPublicKey) -> Result<SignatureAlgorithm> {
        SignatureAlgorithm::for_key(key)
    }

    fn sign(&self, key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>> {
        let algo = SignatureAlgorithm::for_key(&key.to_public_key())?;
        let digest = algo.hash(data);

        let scheme = match algo {
            // We don't support signing with insecure algorithms.
            SignatureAlgorithm::Sha1WithRsa => return Err(Error::UnsupportedAlgorithm(algo)),
            SignatureAlgorithm::Sha256WithRsa => Pkcs1v15Sign::new::<Sha256>(),
            SignatureAlgorithm::Sha512WithRsa => Pkcs1v15Sign::new::<Sha512>(),
        };

        key.sign(scheme, &digest)
            .map_err(|e| Error::RsaSign(Box::new(e)))
    }

    fn verify(
        &self,
        key: &RsaPublicKey,
        data: &[u8],
        signature: &[u8],
        algo: SignatureAlgorithm,
    ) -> Result<bool> {
        check_key_size(key.size())?;

        let digest = algo.hash(data);

        let scheme = match algo {
            SignatureAlgorithm::Sha1WithRsa => Pkcs1v15Sign::new::<Sha1>(),
            SignatureAlgorithm::Sha256WithRsa => Pkcs1v15Sign::new::<Sha256>(),
            SignatureAlgorithm::Sha512WithRsa => Pkcs1v15Sign::new::<Sha512>(),
        };

        match key.verify(scheme, &digest, signature) {
            Ok(()) => Ok(true),
            Err(rsa::Error::Verification) => Ok(false),
            Err(e) => Err(Error::RsaVerify(Box::new(e))),
        }
    }
}

/// Generate an RSA key pair.
pub fn generate_rsa_key_pair(bits: usize) -> Result<RsaPrivateKey> {
    let mut rng = rand::thread_rng();

    let key = RsaPrivateKey::new(&mut rng, bits).map_err(|e| Error::RsaGenerate(Box::new(e)))?;

    Ok(key)
}

/// Generate a self-signed certificate.
pub fn generate_cert(
    key: &RsaPrivateKey,
    serial: u64,
    validity: Duration,
    subject: &str,
) -> Result<Certificate> {
    let public_key_der = key
        .to_public_key()
        .to_public_key_der()
        .map_err(Error::SavePubKey)?;
    let signing_key = SigningKey::<Sha256>::new(key.clone());

    let builder = CertificateBuilder::new(
        Profile::Root,
        SerialNumber::from(serial),
        Validity::from_now(validity).map_err(Error::CertParams)?,
        subject.parse().map_err(Error::CertParams)?,
        SubjectPublicKeyInfoOwned::from_der(public_key_der.as_bytes())
            .map_err(Error::CertParams)?,
        &signing_key,
    )
    .map_err(Error::CertGenerate)?;

    let mut rng = rand::thread_rng();
    let cert = builder
        .build_with_rng(&mut rng)
        .map_err(Error::CertGenerate)?;

    Ok(cert)
}

/// x509_cert/pem follow rfc7468 strictly instead of implementing a lenient
/// parser. The PEM decoder rejects lines in the base64 section that are longer
/// than 64 characters, excluding whitespace. We'll reformat the data to deal
/// with this because certificates produced by some signing tools do not follow
/// the spec.
fn reformat_pem(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = vec![];
    let mut base64 = vec![];
    let mut inside_base64 = false;

    for mut line in data.split(|&c| c == b'\n') {
        while !line.is_empty() && line[line.len() - 1].is_ascii_whitespace() {
            line = &line[..line.len() - 1];
        }

        if line.is_empty() {
            continue;
        } else if line.starts_with(b"-----BEGIN CERTIFICATE-----") {
            inside_base64 = true;

            result.extend_from_slice(line);
            result.push(b'\n');
        } else if line.starts_with(b"-----END CERTIFICATE-----") {
            inside_base64 = false;

            for chunk in base64.chunks(64) {
                result.extend_from_slice(chunk);
                result.push(b'\n');
            }

            base64.clear();

            result.extend_from_slice(line);
            result.push(b'\n');
        } else if inside_base64 {
            base64.extend_from_slice(line);
            continue;
        }
    }

    if inside_base64 {
        return Err(Error::PemNoEndTag);
    }

    Ok(result)
}

/// Read PEM-encoded certificate from a reader.
pub fn read_pem_cert(path: &Path, mut reader: impl Read) -> Result<Certificate> {
    let mut data = vec![];
    reader
        .read_to_end(&mut data)
        .map_err(|e| Error::ReadFile(path.to_owned(), e))?;

    let data = reformat_pem(&data)?;
    let certificate = Certificate::from_pem(data).map_err(Error::LoadCert)?;

    Ok(certificate)
}

/// Read PEM-encoded certificate from a file.
pub fn read_pem_cert_file(path: &Path) -> Result<Certificate> {
    let reader = File::open(path).map_err(|e| Error::ReadFile(path.to_owned(), e))?;

    read_pem_cert(path, reader)
}

/// Load a DER-encoded PKCS8 private key (eg. a `.pk8` file).
pub fn read_der_key_file(path: &Path) -> Result<RsaPrivateKey> {
    let data = std::fs::read(path).map_err(|e| Error::ReadFile(path.to_owned(), e))?;

    RsaPrivateKey::from_pkcs8_der(&data).map_err(Error::LoadKey)
}

/// Load a DER-encoded SubjectPublicKeyInfo public key.
pub fn load_der_public_key(data: &[u8]) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_der(data).map_err(Error::LoadPubKey)
}

/// Get the RSA public key from a certificate.
pub fn get_public_key(cert: &Certificate) -> Result<RsaPublicKey> {
    let public_key =
        RsaPublicKey::try_from(cert.tbs_certificate.subject_public_key_info.owned_to_ref())
            .map_err(Error::LoadPubKey)?;

    Ok(public_key)
}
