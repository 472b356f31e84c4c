/*
 * SPDX-FileCopyrightText: 2026 The bootverity developers
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::{fs, path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;

use crate::{
    crypto::{self, RustCrypto},
    ops,
};

pub fn sign_main(cli: &SignCli) -> Result<ExitCode> {
    let private_key = crypto::read_der_key_file(&cli.private_key)
        .with_context(|| format!("Failed to load private key: {:?}", cli.private_key))?;
    let certificate = crypto::read_pem_cert_file(&cli.certificate)
        .with_context(|| format!("Failed to load certificate: {:?}", cli.certificate))?;

    let mut public_keys = vec![];
    for path in &cli.public_keys {
        let der =
            fs::read(path).with_context(|| format!("Failed to read public key: {path:?}"))?;
        public_keys.push(der);
    }

    let encoded = ops::sign_keystore(certificate, &private_key, &public_keys, &RustCrypto)
        .context("Failed to sign keystore")?;

    fs::write(&cli.output, encoded)
        .with_context(|| format!("Failed to write keystore: {:?}", cli.output))?;

    Ok(ExitCode::SUCCESS)
}

pub fn verify_main(cli: &VerifyCli) -> Result<ExitCode> {
    let data = fs::read(&cli.keystore)
        .with_context(|| format!("Failed to read keystore: {:?}", cli.keystore))?;

    let valid = ops::verify_keystore(&data, &RustCrypto)
        .with_context(|| format!("Failed to parse keystore: {:?}", cli.keystore))?;

    if valid {
        eprintln!("Signature is VALID");
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("Signature is INVALID");
        Ok(ExitCode::FAILURE)
    }
}

/// Sign a boot keystore.
///
/// The key bag is assembled from the public keys in the order given, the
/// certificate is attached, and the result is signed with the private key
/// and written out as DER.
#[derive(Debug, Parser)]
pub struct SignCli {
    /// Path to DER-encoded PKCS8 private key (.pk8).
    #[arg(value_name = "PRIVATE_KEY", value_parser)]
    pub private_key: PathBuf,

    /// Path to PEM-encoded X509 certificate.
    #[arg(value_name = "CERTIFICATE", value_parser)]
    pub certificate: PathBuf,

    /// Path to output keystore.
    #[arg(value_name = "OUTFILE", value_parser)]
    pub output: PathBuf,

    /// Paths to DER-encoded public keys to trust.
    #[arg(value_name = "PUBLIC_KEY", value_parser)]
    pub public_keys: Vec<PathBuf>,
}

/// Verify the signature of a boot keystore.
///
/// The keystore is checked against the public key from its own embedded
/// certificate. The exit status is 0 only if the signature is valid.
#[derive(Debug, Parser)]
pub struct VerifyCli {
    /// Path to keystore.
    #[arg(value_name = "KEYSTORE", value_parser)]
    pub keystore: PathBuf,
}
