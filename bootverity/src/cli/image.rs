/*
 * SPDX-FileCopyrightText: 2026 The bootverity developers
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::{fs::File, io::BufReader, path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;

use crate::{
    crypto::{self, RustCrypto},
    ops::{self, VerifyResult},
    sparse,
};

pub fn verify_image_main(cli: &VerifyImageCli) -> Result<ExitCode> {
    let certificate = crypto::read_pem_cert_file(&cli.certificate)
        .with_context(|| format!("Failed to load certificate: {:?}", cli.certificate))?;
    let public_key = crypto::get_public_key(&certificate)
        .with_context(|| format!("Failed to extract public key: {:?}", cli.certificate))?;

    let temp_dir = tempfile::tempdir().context("Failed to create temporary directory")?;
    let raw_path = temp_dir.path().join("raw.img");

    sparse::unsparse(&cli.simg2img, &cli.image, &raw_path)
        .with_context(|| format!("Failed to decompress sparse image: {:?}", cli.image))?;

    let raw_file = File::open(&raw_path)
        .with_context(|| format!("Failed to open raw image: {raw_path:?}"))?;
    let reader = BufReader::new(raw_file);

    let result = ops::verify_image(reader, &public_key, &RustCrypto)
        .with_context(|| format!("Failed to verify image: {:?}", cli.image))?;

    match result {
        VerifyResult::Valid => {
            eprintln!("Signature is VALID");
            Ok(ExitCode::SUCCESS)
        }
        VerifyResult::Invalid => {
            eprintln!("Signature is INVALID");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Verify the embedded verity signature of a sparse filesystem image.
///
/// The image is decompressed with an external tool, the verity metadata
/// block is located from the ext4 superblock geometry, and the table
/// signature is checked against the certificate's public key.
#[derive(Debug, Parser)]
pub struct VerifyImageCli {
    /// Path to sparse image.
    #[arg(value_name = "IMAGE", value_parser)]
    pub image: PathBuf,

    /// Path to PEM-encoded X509 certificate.
    #[arg(value_name = "CERTIFICATE", value_parser)]
    pub certificate: PathBuf,

    /// Path to sparse image decompressor.
    #[arg(long, value_name = "PROGRAM", value_parser, default_value = sparse::DEFAULT_PROGRAM)]
    pub simg2img: PathBuf,
}
