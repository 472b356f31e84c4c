/*
 * SPDX-FileCopyrightText: 2026 The bootverity developers
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::{
    io,
    process::ExitCode,
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use crate::cli::{image, keystore};

#[derive(Debug, Subcommand)]
pub enum Command {
    Sign(keystore::SignCli),
    Verify(keystore::VerifyCli),
    VerifyImage(image::VerifyImageCli),
}

#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

pub fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

pub fn main(logging_initialized: &AtomicBool) -> Result<ExitCode> {
    let cli = Cli::parse();

    init_logging();
    logging_initialized.store(true, Ordering::SeqCst);

    match cli.command {
        Command::Sign(c) => keystore::sign_main(&c),
        Command::Verify(c) => keystore::verify_main(&c),
        Command::VerifyImage(c) => image::verify_image_main(&c),
    }
}
