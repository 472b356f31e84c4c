/*
 * SPDX-FileCopyrightText: 2026 The bootverity developers
 * SPDX-License-Identifier: GPL-3.0-only
 */

//! Sparse images are decompressed by an external tool (eg. `simg2img`)
//! invoked as a subprocess. This module only owns the process boundary:
//! spawn, wait, check the exit status. A nonzero exit is fatal and reported,
//! never retried.

use std::{
    io,
    path::Path,
    process::{Command, ExitStatus},
};

use thiserror::Error;
use tracing::debug;

use crate::util::DebugString;

/// Name of the decompressor looked up on `PATH` when no explicit program is
/// given.
pub const DEFAULT_PROGRAM: &str = "simg2img";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to run command: {0:?}")]
    CommandSpawn(DebugString, #[source] io::Error),
    #[error("Command failed with status: {1}: {0:?}")]
    CommandExecution(DebugString, ExitStatus),
}

type Result<T> = std::result::Result<T, Error>;

/// Decompress `sparse` into the flat random-access file `raw`. This blocks
/// until the subprocess exits; callers wanting bounded latency must impose
/// their own timeout around it.
pub fn unsparse(program: &Path, sparse: &Path, raw: &Path) -> Result<()> {
    let mut command = Command::new(program);
    command.arg(sparse);
    command.arg(raw);

    debug!("Decompressing sparse image: {command:?}");

    let status = command
        .status()
        .map_err(|e| Error::CommandSpawn(DebugString::new(&command), e))?;

    if !status.success() {
        return Err(Error::CommandExecution(DebugString::new(&command), status));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn missing_program_is_reported() {
        let err = unsparse(
            Path::new("bootverity-nonexistent-decompressor"),
            Path::new("sparse.img"),
            Path::new("raw.img"),
        )
        .unwrap_err();

        assert_matches!(err, Error::CommandSpawn(_, _));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_reported() {
        let err = unsparse(
            Path::new("false"),
            Path::new("sparse.img"),
            Path::new("raw.img"),
        )
        .unwrap_err();

        assert_matches!(err, Error::CommandExecution(_, status) if !status.success());
    }
}
