/*
 * SPDX-FileCopyrightText: 2026 The bootverity developers
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::fmt;

/// A wrapper that pre-renders the [`fmt::Debug`] output of a value so it can
/// be stored inside error types without borrowing the original value.
pub struct DebugString(String);

impl DebugString {
    pub fn new(value: &impl fmt::Debug) -> Self {
        Self(format!("{value:?}"))
    }
}

impl fmt::Debug for DebugString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
