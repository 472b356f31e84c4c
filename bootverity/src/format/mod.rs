/*
 * SPDX-FileCopyrightText: 2026 The bootverity developers
 * SPDX-License-Identifier: GPL-3.0-only
 */

pub mod ext4;
pub mod keystore;
pub mod verity;
