// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Blob store implementations for uploaded CSV files.

pub mod fs;

pub use fs::FsBlobStore;
