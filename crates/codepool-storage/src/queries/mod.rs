// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for CRUD operations on storage entities.

pub mod codes;
pub mod discounts;
pub mod loads;
pub mod notifications;
pub mod summaries;
