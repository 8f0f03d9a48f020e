// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Threshold arithmetic for the expiration monitor.

/// Descending set of remaining-percentage watch points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thresholds(Vec<u8>);

impl Thresholds {
    /// Normalizes to strictly descending order and drops values outside 1..=100.
    pub fn new(mut values: Vec<u8>) -> Self {
        values.retain(|t| (1..=100).contains(t));
        values.sort_unstable_by(|a, b| b.cmp(a));
        values.dedup();
        Self(values)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Watch points at or above `remaining_percent`, highest first.
    ///
    /// A pool at exactly T% has crossed T.
    pub fn crossed(&self, remaining_percent: u8) -> impl Iterator<Item = u8> + '_ {
        self.0
            .iter()
            .copied()
            .filter(move |t| remaining_percent <= *t)
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self(vec![50, 25, 10])
    }
}
