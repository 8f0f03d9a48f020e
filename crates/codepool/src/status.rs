// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `codepool status` command implementation.

use std::fmt;

use codepool_core::{BucketLoad, BucketSummary, CodepoolError, Discount};
use codepool_storage::queries::{discounts, loads, summaries};
use serde::Serialize;

use crate::app::App;

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub discount: Discount,
    pub current_load: Option<BucketLoad>,
    pub summary: Option<BucketSummary>,
    pub remaining_percent: Option<u8>,
}

impl StatusReport {
    pub async fn collect(app: &App, discount_id: i64) -> Result<Self, CodepoolError> {
        let discount = discounts::require_discount(&app.db, discount_id).await?;
        let current_load = loads::current_load(&app.db, discount_id).await?;
        let summary = summaries::get_summary_for_discount(&app.db, discount_id).await?;
        Ok(Self::new(discount, current_load, summary))
    }

    fn new(
        discount: Discount,
        current_load: Option<BucketLoad>,
        summary: Option<BucketSummary>,
    ) -> Self {
        let remaining_percent = summary.as_ref().map(BucketSummary::remaining_percent);
        Self {
            discount,
            current_load,
            summary,
            remaining_percent,
        }
    }

    pub fn to_json(&self) -> Result<String, CodepoolError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CodepoolError::Internal(format!("failed to render status: {e}")))
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.discount;
        writeln!(f)?;
        writeln!(f, "  discount {} \"{}\"", d.id, d.name)?;
        writeln!(f, "  {}", "-".repeat(35))?;
        writeln!(f, "    Agreement: {}", d.agreement_id)?;
        writeln!(f, "    Type:      {}", d.code_type)?;
        writeln!(f, "    State:     {}", d.state)?;
        match &self.current_load {
            Some(load) => {
                write!(f, "    Load:      {} {} ({})", load.id, load.status, load.uid)?;
                if let Some(n) = load.number_of_codes {
                    write!(f, ", {n} codes")?;
                }
                writeln!(f)?;
            }
            None => writeln!(f, "    Load:      none")?,
        }
        if let (Some(s), Some(pct)) = (&self.summary, self.remaining_percent) {
            writeln!(
                f,
                "    Codes:     {} available, {} used ({pct}% left)",
                s.available_codes, s.used_codes
            )?;
        }
        writeln!(f)
    }
}
