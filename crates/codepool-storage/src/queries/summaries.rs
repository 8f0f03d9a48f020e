// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Materialized per-discount code counters.

use codepool_core::{BucketSummary, CodepoolError};
use rusqlite::{OptionalExtension, Row, params};

use crate::database::{Database, flatten_err, map_tr_err, sql_err};

const SUMMARY_COLUMNS: &str = "id, discount_id, available_codes, used_codes, updated_at";

fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<BucketSummary> {
    Ok(BucketSummary {
        id: row.get(0)?,
        discount_id: row.get(1)?,
        available_codes: row.get(2)?,
        used_codes: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

pub(crate) fn select_summary_for_discount(
    conn: &rusqlite::Connection,
    discount_id: i64,
) -> rusqlite::Result<Option<BucketSummary>> {
    conn.query_row(
        &format!("SELECT {SUMMARY_COLUMNS} FROM bucket_code_summaries WHERE discount_id = ?1"),
        params![discount_id],
        row_to_summary,
    )
    .optional()
}

/// Create the all-zero summary for a discount if it has none yet.
pub async fn ensure_summary(db: &Database, discount_id: i64) -> Result<BucketSummary, CodepoolError> {
    db.connection()
        .call(move |conn| -> Result<BucketSummary, CodepoolError> {
            conn.execute(
                "INSERT OR IGNORE INTO bucket_code_summaries (discount_id) VALUES (?1)",
                params![discount_id],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(code, _)
                    if code.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    CodepoolError::not_found("discount", discount_id)
                }
                other => sql_err(other),
            })?;
            select_summary_for_discount(conn, discount_id)
                .map_err(sql_err)?
                .ok_or_else(|| CodepoolError::not_found("bucket summary", discount_id))
        })
        .await
        .map_err(flatten_err)
}

/// Lookup by summary id.
pub async fn get_summary(db: &Database, id: i64) -> Result<Option<BucketSummary>, CodepoolError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {SUMMARY_COLUMNS} FROM bucket_code_summaries WHERE id = ?1"),
                params![id],
                row_to_summary,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_summary_for_discount(
    db: &Database,
    discount_id: i64,
) -> Result<Option<BucketSummary>, CodepoolError> {
    db.connection()
        .call(move |conn| select_summary_for_discount(conn, discount_id))
        .await
        .map_err(map_tr_err)
}

/// Every summary, by discount id.
pub async fn list_summaries(db: &Database) -> Result<Vec<BucketSummary>, CodepoolError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SUMMARY_COLUMNS} FROM bucket_code_summaries ORDER BY discount_id"
            ))?;
            let rows = stmt.query_map([], row_to_summary)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Add freshly ingested codes to the available counter.
pub async fn increment_available(
    db: &Database,
    discount_id: i64,
    count: i64,
) -> Result<BucketSummary, CodepoolError> {
    let updated = db
        .connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE bucket_code_summaries
                 SET available_codes = available_codes + ?1,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE discount_id = ?2",
                params![count, discount_id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            select_summary_for_discount(conn, discount_id)
        })
        .await
        .map_err(map_tr_err)?;
    updated.ok_or_else(|| CodepoolError::not_found("bucket summary", discount_id))
}

/// Recompute both counters from the code table.
pub async fn reconcile_summary(
    db: &Database,
    discount_id: i64,
) -> Result<BucketSummary, CodepoolError> {
    db.connection()
        .call(move |conn| -> Result<BucketSummary, CodepoolError> {
            let tx = conn.transaction().map_err(sql_err)?;
            let (available, used): (i64, i64) = tx
                .query_row(
                    "SELECT COALESCE(SUM(is_used = 0), 0), COALESCE(SUM(is_used = 1), 0)
                     FROM discount_bucket_codes WHERE discount_id = ?1",
                    params![discount_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map_err(sql_err)?;
            let changed = tx
                .execute(
                    "UPDATE bucket_code_summaries
                     SET available_codes = ?1, used_codes = ?2,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE discount_id = ?3",
                    params![available, used, discount_id],
                )
                .map_err(sql_err)?;
            if changed == 0 {
                return Err(CodepoolError::not_found("bucket summary", discount_id));
            }
            let summary = select_summary_for_discount(&tx, discount_id)
                .map_err(sql_err)?
                .ok_or_else(|| CodepoolError::not_found("bucket summary", discount_id))?;
            tx.commit().map_err(sql_err)?;
            Ok(summary)
        })
        .await
        .map_err(flatten_err)
}
