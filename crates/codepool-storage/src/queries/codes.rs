// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingested bucket codes: bulk insert, counting, redemption and reset.

use codepool_core::{BucketCode, BucketSummary, CodepoolError, NotificationRecord};
use rusqlite::types::ToSql;
use rusqlite::{OptionalExtension, Row, params};
use tracing::debug;

use crate::database::{Database, flatten_err, map_tr_err, sql_err};
use crate::queries::summaries::select_summary_for_discount;

const CODE_COLUMNS: &str = "id, code, discount_id, bucket_code_load_id, is_used, used_at";

fn row_to_code(row: &Row<'_>) -> rusqlite::Result<BucketCode> {
    Ok(BucketCode {
        id: row.get(0)?,
        code: row.get(1)?,
        discount_id: row.get(2)?,
        load_id: row.get(3)?,
        is_used: row.get(4)?,
        used_at: row.get(5)?,
    })
}

/// Insert every code of a load in one transaction, `batch_size` rows per
/// statement. Either all rows land or none do.
pub async fn bulk_insert_codes(
    db: &Database,
    discount_id: i64,
    load_id: i64,
    codes: Vec<String>,
    batch_size: usize,
) -> Result<usize, CodepoolError> {
    let batch_size = batch_size.max(1);
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            let tx = conn.transaction()?;
            let mut inserted = 0usize;
            for chunk in codes.chunks(batch_size) {
                let placeholders = vec!["(?, ?, ?)"; chunk.len()].join(", ");
                let sql = format!(
                    "INSERT INTO discount_bucket_codes (code, discount_id, bucket_code_load_id)
                     VALUES {placeholders}"
                );
                let mut values: Vec<&dyn ToSql> = Vec::with_capacity(chunk.len() * 3);
                for code in chunk {
                    values.push(code);
                    values.push(&discount_id);
                    values.push(&load_id);
                }
                inserted += tx.prepare_cached(&sql)?.execute(values.as_slice())?;
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
        .map_err(map_tr_err)
}

/// `count by (discount, isUsed)`.
pub async fn count_by_discount_and_used(
    db: &Database,
    discount_id: i64,
    is_used: bool,
) -> Result<i64, CodepoolError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM discount_bucket_codes WHERE discount_id = ?1 AND is_used = ?2",
                params![discount_id, is_used],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

pub async fn count_by_discount(db: &Database, discount_id: i64) -> Result<i64, CodepoolError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM discount_bucket_codes WHERE discount_id = ?1",
                params![discount_id],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// `count by (discount, loadId)`.
pub async fn count_by_discount_and_load(
    db: &Database,
    discount_id: i64,
    load_id: i64,
) -> Result<i64, CodepoolError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM discount_bucket_codes
                 WHERE discount_id = ?1 AND bucket_code_load_id = ?2",
                params![discount_id, load_id],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// All codes of a discount in insertion order.
pub async fn list_codes(db: &Database, discount_id: i64) -> Result<Vec<BucketCode>, CodepoolError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CODE_COLUMNS} FROM discount_bucket_codes
                 WHERE discount_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![discount_id], row_to_code)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_codes_for_load(
    db: &Database,
    load_id: i64,
) -> Result<Vec<BucketCode>, CodepoolError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CODE_COLUMNS} FROM discount_bucket_codes
                 WHERE bucket_code_load_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![load_id], row_to_code)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Remove whatever rows a load left behind. Returns the number removed.
pub async fn delete_codes_for_load(db: &Database, load_id: i64) -> Result<usize, CodepoolError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM discount_bucket_codes WHERE bucket_code_load_id = ?1",
                params![load_id],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Outcome of a bucket reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketReset {
    pub codes_deleted: usize,
    pub ledger_entries_cleared: usize,
}

/// Delete every code of a discount, zero its summary and clear its
/// notification ledger, all in one transaction.
pub async fn delete_bucket_codes(
    db: &Database,
    discount_id: i64,
) -> Result<BucketReset, CodepoolError> {
    let prefix = NotificationRecord::key_prefix(discount_id);
    db.connection()
        .call(move |conn| -> Result<BucketReset, rusqlite::Error> {
            let tx = conn.transaction()?;
            let codes_deleted = tx.execute(
                "DELETE FROM discount_bucket_codes WHERE discount_id = ?1",
                params![discount_id],
            )?;
            tx.execute(
                "UPDATE bucket_code_summaries SET available_codes = 0, used_codes = 0,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE discount_id = ?1",
                params![discount_id],
            )?;
            let ledger_entries_cleared = tx.execute(
                "DELETE FROM notifications WHERE substr(key, 1, length(?1)) = ?1",
                params![prefix],
            )?;
            tx.commit()?;
            Ok(BucketReset {
                codes_deleted,
                ledger_entries_cleared,
            })
        })
        .await
        .map_err(map_tr_err)
}

fn consume_in_summary(tx: &rusqlite::Transaction<'_>, discount_id: i64) -> Result<(), CodepoolError> {
    let changed = tx
        .execute(
            "UPDATE bucket_code_summaries
             SET available_codes = available_codes - 1,
                 used_codes = used_codes + 1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE discount_id = ?1 AND available_codes > 0",
            params![discount_id],
        )
        .map_err(sql_err)?;
    if changed == 0 {
        return Err(CodepoolError::Internal(format!(
            "summary of discount {discount_id} has no available codes to consume"
        )));
    }
    Ok(())
}

/// Claim the oldest unused code of a discount and move one unit from the
/// available to the used counter. `None` when the bucket is empty.
pub async fn redeem_next_code(
    db: &Database,
    discount_id: i64,
) -> Result<Option<(BucketCode, BucketSummary)>, CodepoolError> {
    db.connection()
        .call(move |conn| -> Result<Option<(BucketCode, BucketSummary)>, CodepoolError> {
            let tx = conn.transaction().map_err(sql_err)?;
            let next: Option<i64> = tx
                .query_row(
                    "SELECT id FROM discount_bucket_codes
                     WHERE discount_id = ?1 AND is_used = 0 ORDER BY id LIMIT 1",
                    params![discount_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(sql_err)?;
            let Some(code_id) = next else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE discount_bucket_codes
                 SET is_used = 1, used_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![code_id],
            )
            .map_err(sql_err)?;
            consume_in_summary(&tx, discount_id)?;

            let code = tx
                .query_row(
                    &format!("SELECT {CODE_COLUMNS} FROM discount_bucket_codes WHERE id = ?1"),
                    params![code_id],
                    row_to_code,
                )
                .map_err(sql_err)?;
            let summary = select_summary_for_discount(&tx, discount_id)
                .map_err(sql_err)?
                .ok_or_else(|| CodepoolError::not_found("bucket summary", discount_id))?;
            tx.commit().map_err(sql_err)?;
            Ok(Some((code, summary)))
        })
        .await
        .map_err(flatten_err)
}

/// Flag a specific code as used.
///
/// Returns the updated summary, or `None` when the code was already used
/// (counters are adjusted only once per code).
pub async fn mark_code_used(
    db: &Database,
    code_id: i64,
) -> Result<Option<BucketSummary>, CodepoolError> {
    db.connection()
        .call(move |conn| -> Result<Option<BucketSummary>, CodepoolError> {
            let tx = conn.transaction().map_err(sql_err)?;
            let found: Option<(i64, bool)> = tx
                .query_row(
                    "SELECT discount_id, is_used FROM discount_bucket_codes WHERE id = ?1",
                    params![code_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(sql_err)?;
            let Some((discount_id, already_used)) = found else {
                return Err(CodepoolError::not_found("bucket code", code_id));
            };
            if already_used {
                debug!(code_id, "code already used");
                return Ok(None);
            }

            tx.execute(
                "UPDATE discount_bucket_codes
                 SET is_used = 1, used_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![code_id],
            )
            .map_err(sql_err)?;
            consume_in_summary(&tx, discount_id)?;
            let summary = select_summary_for_discount(&tx, discount_id).map_err(sql_err)?;
            tx.commit().map_err(sql_err)?;
            Ok(summary)
        })
        .await
        .map_err(flatten_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::discounts::{NewDiscount, create_discount};
    use crate::queries::loads::{create_pending_load, mark_running};
    use crate::queries::notifications::{is_recorded, record_sent};
    use crate::queries::summaries::{ensure_summary, get_summary_for_discount, increment_available};
    use codepool_core::DiscountCodeType;
    use tempfile::tempdir;

    struct Fixture {
        db: Database,
        _dir: tempfile::TempDir,
        discount_id: i64,
        load_id: i64,
    }

    async fn setup() -> Fixture {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let discount = create_discount(
            &db,
            NewDiscount {
                agreement_id: "agr".into(),
                name: "d".into(),
                code_type: DiscountCodeType::Bucket,
            },
        )
        .await
        .unwrap();
        ensure_summary(&db, discount.id).await.unwrap();
        let load = create_pending_load(&db, discount.id, "uid-1", None).await.unwrap();
        mark_running(&db, load.id).await.unwrap();
        Fixture {
            db,
            _dir: dir,
            discount_id: discount.id,
            load_id: load.id,
        }
    }

    fn codes(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("CODE-{i:04}")).collect()
    }

    #[tokio::test]
    async fn bulk_insert_spans_batches() {
        let f = setup().await;

        let inserted = bulk_insert_codes(&f.db, f.discount_id, f.load_id, codes(25), 7)
            .await
            .unwrap();
        assert_eq!(inserted, 25);
        assert_eq!(
            count_by_discount_and_load(&f.db, f.discount_id, f.load_id)
                .await
                .unwrap(),
            25
        );
        assert_eq!(
            count_by_discount_and_used(&f.db, f.discount_id, false)
                .await
                .unwrap(),
            25
        );
        let listed = list_codes_for_load(&f.db, f.load_id).await.unwrap();
        assert_eq!(listed[0].code, "CODE-0000");
        assert_eq!(listed[24].code, "CODE-0024");
        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicates_are_preserved() {
        let f = setup().await;
        let input = vec!["A".to_string(), "A".to_string(), "B".to_string()];
        bulk_insert_codes(&f.db, f.discount_id, f.load_id, input, 300)
            .await
            .unwrap();
        let values: Vec<String> = list_codes(&f.db, f.discount_id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.code)
            .collect();
        assert_eq!(values, vec!["A", "A", "B"]);
        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_bulk_insert_leaves_nothing() {
        let f = setup().await;
        // An unknown load id violates the foreign key.
        let err = bulk_insert_codes(&f.db, f.discount_id, 9999, codes(10), 5)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(count_by_discount(&f.db, f.discount_id).await.unwrap(), 0);
        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn redeem_moves_counters() {
        let f = setup().await;
        bulk_insert_codes(&f.db, f.discount_id, f.load_id, codes(2), 300)
            .await
            .unwrap();
        increment_available(&f.db, f.discount_id, 2).await.unwrap();

        let (code, summary) = redeem_next_code(&f.db, f.discount_id).await.unwrap().unwrap();
        assert_eq!(code.code, "CODE-0000");
        assert!(code.is_used);
        assert!(code.used_at.is_some());
        assert_eq!((summary.available_codes, summary.used_codes), (1, 1));

        redeem_next_code(&f.db, f.discount_id).await.unwrap().unwrap();
        assert!(redeem_next_code(&f.db, f.discount_id).await.unwrap().is_none());
        assert_eq!(
            count_by_discount_and_used(&f.db, f.discount_id, true)
                .await
                .unwrap(),
            2
        );
        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn mark_used_counts_once() {
        let f = setup().await;
        bulk_insert_codes(&f.db, f.discount_id, f.load_id, codes(3), 300)
            .await
            .unwrap();
        increment_available(&f.db, f.discount_id, 3).await.unwrap();
        let id = list_codes(&f.db, f.discount_id).await.unwrap()[1].id;

        let summary = mark_code_used(&f.db, id).await.unwrap().unwrap();
        assert_eq!((summary.available_codes, summary.used_codes), (2, 1));
        assert!(mark_code_used(&f.db, id).await.unwrap().is_none());
        let summary = get_summary_for_discount(&f.db, f.discount_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!((summary.available_codes, summary.used_codes), (2, 1));

        assert!(matches!(
            mark_code_used(&f.db, 777).await.unwrap_err(),
            CodepoolError::NotFound { .. }
        ));
        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reset_zeroes_summary_and_ledger() {
        let f = setup().await;
        bulk_insert_codes(&f.db, f.discount_id, f.load_id, codes(4), 300)
            .await
            .unwrap();
        increment_available(&f.db, f.discount_id, 4).await.unwrap();
        redeem_next_code(&f.db, f.discount_id).await.unwrap();
        let key = NotificationRecord::key_for(f.discount_id, 50);
        record_sent(&f.db, &key).await.unwrap();

        let reset = delete_bucket_codes(&f.db, f.discount_id).await.unwrap();
        assert_eq!(reset.codes_deleted, 4);
        assert_eq!(reset.ledger_entries_cleared, 1);

        let summary = get_summary_for_discount(&f.db, f.discount_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!((summary.available_codes, summary.used_codes), (0, 0));
        assert!(list_codes(&f.db, f.discount_id).await.unwrap().is_empty());
        assert!(!is_recorded(&f.db, &key).await.unwrap());
        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_for_load_is_scoped() {
        let f = setup().await;
        bulk_insert_codes(&f.db, f.discount_id, f.load_id, codes(3), 300)
            .await
            .unwrap();
        assert_eq!(delete_codes_for_load(&f.db, f.load_id + 1).await.unwrap(), 0);
        assert_eq!(delete_codes_for_load(&f.db, f.load_id).await.unwrap(), 3);
        f.db.close().await.unwrap();
    }
}
