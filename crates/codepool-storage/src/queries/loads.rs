// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bucket load records and their status transitions.
//!
//! Each transition runs in its own transaction so that the new status is
//! visible to concurrent readers as soon as the call returns.

use codepool_core::{BucketLoad, CodepoolError, LoadStatus};
use rusqlite::{OptionalExtension, Row, params};

use crate::database::{Database, flatten_err, map_tr_err, parse_column, sql_err};

const LOAD_COLUMNS: &str = "l.id, l.discount_id, l.uid, l.file_name, l.status, \
                            l.number_of_codes, l.created_at, l.updated_at";

fn row_to_load(row: &Row<'_>) -> rusqlite::Result<BucketLoad> {
    Ok(BucketLoad {
        id: row.get(0)?,
        discount_id: row.get(1)?,
        uid: row.get(2)?,
        file_name: row.get(3)?,
        status: parse_column(4, row.get(4)?)?,
        number_of_codes: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn select_load(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<BucketLoad>> {
    conn.query_row(
        &format!("SELECT {LOAD_COLUMNS} FROM bucket_code_loads l WHERE l.id = ?1"),
        params![id],
        row_to_load,
    )
    .optional()
}

/// Insert a PENDING load and make it the discount's current load.
///
/// Fails with `Conflict` when the discount already has a PENDING or RUNNING
/// load, and with `NotFound` when the discount does not exist.
pub async fn create_pending_load(
    db: &Database,
    discount_id: i64,
    uid: &str,
    file_name: Option<&str>,
) -> Result<BucketLoad, CodepoolError> {
    let uid = uid.to_string();
    let file_name = file_name.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<BucketLoad, CodepoolError> {
            let tx = conn.transaction().map_err(sql_err)?;

            let exists: bool = tx
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM discounts WHERE id = ?1)",
                    params![discount_id],
                    |row| row.get(0),
                )
                .map_err(sql_err)?;
            if !exists {
                return Err(CodepoolError::not_found("discount", discount_id));
            }

            let outstanding: Option<(i64, String)> = tx
                .query_row(
                    "SELECT id, status FROM bucket_code_loads
                     WHERE discount_id = ?1 AND status IN ('PENDING', 'RUNNING')",
                    params![discount_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(sql_err)?;
            if let Some((load_id, status)) = outstanding {
                return Err(CodepoolError::Conflict(format!(
                    "discount {discount_id} already has bucket load {load_id} in {status}"
                )));
            }

            tx.execute(
                "INSERT INTO bucket_code_loads (discount_id, uid, file_name, status)
                 VALUES (?1, ?2, ?3, 'PENDING')",
                params![discount_id, uid, file_name],
            )
            .map_err(sql_err)?;
            let load_id = tx.last_insert_rowid();

            tx.execute(
                "UPDATE discounts SET last_bucket_code_load_id = ?1,
                 last_bucket_code_file_uid = ?2,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?3",
                params![load_id, uid, discount_id],
            )
            .map_err(sql_err)?;

            let load = select_load(&tx, load_id)
                .map_err(sql_err)?
                .ok_or_else(|| CodepoolError::not_found("bucket load", load_id))?;
            tx.commit().map_err(sql_err)?;
            Ok(load)
        })
        .await
        .map_err(flatten_err)
}

/// Move a load from `from` (any of) to `to`, returning the updated row.
///
/// Zero affected rows means the load is missing or in the wrong state.
async fn transition(
    db: &Database,
    load_id: i64,
    from: &'static [LoadStatus],
    to: LoadStatus,
    number_of_codes: Option<i64>,
) -> Result<BucketLoad, CodepoolError> {
    let allowed = from
        .iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE bucket_code_loads SET status = ?1,
         number_of_codes = COALESCE(?2, number_of_codes),
         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?3 AND status IN ({allowed})"
    );
    let updated = db
        .connection()
        .call(move |conn| -> Result<Option<BucketLoad>, rusqlite::Error> {
            let changed = conn.execute(&sql, params![to.to_string(), number_of_codes, load_id])?;
            if changed == 0 {
                return Ok(None);
            }
            select_load(conn, load_id)
        })
        .await
        .map_err(map_tr_err)?;

    updated.ok_or_else(|| {
        let expected = from
            .iter()
            .map(|s| s.to_string().to_lowercase())
            .collect::<Vec<_>>()
            .join(" or ");
        CodepoolError::not_found("bucket load", format!("{load_id} ({expected})"))
    })
}

/// PENDING -> RUNNING. A second dispatch of the same load fails with `NotFound`.
pub async fn mark_running(db: &Database, load_id: i64) -> Result<BucketLoad, CodepoolError> {
    transition(db, load_id, &[LoadStatus::Pending], LoadStatus::Running, None).await
}

/// RUNNING -> FINISHED, recording how many codes were ingested.
pub async fn mark_finished(
    db: &Database,
    load_id: i64,
    number_of_codes: i64,
) -> Result<BucketLoad, CodepoolError> {
    transition(
        db,
        load_id,
        &[LoadStatus::Running],
        LoadStatus::Finished,
        Some(number_of_codes),
    )
    .await
}

/// PENDING or RUNNING -> FAILED.
pub async fn mark_failed(db: &Database, load_id: i64) -> Result<BucketLoad, CodepoolError> {
    transition(
        db,
        load_id,
        &[LoadStatus::Pending, LoadStatus::Running],
        LoadStatus::Failed,
        None,
    )
    .await
}

pub async fn get_load(db: &Database, load_id: i64) -> Result<Option<BucketLoad>, CodepoolError> {
    db.connection()
        .call(move |conn| select_load(conn, load_id))
        .await
        .map_err(map_tr_err)
}

/// Lookup by `(discount_id, uid)`.
pub async fn find_load_by_uid(
    db: &Database,
    discount_id: i64,
    uid: &str,
) -> Result<Option<BucketLoad>, CodepoolError> {
    let uid = uid.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {LOAD_COLUMNS} FROM bucket_code_loads l
                     WHERE l.discount_id = ?1 AND l.uid = ?2"
                ),
                params![discount_id, uid],
                row_to_load,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// The load the discount's pointer refers to.
pub async fn current_load(
    db: &Database,
    discount_id: i64,
) -> Result<Option<BucketLoad>, CodepoolError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {LOAD_COLUMNS} FROM bucket_code_loads l
                     JOIN discounts d ON d.last_bucket_code_load_id = l.id
                     WHERE d.id = ?1"
                ),
                params![discount_id],
                row_to_load,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// The PENDING or RUNNING load of a discount, if any.
pub async fn outstanding_load(
    db: &Database,
    discount_id: i64,
) -> Result<Option<BucketLoad>, CodepoolError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {LOAD_COLUMNS} FROM bucket_code_loads l
                     WHERE l.discount_id = ?1 AND l.status IN ('PENDING', 'RUNNING')"
                ),
                params![discount_id],
                row_to_load,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// All loads of a discount, newest first.
pub async fn list_loads(db: &Database, discount_id: i64) -> Result<Vec<BucketLoad>, CodepoolError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LOAD_COLUMNS} FROM bucket_code_loads l
                 WHERE l.discount_id = ?1 ORDER BY l.id DESC"
            ))?;
            let rows = stmt.query_map(params![discount_id], row_to_load)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// PENDING loads that are still their discount's current load, oldest first.
pub async fn list_pending_loads(db: &Database) -> Result<Vec<BucketLoad>, CodepoolError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LOAD_COLUMNS} FROM bucket_code_loads l
                 JOIN discounts d ON d.last_bucket_code_load_id = l.id
                 WHERE l.status = 'PENDING' ORDER BY l.id ASC"
            ))?;
            let rows = stmt.query_map([], row_to_load)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// RUNNING loads whose last status change is older than `older_than_secs`.
pub async fn list_stale_running_loads(
    db: &Database,
    older_than_secs: u64,
) -> Result<Vec<BucketLoad>, CodepoolError> {
    let modifier = format!("-{older_than_secs} seconds");
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LOAD_COLUMNS} FROM bucket_code_loads l
                 WHERE l.status = 'RUNNING'
                   AND l.updated_at < strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?1)
                 ORDER BY l.id ASC"
            ))?;
            let rows = stmt.query_map(params![modifier], row_to_load)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::discounts::{NewDiscount, create_discount};
    use codepool_core::DiscountCodeType;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir, i64) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let discount = create_discount(
            &db,
            NewDiscount {
                agreement_id: "agr-1".into(),
                name: "Ten percent".into(),
                code_type: DiscountCodeType::Bucket,
            },
        )
        .await
        .unwrap();
        (db, dir, discount.id)
    }

    #[tokio::test]
    async fn pending_load_becomes_current() {
        let (db, _dir, discount_id) = setup_db().await;

        let load = create_pending_load(&db, discount_id, "uid-1", Some("codes.csv"))
            .await
            .unwrap();
        assert_eq!(load.status, LoadStatus::Pending);
        assert_eq!(load.number_of_codes, None);
        assert_eq!(load.file_name.as_deref(), Some("codes.csv"));

        let current = current_load(&db, discount_id).await.unwrap().unwrap();
        assert_eq!(current.id, load.id);
        let by_uid = find_load_by_uid(&db, discount_id, "uid-1").await.unwrap().unwrap();
        assert_eq!(by_uid.id, load.id);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn second_pending_load_conflicts() {
        let (db, _dir, discount_id) = setup_db().await;

        create_pending_load(&db, discount_id, "uid-1", None).await.unwrap();
        let err = create_pending_load(&db, discount_id, "uid-2", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CodepoolError::Conflict(_)), "got {err:?}");

        // The losing upload leaves no row behind.
        assert_eq!(list_loads(&db, discount_id).await.unwrap().len(), 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn running_load_also_blocks() {
        let (db, _dir, discount_id) = setup_db().await;

        let load = create_pending_load(&db, discount_id, "uid-1", None).await.unwrap();
        mark_running(&db, load.id).await.unwrap();
        let err = create_pending_load(&db, discount_id, "uid-2", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CodepoolError::Conflict(_)));

        mark_finished(&db, load.id, 12).await.unwrap();
        let next = create_pending_load(&db, discount_id, "uid-2", None).await.unwrap();
        assert_eq!(current_load(&db, discount_id).await.unwrap().unwrap().id, next.id);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_discount_is_not_found() {
        let (db, _dir, _) = setup_db().await;
        let err = create_pending_load(&db, 999, "uid", None).await.unwrap_err();
        assert!(matches!(err, CodepoolError::NotFound { .. }));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn full_lifecycle_records_count() {
        let (db, _dir, discount_id) = setup_db().await;

        let load = create_pending_load(&db, discount_id, "uid-1", None).await.unwrap();
        let running = mark_running(&db, load.id).await.unwrap();
        assert_eq!(running.status, LoadStatus::Running);
        let finished = mark_finished(&db, load.id, 42).await.unwrap();
        assert_eq!(finished.status, LoadStatus::Finished);
        assert_eq!(finished.number_of_codes, Some(42));
        assert!(outstanding_load(&db, discount_id).await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn double_dispatch_is_rejected() {
        let (db, _dir, discount_id) = setup_db().await;

        let load = create_pending_load(&db, discount_id, "uid-1", None).await.unwrap();
        mark_running(&db, load.id).await.unwrap();
        let err = mark_running(&db, load.id).await.unwrap_err();
        assert!(matches!(err, CodepoolError::NotFound { .. }));

        let err = mark_running(&db, 12345).await.unwrap_err();
        assert!(matches!(err, CodepoolError::NotFound { .. }));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn terminal_states_are_final() {
        let (db, _dir, discount_id) = setup_db().await;

        let load = create_pending_load(&db, discount_id, "uid-1", None).await.unwrap();
        mark_failed(&db, load.id).await.unwrap();

        assert!(mark_running(&db, load.id).await.is_err());
        assert!(mark_finished(&db, load.id, 1).await.is_err());
        assert!(mark_failed(&db, load.id).await.is_err());

        let failed = get_load(&db, load.id).await.unwrap().unwrap();
        assert_eq!(failed.status, LoadStatus::Failed);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn finish_requires_running() {
        let (db, _dir, discount_id) = setup_db().await;
        let load = create_pending_load(&db, discount_id, "uid-1", None).await.unwrap();
        assert!(mark_finished(&db, load.id, 3).await.is_err());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn pending_listing_and_stale_detection() {
        let (db, _dir, discount_id) = setup_db().await;

        let load = create_pending_load(&db, discount_id, "uid-1", None).await.unwrap();
        let pending = list_pending_loads(&db).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, load.id);

        mark_running(&db, load.id).await.unwrap();
        assert!(list_pending_loads(&db).await.unwrap().is_empty());
        assert!(list_stale_running_loads(&db, 60).await.unwrap().is_empty());

        let id = load.id;
        db.connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "UPDATE bucket_code_loads SET updated_at = '2000-01-01T00:00:00.000Z'
                     WHERE id = ?1",
                    params![id],
                )
            })
            .await
            .unwrap();
        let stale = list_stale_running_loads(&db, 60).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, load.id);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_uploads_admit_exactly_one() {
        let (db, _dir, discount_id) = setup_db().await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                create_pending_load(&db, discount_id, &format!("uid-{i}"), None).await
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(CodepoolError::Conflict(_)) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(admitted, 1);
        db.close().await.unwrap();
    }
}
