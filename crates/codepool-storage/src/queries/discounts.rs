// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discount records as seen by the bucket pipeline.

use codepool_core::{CodepoolError, Discount, DiscountCodeType, DiscountState};
use rusqlite::{OptionalExtension, Row, params};

use crate::database::{Database, map_tr_err, parse_column};

/// Fields supplied when registering a discount.
#[derive(Debug, Clone)]
pub struct NewDiscount {
    pub agreement_id: String,
    pub name: String,
    pub code_type: DiscountCodeType,
}

const DISCOUNT_COLUMNS: &str = "id, agreement_id, name, code_type, state, \
                                last_bucket_code_file_uid, last_bucket_code_load_id, \
                                created_at, updated_at";

fn row_to_discount(row: &Row<'_>) -> rusqlite::Result<Discount> {
    Ok(Discount {
        id: row.get(0)?,
        agreement_id: row.get(1)?,
        name: row.get(2)?,
        code_type: parse_column(3, row.get(3)?)?,
        state: parse_column(4, row.get(4)?)?,
        last_bucket_code_file_uid: row.get(5)?,
        last_bucket_code_load_id: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Insert a DRAFT discount.
pub async fn create_discount(db: &Database, new: NewDiscount) -> Result<Discount, CodepoolError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO discounts (agreement_id, name, code_type) VALUES (?1, ?2, ?3)",
                params![new.agreement_id, new.name, new.code_type.to_string()],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE id = ?1"),
                params![id],
                row_to_discount,
            )
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_discount(db: &Database, id: i64) -> Result<Option<Discount>, CodepoolError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE id = ?1"),
                params![id],
                row_to_discount,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Like [`get_discount`], but a missing row is `NotFound`.
pub async fn require_discount(db: &Database, id: i64) -> Result<Discount, CodepoolError> {
    get_discount(db, id)
        .await?
        .ok_or_else(|| CodepoolError::not_found("discount", id))
}

/// Discounts of one strategy, by id.
pub async fn list_discounts_by_type(
    db: &Database,
    code_type: DiscountCodeType,
) -> Result<Vec<Discount>, CodepoolError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE code_type = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![code_type.to_string()], row_to_discount)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn update_state(
    db: &Database,
    id: i64,
    state: DiscountState,
) -> Result<(), CodepoolError> {
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE discounts SET state = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![state.to_string(), id],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(CodepoolError::not_found("discount", id));
    }
    Ok(())
}

pub async fn update_code_type(
    db: &Database,
    id: i64,
    code_type: DiscountCodeType,
) -> Result<(), CodepoolError> {
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE discounts SET code_type = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![code_type.to_string(), id],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(CodepoolError::not_found("discount", id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn bucket(name: &str) -> NewDiscount {
        NewDiscount {
            agreement_id: "agr-1".into(),
            name: name.into(),
            code_type: DiscountCodeType::Bucket,
        }
    }

    #[tokio::test]
    async fn create_starts_in_draft() {
        let (db, _dir) = setup_db().await;

        let d = create_discount(&db, bucket("Summer")).await.unwrap();
        assert_eq!(d.state, DiscountState::Draft);
        assert_eq!(d.code_type, DiscountCodeType::Bucket);
        assert_eq!(d.last_bucket_code_load_id, None);

        let fetched = require_discount(&db, d.id).await.unwrap();
        assert_eq!(fetched, d);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn missing_discount() {
        let (db, _dir) = setup_db().await;
        assert!(get_discount(&db, 5).await.unwrap().is_none());
        assert!(matches!(
            require_discount(&db, 5).await.unwrap_err(),
            CodepoolError::NotFound { entity: "discount", .. }
        ));
        assert!(update_state(&db, 5, DiscountState::Published).await.is_err());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn state_and_type_updates() {
        let (db, _dir) = setup_db().await;
        let d = create_discount(&db, bucket("A")).await.unwrap();
        create_discount(
            &db,
            NewDiscount {
                agreement_id: "agr-1".into(),
                name: "B".into(),
                code_type: DiscountCodeType::Static,
            },
        )
        .await
        .unwrap();

        update_state(&db, d.id, DiscountState::Published).await.unwrap();
        assert_eq!(
            require_discount(&db, d.id).await.unwrap().state,
            DiscountState::Published
        );

        assert_eq!(
            list_discounts_by_type(&db, DiscountCodeType::Bucket)
                .await
                .unwrap()
                .len(),
            1
        );
        update_code_type(&db, d.id, DiscountCodeType::Api).await.unwrap();
        assert!(
            list_discounts_by_type(&db, DiscountCodeType::Bucket)
                .await
                .unwrap()
                .is_empty()
        );
        db.close().await.unwrap();
    }
}
