// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Idempotency ledger of sent threshold notifications.

use codepool_core::{CodepoolError, NotificationRecord};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};

pub async fn is_recorded(db: &Database, key: &str) -> Result<bool, CodepoolError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM notifications WHERE key = ?1)",
                params![key],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_record(
    db: &Database,
    key: &str,
) -> Result<Option<NotificationRecord>, CodepoolError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT key, sent_at FROM notifications WHERE key = ?1",
                params![key],
                |row| {
                    Ok(NotificationRecord {
                        key: row.get(0)?,
                        sent_at: row.get(1)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Write a ledger entry. Returns `false` if the key was already present.
pub async fn record_sent(db: &Database, key: &str) -> Result<bool, CodepoolError> {
    let key = key.to_string();
    let inserted = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO notifications (key) VALUES (?1)",
                params![key],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(inserted == 1)
}

/// Ledger entries of one discount, ordered by key.
pub async fn list_for_discount(
    db: &Database,
    discount_id: i64,
) -> Result<Vec<NotificationRecord>, CodepoolError> {
    let prefix = NotificationRecord::key_prefix(discount_id);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key, sent_at FROM notifications
                 WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
            )?;
            let rows = stmt.query_map(params![prefix], |row| {
                Ok(NotificationRecord {
                    key: row.get(0)?,
                    sent_at: row.get(1)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
