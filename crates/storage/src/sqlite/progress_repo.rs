use async_trait::async_trait;
use chrono::Utc;
use practice_core::model::{UserId, UserProgressLedger};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{ser, user_id_to_i64};
use crate::repository::{ProgressRepository, StorageError, decode_ledger, encode_ledger};

#[async_trait]
impl ProgressRepository for SqliteRepository {
    async fn load_ledger(&self, user_id: UserId) -> Result<Option<UserProgressLedger>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT ledger
                FROM progress_ledgers
                WHERE user_id = ?1
            ",
        )
        .bind(user_id_to_i64(user_id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("ledger").map_err(ser)?;
        decode_ledger(&raw).map(Some)
    }

    async fn save_ledger(
        &self,
        user_id: UserId,
        ledger: &UserProgressLedger,
    ) -> Result<(), StorageError> {
        let encoded = encode_ledger(ledger)?;
        sqlx::query(
            r"
                INSERT INTO progress_ledgers (user_id, ledger, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(user_id) DO UPDATE SET
                    ledger = excluded.ledger,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(user_id_to_i64(user_id)?)
        .bind(encoded)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }
}
