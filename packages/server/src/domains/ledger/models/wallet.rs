use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};

use crate::common::{UserId, WalletId};

/// A user's credit (PC) balance. Only ever changed alongside a ledger
/// transaction, and never below zero through a debit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub balance: Decimal,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn empty(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: WalletId::new(),
            user_id,
            balance: Decimal::ZERO,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn find_by_id(id: WalletId, pool: &PgPool) -> sqlx::Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM wallets WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_user(user_id: UserId, pool: &PgPool) -> sqlx::Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn insert(&self, conn: &mut PgConnection) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO wallets (id, user_id, balance, version, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(self.id)
        .bind(self.user_id)
        .bind(self.balance)
        .bind(self.version)
        .bind(self.created_at)
        .bind(self.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn update_versioned(
        &self,
        expected_version: i64,
        conn: &mut PgConnection,
    ) -> sqlx::Result<bool> {
        let result = sqlx::query(
            "UPDATE wallets SET balance = $3, version = $4, updated_at = $5
             WHERE id = $1 AND version = $2",
        )
        .bind(self.id)
        .bind(expected_version)
        .bind(self.balance)
        .bind(self.version)
        .bind(self.updated_at)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
