use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};

use crate::common::{TransactionId, WalletId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// Immutable ledger entry. `amount` is signed: deposits positive,
/// withdrawals negative. Only `pending -> completed | failed` may change
/// after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub description: String,
    pub status: TransactionStatus,
    /// Correlation id with the payment gateway, or an internal idempotency key.
    pub external_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        wallet_id: WalletId,
        amount: Decimal,
        kind: TransactionKind,
        description: impl Into<String>,
        status: TransactionStatus,
        external_reference: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            wallet_id,
            amount,
            kind,
            description: description.into(),
            status,
            external_reference,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TransactionStatus::Completed
    }

    pub fn is_pending_withdrawal(&self) -> bool {
        self.kind == TransactionKind::Withdrawal && self.status == TransactionStatus::Pending
    }

    pub async fn find_by_id(id: TransactionId, pool: &PgPool) -> sqlx::Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_for_wallet(wallet_id: WalletId, pool: &PgPool) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM transactions WHERE wallet_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(wallet_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_reference(reference: &str, pool: &PgPool) -> sqlx::Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM transactions WHERE external_reference = $1")
            .bind(reference)
            .fetch_optional(pool)
            .await
    }

    pub async fn insert(&self, conn: &mut PgConnection) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO transactions (
                id, wallet_id, amount, kind, description, status, external_reference,
                created_at, updated_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(self.id)
        .bind(self.wallet_id)
        .bind(self.amount)
        .bind(self.kind)
        .bind(&self.description)
        .bind(self.status)
        .bind(&self.external_reference)
        .bind(self.created_at)
        .bind(self.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Moves a transaction out of `expected_status` (status and gateway
    /// reference only). Returns `false` if it was already moved.
    pub async fn update_settlement(
        &self,
        expected_status: TransactionStatus,
        conn: &mut PgConnection,
    ) -> sqlx::Result<bool> {
        let result = sqlx::query(
            "UPDATE transactions
             SET status = $3, external_reference = $4, updated_at = $5
             WHERE id = $1 AND status = $2",
        )
        .bind(self.id)
        .bind(expected_status)
        .bind(self.status)
        .bind(&self.external_reference)
        .bind(self.updated_at)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
