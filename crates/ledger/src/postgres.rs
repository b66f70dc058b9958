use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    EntitlementRecord, GrantOutcome, GrantRequest, LedgerError, PremiumProjection,
    ProcessedTransaction, ProductId, Result, TransactionId, UserId,
    store::{EntitlementStore, UserStore, UserStream},
};

/// PostgreSQL-backed ledger.
///
/// Grants are row-level upserts inside a transaction, so concurrent grants
/// for the same `(user, product)` serialize on the row while grants for
/// other pairs proceed independently.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Creates a new PostgreSQL ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<EntitlementRecord> {
        let quantity: i64 = row.try_get("quantity")?;
        Ok(EntitlementRecord {
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity: u64::try_from(quantity)
                .map_err(|_| LedgerError::Inconsistent(format!("negative quantity {quantity}")))?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_transaction(row: PgRow) -> Result<ProcessedTransaction> {
        let increment: i64 = row.try_get("increment")?;
        Ok(ProcessedTransaction {
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            transaction_id: TransactionId::new(row.try_get::<String, _>("transaction_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            increment: u32::try_from(increment)
                .map_err(|_| LedgerError::Inconsistent(format!("bad increment {increment}")))?,
            granted_at: row.try_get("granted_at")?,
        })
    }
}

#[async_trait]
impl EntitlementStore for PostgresLedger {
    async fn grant(&self, request: GrantRequest) -> Result<GrantOutcome> {
        request.validate()?;

        let user = request.user_id.as_uuid();
        let increment = i64::from(request.increment_by);
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        if let Some(ref txn) = request.dedupe_key {
            let inserted = sqlx::query(
                r#"
                INSERT INTO processed_transactions (user_id, transaction_id, product_id, increment, granted_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (user_id, transaction_id) DO NOTHING
                "#,
            )
            .bind(user)
            .bind(txn.as_str())
            .bind(request.product_id.as_str())
            .bind(increment)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if inserted == 0 {
                let original: String = sqlx::query_scalar(
                    "SELECT product_id FROM processed_transactions WHERE user_id = $1 AND transaction_id = $2",
                )
                .bind(user)
                .bind(txn.as_str())
                .fetch_one(&mut *tx)
                .await?;

                if original != request.product_id.as_str() {
                    return Err(LedgerError::TransactionReused {
                        transaction_id: txn.clone(),
                        original_product: ProductId::new(original),
                        attempted_product: request.product_id,
                    });
                }

                let row = sqlx::query(
                    r#"
                    SELECT user_id, product_id, quantity, created_at, updated_at
                    FROM entitlements
                    WHERE user_id = $1 AND product_id = $2
                    "#,
                )
                .bind(user)
                .bind(request.product_id.as_str())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| {
                    LedgerError::Inconsistent(format!(
                        "transaction {txn} recorded without an entitlement record"
                    ))
                })?;

                tx.commit().await?;
                return Ok(GrantOutcome {
                    record: Self::row_to_record(row)?,
                    duplicate: true,
                });
            }
        }

        let row = sqlx::query(
            r#"
            INSERT INTO entitlements (user_id, product_id, quantity, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (user_id, product_id) DO UPDATE SET
                quantity = entitlements.quantity + EXCLUDED.quantity,
                updated_at = EXCLUDED.updated_at
            RETURNING user_id, product_id, quantity, created_at, updated_at
            "#,
        )
        .bind(user)
        .bind(request.product_id.as_str())
        .bind(increment)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(GrantOutcome {
            record: Self::row_to_record(row)?,
            duplicate: false,
        })
    }

    async fn get_record(
        &self,
        user_id: UserId,
        product_id: &ProductId,
    ) -> Result<Option<EntitlementRecord>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, product_id, quantity, created_at, updated_at
            FROM entitlements
            WHERE user_id = $1 AND product_id = $2
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn records_for_user(&self, user_id: UserId) -> Result<Vec<EntitlementRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, product_id, quantity, created_at, updated_at
            FROM entitlements
            WHERE user_id = $1
            ORDER BY product_id ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn processed_transactions(&self, user_id: UserId) -> Result<Vec<ProcessedTransaction>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, transaction_id, product_id, increment, granted_at
            FROM processed_transactions
            WHERE user_id = $1
            ORDER BY granted_at ASC, transaction_id ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_transaction).collect()
    }

    async fn stream_users(&self) -> Result<UserStream> {
        use futures_util::StreamExt;

        let stream = sqlx::query(
            r#"
            SELECT user_id FROM entitlements
            UNION
            SELECT user_id FROM users
            ORDER BY user_id ASC
            "#,
        )
        .fetch(&self.pool)
        .map(|result| -> Result<UserId> {
            let row = result?;
            Ok(UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?))
        });

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl UserStore for PostgresLedger {
    async fn is_premium(&self, user_id: UserId) -> Result<bool> {
        let premium: Option<bool> =
            sqlx::query_scalar("SELECT is_premium FROM users WHERE user_id = $1")
                .bind(user_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        Ok(premium.unwrap_or(false))
    }

    async fn project_premium(
        &self,
        user_id: UserId,
        premium_products: &[ProductId],
    ) -> Result<PremiumProjection> {
        let user = user_id.as_uuid();
        let products: Vec<String> = premium_products
            .iter()
            .map(|p| p.as_str().to_string())
            .collect();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (user_id, is_premium, updated_at)
            VALUES ($1, FALSE, $2)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        // The row lock serializes projections for this user; the entitlement
        // read below runs after it is acquired and sees every committed grant.
        let previous: bool =
            sqlx::query_scalar("SELECT is_premium FROM users WHERE user_id = $1 FOR UPDATE")
                .bind(user)
                .fetch_one(&mut *tx)
                .await?;

        let is_premium: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM entitlements
                WHERE user_id = $1 AND product_id = ANY($2) AND quantity >= 1
            )
            "#,
        )
        .bind(user)
        .bind(products)
        .fetch_one(&mut *tx)
        .await?;

        if previous != is_premium {
            sqlx::query("UPDATE users SET is_premium = $2, updated_at = $3 WHERE user_id = $1")
                .bind(user)
                .bind(is_premium)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(PremiumProjection {
            is_premium,
            changed: previous != is_premium,
        })
    }
}
