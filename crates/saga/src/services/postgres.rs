//! PostgreSQL-backed ledgers.

use async_trait::async_trait;
use domain::{Money, ProductId, UserId};
use sqlx::{PgPool, Row, postgres::PgPoolOptions, postgres::PgRow};

use crate::error::SagaError;
use crate::services::balance::{Account, BalanceLedger};
use crate::services::warehouse::{Catalog, Product, StockLedger};

/// Balance, catalog and stock ledgers stored in PostgreSQL.
///
/// Every adjustment is a single `UPDATE ... RETURNING` statement, so a
/// concurrent debit can never observe a half-applied change. Negative
/// balances and stock are rejected by `CHECK` constraints on the tables.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Creates a ledger over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url`.
    pub async fn connect(url: &str) -> Result<Self, SagaError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Inserts accounts that do not exist yet. Existing balances are kept.
    pub async fn seed_accounts(&self, accounts: &[Account]) -> Result<(), SagaError> {
        for account in accounts {
            sqlx::query(
                r#"
                INSERT INTO accounts (user_id, balance_cents)
                VALUES ($1, $2)
                ON CONFLICT (user_id) DO NOTHING
                "#,
            )
            .bind(i64::from(account.user_id.get()))
            .bind(account.balance.cents())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Inserts products that do not exist yet. Existing stock is kept.
    pub async fn seed_products(&self, products: &[Product]) -> Result<(), SagaError> {
        for product in products {
            sqlx::query(
                r#"
                INSERT INTO products (product_id, name, price_cents, stock_qty)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (product_id) DO NOTHING
                "#,
            )
            .bind(i64::from(product.id.get()))
            .bind(&product.name)
            .bind(product.price.cents())
            .bind(i64::from(product.stock_qty))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<Product, SagaError> {
        Ok(Product {
            id: ProductId::new(column_u32(&row, "product_id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock_qty: column_u32(&row, "stock_qty")?,
        })
    }
}

fn column_u32(row: &PgRow, column: &str) -> Result<u32, SagaError> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).map_err(|e| {
        SagaError::Database(sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
    })
}

fn is_check_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_check_violation())
}

#[async_trait]
impl BalanceLedger for PostgresLedger {
    async fn get_balance(&self, user_id: UserId) -> Result<Option<Money>, SagaError> {
        let cents: Option<i64> =
            sqlx::query_scalar("SELECT balance_cents FROM accounts WHERE user_id = $1")
                .bind(i64::from(user_id.get()))
                .fetch_optional(&self.pool)
                .await?;
        Ok(cents.map(Money::from_cents))
    }

    async fn adjust_balance(&self, user_id: UserId, delta: Money) -> Result<Money, SagaError> {
        let result: Result<Option<i64>, sqlx::Error> = sqlx::query_scalar(
            r#"
            UPDATE accounts
            SET balance_cents = balance_cents + $2
            WHERE user_id = $1
            RETURNING balance_cents
            "#,
        )
        .bind(i64::from(user_id.get()))
        .bind(delta.cents())
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some(cents)) => Ok(Money::from_cents(cents)),
            Ok(None) => Err(SagaError::UnknownUser(user_id)),
            Err(e) if is_check_violation(&e) => {
                let available = self.get_balance(user_id).await?.unwrap_or_default();
                Err(SagaError::InsufficientFunds {
                    user_id,
                    required: -delta,
                    available,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, SagaError> {
        let rows = sqlx::query("SELECT user_id, balance_cents FROM accounts ORDER BY user_id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Account {
                    user_id: UserId::new(column_u32(&row, "user_id")?),
                    balance: Money::from_cents(row.try_get("balance_cents")?),
                })
            })
            .collect()
    }
}

#[async_trait]
impl Catalog for PostgresLedger {
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>, SagaError> {
        let row = sqlx::query(
            "SELECT product_id, name, price_cents, stock_qty FROM products WHERE product_id = $1",
        )
        .bind(i64::from(product_id.get()))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>, SagaError> {
        let rows = sqlx::query(
            "SELECT product_id, name, price_cents, stock_qty FROM products ORDER BY product_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }
}

#[async_trait]
impl StockLedger for PostgresLedger {
    async fn get_stock(&self, product_id: ProductId) -> Result<Option<u32>, SagaError> {
        let row = sqlx::query("SELECT stock_qty FROM products WHERE product_id = $1")
            .bind(i64::from(product_id.get()))
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| column_u32(&row, "stock_qty")).transpose()
    }

    async fn adjust_stock(&self, product_id: ProductId, delta: i64) -> Result<u32, SagaError> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock_qty = stock_qty + $2
            WHERE product_id = $1
            RETURNING stock_qty
            "#,
        )
        .bind(i64::from(product_id.get()))
        .bind(delta)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some(row)) => column_u32(&row, "stock_qty"),
            Ok(None) => Err(SagaError::UnknownProduct(product_id)),
            Err(e) if is_check_violation(&e) => {
                let available = self.get_stock(product_id).await?.unwrap_or_default();
                Err(SagaError::InsufficientStock {
                    product_id,
                    requested: u32::try_from(delta.unsigned_abs()).unwrap_or(u32::MAX),
                    available,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}
