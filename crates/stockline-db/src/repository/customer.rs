//! # Customer Repository
//!
//! Customers and the loyalty point journal.
//!
//! A customer's `loyalty_points` is never incremented in place: it is
//! recomputed from the sum of their loyalty transactions, so the balance
//! and the journal cannot drift apart.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use stockline_core::{Customer, LoyaltyTransaction};
use tracing::debug;

use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: String,
    organization_id: String,
    name: String,
    loyalty_points: i64,
    is_active: bool,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            id: row.id,
            organization_id: row.organization_id,
            name: row.name,
            loyalty_points: row.loyalty_points,
            is_active: row.is_active,
        }
    }
}

/// Loads an active customer of the organization.
pub async fn find_active(
    conn: &mut SqliteConnection,
    organization_id: &str,
    customer_id: &str,
) -> DbResult<Customer> {
    let row: Option<CustomerRow> = sqlx::query_as(
        r#"
        SELECT id, organization_id, name, loyalty_points, is_active
        FROM customers
        WHERE id = ?1 AND organization_id = ?2 AND is_active = 1
        "#,
    )
    .bind(customer_id)
    .bind(organization_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(Customer::from)
        .ok_or_else(|| DbError::not_found("Customer", customer_id))
}

pub async fn insert(conn: &mut SqliteConnection, customer: &Customer) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO customers (id, organization_id, name, loyalty_points, is_active)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&customer.id)
    .bind(&customer.organization_id)
    .bind(&customer.name)
    .bind(customer.loyalty_points)
    .bind(customer.is_active)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn insert_loyalty_transaction(
    conn: &mut SqliteConnection,
    entry: &LoyaltyTransaction,
) -> DbResult<()> {
    debug!(
        customer_id = %entry.customer_id,
        points = entry.points,
        "Recording loyalty transaction"
    );

    sqlx::query(
        r#"
        INSERT INTO loyalty_transactions (
            id, organization_id, customer_id, sale_id, points, description, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.organization_id)
    .bind(&entry.customer_id)
    .bind(&entry.sale_id)
    .bind(entry.points)
    .bind(&entry.description)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Recomputes the running balance from the journal and returns it.
pub async fn recompute_loyalty_points(
    conn: &mut SqliteConnection,
    customer_id: &str,
) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        UPDATE customers SET loyalty_points = (
            SELECT COALESCE(SUM(points), 0) FROM loyalty_transactions WHERE customer_id = ?1
        )
        WHERE id = ?1
        "#,
    )
    .bind(customer_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Customer", customer_id));
    }

    let balance: i64 = sqlx::query_scalar("SELECT loyalty_points FROM customers WHERE id = ?1")
        .bind(customer_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(balance)
}

#[derive(Debug, sqlx::FromRow)]
struct LoyaltyRow {
    id: String,
    organization_id: String,
    customer_id: String,
    sale_id: Option<String>,
    points: i64,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

pub async fn list_loyalty_transactions(
    conn: &mut SqliteConnection,
    customer_id: &str,
) -> DbResult<Vec<LoyaltyTransaction>> {
    let rows: Vec<LoyaltyRow> = sqlx::query_as(
        r#"
        SELECT id, organization_id, customer_id, sale_id, points, description, created_at
        FROM loyalty_transactions
        WHERE customer_id = ?1
        ORDER BY rowid
        "#,
    )
    .bind(customer_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| LoyaltyTransaction {
            id: r.id,
            organization_id: r.organization_id,
            customer_id: r.customer_id,
            sale_id: r.sale_id,
            points: r.points,
            description: r.description,
            created_at: r.created_at,
        })
        .collect())
}
