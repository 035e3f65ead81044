//! # Unit of Measure Repository

use sqlx::SqliteConnection;
use stockline_core::{UnitOfMeasure, UnitType};
use tracing::debug;

use super::{decimal_text, parse_optional_decimal};
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct UnitRow {
    id: String,
    organization_id: String,
    name: String,
    symbol: String,
    unit_type: UnitType,
    base_unit_id: Option<String>,
    conversion_factor: Option<String>,
}

impl TryFrom<UnitRow> for UnitOfMeasure {
    type Error = DbError;

    fn try_from(row: UnitRow) -> DbResult<Self> {
        Ok(UnitOfMeasure {
            conversion_factor: parse_optional_decimal(
                "units_of_measure.conversion_factor",
                row.conversion_factor.as_deref(),
            )?,
            id: row.id,
            organization_id: row.organization_id,
            name: row.name,
            symbol: row.symbol,
            unit_type: row.unit_type,
            base_unit_id: row.base_unit_id,
        })
    }
}

/// All units of an organization, in insertion order.
pub async fn list_for_organization(
    conn: &mut SqliteConnection,
    organization_id: &str,
) -> DbResult<Vec<UnitOfMeasure>> {
    let rows: Vec<UnitRow> = sqlx::query_as(
        r#"
        SELECT id, organization_id, name, symbol, unit_type, base_unit_id, conversion_factor
        FROM units_of_measure
        WHERE organization_id = ?1
        ORDER BY rowid
        "#,
    )
    .bind(organization_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(UnitOfMeasure::try_from).collect()
}

pub async fn insert(conn: &mut SqliteConnection, unit: &UnitOfMeasure) -> DbResult<()> {
    debug!(id = %unit.id, symbol = %unit.symbol, "Inserting unit of measure");

    sqlx::query(
        r#"
        INSERT INTO units_of_measure (
            id, organization_id, name, symbol, unit_type, base_unit_id, conversion_factor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&unit.id)
    .bind(&unit.organization_id)
    .bind(&unit.name)
    .bind(&unit.symbol)
    .bind(unit.unit_type)
    .bind(&unit.base_unit_id)
    .bind(unit.conversion_factor.map(decimal_text))
    .execute(&mut *conn)
    .await?;

    Ok(())
}
