//! # Organization Settings Repository

use chrono::Utc;
use sqlx::SqliteConnection;
use stockline_core::{InventoryPolicy, OrganizationSettings, TaxRate};

use super::{decimal_text, parse_decimal};
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct SettingsRow {
    organization_id: String,
    default_tax_rate: String,
    negative_stock_allowed: bool,
    inventory_policy: InventoryPolicy,
}

impl TryFrom<SettingsRow> for OrganizationSettings {
    type Error = DbError;

    fn try_from(row: SettingsRow) -> DbResult<Self> {
        let rate = parse_decimal("organization_settings.default_tax_rate", &row.default_tax_rate)?;
        let default_tax_rate = TaxRate::new(rate).map_err(|_| DbError::Decode {
            column: "organization_settings.default_tax_rate".to_string(),
            value: row.default_tax_rate.clone(),
        })?;
        Ok(OrganizationSettings {
            organization_id: row.organization_id,
            default_tax_rate,
            negative_stock_allowed: row.negative_stock_allowed,
            inventory_policy: row.inventory_policy,
        })
    }
}

pub async fn find(
    conn: &mut SqliteConnection,
    organization_id: &str,
) -> DbResult<Option<OrganizationSettings>> {
    let row: Option<SettingsRow> = sqlx::query_as(
        r#"
        SELECT organization_id, default_tax_rate, negative_stock_allowed, inventory_policy
        FROM organization_settings
        WHERE organization_id = ?1
        "#,
    )
    .bind(organization_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(OrganizationSettings::try_from).transpose()
}

pub async fn upsert(conn: &mut SqliteConnection, settings: &OrganizationSettings) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO organization_settings (
            organization_id, default_tax_rate, negative_stock_allowed, inventory_policy, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT (organization_id) DO UPDATE SET
            default_tax_rate = excluded.default_tax_rate,
            negative_stock_allowed = excluded.negative_stock_allowed,
            inventory_policy = excluded.inventory_policy,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&settings.organization_id)
    .bind(decimal_text(settings.default_tax_rate.fraction()))
    .bind(settings.negative_stock_allowed)
    .bind(settings.inventory_policy)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}
