use anyhow::{bail, Result};
use sqlx::{MySql, MySqlPool};

use crate::domain::HourlyGeneration;

/// Validate a configured table name and return it backtick-quoted.
///
/// Table names cannot be bound as parameters, so only plain identifiers are
/// accepted.
pub fn table_ident(table: &str) -> Result<String> {
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("invalid table name '{table}'");
    }
    Ok(format!("`{table}`"))
}

/// Fetch the stored hourly rows for one date, ordered by hour then unit.
pub async fn rows_for_date(
    pool: &MySqlPool,
    table: &str,
    date: &str,
) -> Result<Vec<HourlyGeneration>> {
    let sql = format!(
        r#"
        SELECT
            CAST(Date AS CHAR) AS Date,
            CAST(Hour AS CHAR) AS Hour,
            CAST(Gencos AS CHAR) AS Gencos,
            CAST(EnergyGeneratedMWh AS CHAR) AS EnergyGeneratedMWh
        FROM {}
        WHERE Date = ?
        ORDER BY Hour, Gencos
        "#,
        table_ident(table)?
    );

    let rows = sqlx::query_as::<_, HourlyGeneration>(&sql)
        .bind(date)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Count the rows already stored for a date.
pub async fn count_for_date<'c, E>(executor: E, table: &str, date: &str) -> Result<i64>
where
    E: sqlx::Executor<'c, Database = MySql>,
{
    let sql = format!("SELECT COUNT(*) FROM {} WHERE Date = ?", table_ident(table)?);
    let count: i64 = sqlx::query_scalar(&sql).bind(date).fetch_one(executor).await?;
    Ok(count)
}

/// Delete every stored row for a date, returning how many were removed.
pub async fn delete_for_date<'c, E>(executor: E, table: &str, date: &str) -> Result<u64>
where
    E: sqlx::Executor<'c, Database = MySql>,
{
    let sql = format!("DELETE FROM {} WHERE Date = ?", table_ident(table)?);
    let result = sqlx::query(&sql).bind(date).execute(executor).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_ident_quotes_plain_names() {
        assert_eq!(
            table_ident("combined_hourly_energy_generated_mwh").unwrap(),
            "`combined_hourly_energy_generated_mwh`"
        );
    }

    #[test]
    fn table_ident_rejects_injection() {
        assert!(table_ident("t; DROP TABLE t").is_err());
        assert!(table_ident("").is_err());
        assert!(table_ident("a`b").is_err());
    }
}
