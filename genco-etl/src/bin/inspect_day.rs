use anyhow::{anyhow, bail, Result};
use genco_client::db::rows_for_date;
use genco_etl::{config::AppConfig, observability, run_date};
use sqlx::mysql::MySqlPoolOptions;
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: inspect_day <YYYY-MM-DD>");
    }
    let date = run_date::resolve(Some(&args[1]))?;
    let label = genco_client::domain::date_label(date)?;

    let cfg = AppConfig::load()?;
    let mysql = cfg
        .mysql
        .as_ref()
        .ok_or_else(|| anyhow!("inspect_day requires a [mysql] section"))?;

    let pool = MySqlPoolOptions::new()
        .max_connections(1)
        .connect_with(mysql.connect_options())
        .await?;

    let rows = rows_for_date(&pool, &mysql.table, &label).await?;

    for r in &rows {
        tracing::info!(
            hour = %r.hour,
            gencos = %r.gencos,
            mwh = r.energy_generated_mwh.as_deref().unwrap_or("-"),
            "stored reading"
        );
    }
    let units = rows
        .iter()
        .map(|r| r.gencos.as_str())
        .collect::<std::collections::BTreeSet<_>>()
        .len();
    tracing::info!(date = %label, rows = rows.len(), units, "stored rows for date");

    Ok(())
}
