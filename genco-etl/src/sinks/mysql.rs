use std::{
    collections::BTreeSet,
    time::{Duration, SystemTime},
};

use genco_client::{
    db::{count_for_date, delete_for_date, table_ident},
    domain::HourlyGeneration,
};
use sqlx::{MySql, MySqlPool, QueryBuilder};

use crate::pipeline::{Envelope, PipelineError, Sink};

/// Appends hourly records to MySQL in multi-row `INSERT` batches.
///
/// All batches of one load share a transaction, so a failed load leaves the
/// table untouched.
pub struct MySqlSink {
    pool: MySqlPool,
    table: String,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
    replace_existing_date: bool,
}

/// One multi-row `INSERT` per chunk of at most `batch_size` records.
fn insert_batches<'a>(
    table: &str,
    records: &'a [HourlyGeneration],
    batch_size: usize,
) -> Vec<QueryBuilder<'a, MySql>> {
    records
        .chunks(batch_size.max(1))
        .map(|batch| {
            let mut builder = QueryBuilder::<MySql>::new(format!(
                "INSERT INTO {table} (Date, Hour, Gencos, EnergyGeneratedMWh) "
            ));
            builder.push_values(batch, |mut b, r| {
                b.push_bind(&r.date)
                    .push_bind(&r.hour)
                    .push_bind(&r.gencos)
                    .push_bind(&r.energy_generated_mwh);
            });
            builder
        })
        .collect()
}

impl MySqlSink {
    pub fn new(
        pool: MySqlPool,
        table: impl Into<String>,
        batch_size: usize,
        max_retries: u32,
        retry_backoff: Duration,
        replace_existing_date: bool,
    ) -> Self {
        Self {
            pool,
            table: table.into(),
            batch_size: batch_size.max(1),
            max_retries,
            retry_backoff,
            replace_existing_date,
        }
    }

    async fn write_all(&self, records: &[HourlyGeneration]) -> anyhow::Result<u64> {
        let table = table_ident(&self.table)?;
        let dates: BTreeSet<&str> = records.iter().map(|r| r.date.as_str()).collect();

        let mut tx = self.pool.begin().await?;

        for date in &dates {
            if self.replace_existing_date {
                let removed = delete_for_date(&mut *tx, &self.table, date).await?;
                if removed > 0 {
                    tracing::info!(date, removed, "replacing previously stored rows");
                }
            } else {
                let existing = count_for_date(&mut *tx, &self.table, date).await?;
                if existing > 0 {
                    tracing::warn!(
                        date,
                        existing,
                        "rows already stored for this date; appending duplicates"
                    );
                }
            }
        }

        let mut inserted = 0;
        for mut builder in insert_batches(&table, records, self.batch_size) {
            let result = builder.build().execute(&mut *tx).await?;
            inserted += result.rows_affected();
            tracing::debug!(batch_rows = result.rows_affected(), "inserted batch");
        }

        tx.commit().await?;
        Ok(inserted)
    }
}

#[async_trait::async_trait]
impl Sink<HourlyGeneration> for MySqlSink {
    async fn load(&self, input: &Envelope<Vec<HourlyGeneration>>) -> Result<u64, PipelineError> {
        if input.payload.is_empty() {
            return Ok(0);
        }

        let mut attempt: u32 = 0;
        loop {
            match self.write_all(&input.payload).await {
                Ok(inserted) => {
                    metrics::counter!("mysql_ingested_records_total").increment(inserted);

                    if let Ok(dur) = SystemTime::now().duration_since(input.received_at) {
                        metrics::histogram!("ingest_end_to_end_latency_seconds")
                            .record(dur.as_secs_f64());
                    }

                    tracing::info!(
                        rows = inserted,
                        table = %self.table,
                        "data inserted successfully into the database"
                    );
                    return Ok(inserted);
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        "mysql sink write failed, retrying with backoff"
                    );
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "mysql sink write failed, giving up");
                    metrics::counter!("mysql_sink_errors_total").increment(1);
                    return Err(PipelineError::Storage(format!("{e:#}")));
                }
            }
        }
    }
}
