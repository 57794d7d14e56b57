use std::{fmt, sync::Arc, time::SystemTime};

use genco_client::domain::HourlyGeneration;
use time::Date;

use crate::sources::RawGrid;

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn now(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("navigation error: {0}")]
    Navigation(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Produces the raw report grid for one date.
#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, date: Date) -> Result<Envelope<RawGrid>, PipelineError>;
}

pub trait Transform<I, O>: Send + Sync {
    fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

/// Appends a complete, already transformed record set.
#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync
where
    T: Send + Sync,
{
    async fn load(&self, input: &Envelope<Vec<T>>) -> Result<u64, PipelineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Transform,
    Load,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Extract => "extract",
            Stage::Transform => "transform",
            Stage::Load => "load",
        })
    }
}

/// Result of one run for one date. A run either loads everything or nothing.
#[derive(Debug)]
pub enum RunOutcome {
    Completed { rows: u64 },
    /// Extraction failed; nothing was transformed or stored.
    NoData { error: PipelineError },
    Failed { stage: Stage, error: PipelineError },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            RunOutcome::Completed { .. } => "completed",
            RunOutcome::NoData { .. } => "no_data",
            RunOutcome::Failed { .. } => "failed",
        }
    }
}

pub struct Pipeline<E, K> {
    pub extractor: E,
    pub transform: Arc<dyn Transform<RawGrid, Vec<HourlyGeneration>> + Send + Sync>,
    pub sink: K,
}

impl<E, K> Pipeline<E, K>
where
    E: Extractor,
    K: Sink<HourlyGeneration>,
{
    /// Extract, transform and load one date, strictly in that order.
    ///
    /// Stage errors are logged and folded into the returned outcome; the sink
    /// is only reached when extraction and transformation both succeeded.
    pub async fn run(&self, date: Date) -> RunOutcome {
        tracing::info!(%date, "etl run started");

        let outcome = self.run_stages(date).await;

        metrics::counter!("etl_runs_total", "outcome" => outcome.label()).increment(1);
        match &outcome {
            RunOutcome::Completed { rows } => {
                tracing::info!(%date, rows, "etl run completed successfully");
            }
            RunOutcome::NoData { error } => {
                tracing::error!(%date, error = %error, "data extraction failed, aborting run");
            }
            RunOutcome::Failed { stage, error } => {
                tracing::error!(%date, %stage, error = %error, "etl run failed");
            }
        }

        outcome
    }

    async fn run_stages(&self, date: Date) -> RunOutcome {
        stage_started(Stage::Extract);
        let grid = match self.extractor.extract(date).await {
            Ok(grid) => {
                tracing::info!(
                    stage = %Stage::Extract,
                    headers = grid.payload.headers.len(),
                    rows = grid.payload.rows.len(),
                    "stage succeeded"
                );
                grid
            }
            Err(error) => {
                stage_failed(Stage::Extract, &error);
                return RunOutcome::NoData { error };
            }
        };

        stage_started(Stage::Transform);
        let records = match self.transform.apply(grid) {
            Ok(records) => {
                tracing::info!(
                    stage = %Stage::Transform,
                    rows = records.payload.len(),
                    "stage succeeded"
                );
                records
            }
            Err(error) => {
                stage_failed(Stage::Transform, &error);
                return RunOutcome::Failed {
                    stage: Stage::Transform,
                    error,
                };
            }
        };

        if records.payload.is_empty() {
            tracing::warn!(%date, "transform produced no rows, nothing to load");
            return RunOutcome::Completed { rows: 0 };
        }

        stage_started(Stage::Load);
        match self.sink.load(&records).await {
            Ok(rows) => {
                tracing::info!(stage = %Stage::Load, rows, "stage succeeded");
                RunOutcome::Completed { rows }
            }
            Err(error) => {
                stage_failed(Stage::Load, &error);
                RunOutcome::Failed {
                    stage: Stage::Load,
                    error,
                }
            }
        }
    }
}

fn stage_started(stage: Stage) {
    tracing::info!(%stage, "stage started");
}

fn stage_failed(stage: Stage, error: &PipelineError) {
    metrics::counter!("etl_stage_failures_total", "stage" => stage.to_string()).increment(1);
    tracing::error!(%stage, error = %error, "stage failed");
}
