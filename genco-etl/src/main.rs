use anyhow::{anyhow, Result};
use genco_client::domain::HourlyGeneration;
use genco_etl::{
    config::{AppConfig, SinkKind, SourceMode},
    metrics_textfile, observability,
    pipeline::{Envelope, Extractor, Pipeline, PipelineError, Sink},
    run_date,
    sinks::{CsvFileSink, MySqlSink},
    sources::{InteractivePageSource, RawGrid, StaticPageSource},
    transform,
};
use sqlx::mysql::MySqlPoolOptions;
use std::{env, process::ExitCode, sync::Arc, time::Duration};
use time::Date;

enum PageExtractor {
    Interactive(InteractivePageSource),
    Static(StaticPageSource),
}

#[async_trait::async_trait]
impl Extractor for PageExtractor {
    async fn extract(&self, date: Date) -> Result<Envelope<RawGrid>, PipelineError> {
        match self {
            Self::Interactive(s) => s.extract(date).await,
            Self::Static(s) => s.extract(date).await,
        }
    }
}

enum StorageSink {
    MySql(MySqlSink),
    Csv(CsvFileSink),
}

#[async_trait::async_trait]
impl Sink<HourlyGeneration> for StorageSink {
    async fn load(&self, input: &Envelope<Vec<HourlyGeneration>>) -> Result<u64, PipelineError> {
        match self {
            Self::MySql(s) => s.load(input).await,
            Self::Csv(s) => s.load(input).await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    if cfg.metrics.is_some() {
        metrics_textfile::init()?;
    }

    let arg = env::args().nth(1);
    let date = run_date::resolve(arg.as_deref())?;

    let extractor = match cfg.source.mode {
        SourceMode::Interactive => {
            PageExtractor::Interactive(InteractivePageSource::new(&cfg.source))
        }
        SourceMode::Static => PageExtractor::Static(StaticPageSource::new(
            &cfg.source.base_url,
            cfg.source.page_load_timeout(),
        )?),
    };

    let sink = match cfg.sink.kind {
        SinkKind::Mysql => {
            let mysql = cfg
                .mysql
                .as_ref()
                .ok_or_else(|| anyhow!("sink.kind = \"mysql\" requires a [mysql] section"))?;

            let pool = MySqlPoolOptions::new()
                .max_connections(mysql.max_connections)
                .connect_lazy_with(mysql.connect_options());

            StorageSink::MySql(MySqlSink::new(
                pool,
                mysql.table.clone(),
                cfg.sink.batch_size,
                cfg.sink.max_retries,
                Duration::from_millis(cfg.sink.retry_backoff_ms),
                cfg.sink.replace_existing_date,
            ))
        }
        SinkKind::Csv => {
            let path = cfg
                .sink
                .csv_path
                .clone()
                .ok_or_else(|| anyhow!("sink.kind = \"csv\" requires sink.csv_path"))?;
            StorageSink::Csv(CsvFileSink::new(path))
        }
    };

    let pipeline = Pipeline {
        extractor,
        transform: Arc::new(transform::HourlyUnpivot),
        sink,
    };

    let outcome = pipeline.run(date).await;

    if let Some(metrics_cfg) = &cfg.metrics {
        if let Err(e) = metrics_textfile::write_textfile(&metrics_cfg.textfile_path) {
            tracing::warn!(error = %e, "failed to write metrics textfile");
        }
    }

    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
