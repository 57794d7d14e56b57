use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};

use genco_client::domain::HourlyGeneration;

use crate::pipeline::{Envelope, PipelineError, Sink};

/// Appends hourly records to a CSV file with the table's column layout.
///
/// The header row is written only when the file is new or empty.
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, records: &[HourlyGeneration]) -> Result<u64, PipelineError> {
        let storage = |e: &dyn std::fmt::Display| {
            PipelineError::Storage(format!("{}: {e}", self.path.display()))
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| storage(&e))?;
        let needs_header = file.metadata().map_err(|e| storage(&e))?.len() == 0;

        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            wtr.write_record(HourlyGeneration::COLUMNS).map_err(|e| storage(&e))?;
        }
        for r in records {
            wtr.write_record([
                r.date.as_str(),
                r.hour.as_str(),
                r.gencos.as_str(),
                r.energy_generated_mwh.as_deref().unwrap_or(""),
            ])
            .map_err(|e| storage(&e))?;
        }
        wtr.flush().map_err(|e| storage(&e))?;

        Ok(records.len() as u64)
    }
}

#[async_trait::async_trait]
impl Sink<HourlyGeneration> for CsvFileSink {
    async fn load(&self, input: &Envelope<Vec<HourlyGeneration>>) -> Result<u64, PipelineError> {
        match self.append(&input.payload) {
            Ok(written) => {
                metrics::counter!("csv_ingested_records_total").increment(written);
                if let Ok(dur) = std::time::SystemTime::now().duration_since(input.received_at) {
                    metrics::histogram!("ingest_end_to_end_latency_seconds")
                        .record(dur.as_secs_f64());
                }
                tracing::info!(
                    rows = written,
                    path = %self.path.display(),
                    "data appended to csv"
                );
                Ok(written)
            }
            Err(e) => {
                metrics::counter!("csv_sink_errors_total").increment(1);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<HourlyGeneration> {
        vec![
            HourlyGeneration {
                date: "2024-01-01".to_string(),
                hour: "00:00".to_string(),
                gencos: "Shiroro".to_string(),
                energy_generated_mwh: Some("250.4".to_string()),
            },
            HourlyGeneration {
                date: "2024-01-01".to_string(),
                hour: "01:00".to_string(),
                gencos: "Shiroro".to_string(),
                energy_generated_mwh: None,
            },
        ]
    }

    #[tokio::test]
    async fn appends_and_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvFileSink::new(dir.path().join("hourly.csv"));
        let env = Envelope::now(records());

        assert_eq!(sink.load(&env).await.unwrap(), 2);
        assert_eq!(sink.load(&env).await.unwrap(), 2);

        let contents = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "Date,Hour,Gencos,EnergyGeneratedMWh");
        assert_eq!(lines[1], "2024-01-01,00:00,Shiroro,250.4");
        assert_eq!(lines[2], "2024-01-01,01:00,Shiroro,");
        assert_eq!(lines.iter().filter(|l| l.starts_with("Date,")).count(), 1);
    }

    #[tokio::test]
    async fn unwritable_path_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvFileSink::new(dir.path().join("missing").join("hourly.csv"));

        let res = sink.load(&Envelope::now(records())).await;

        assert!(matches!(res, Err(PipelineError::Storage(_))));
    }
}
