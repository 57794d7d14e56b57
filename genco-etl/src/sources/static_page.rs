use std::time::Duration;

use genco_client::domain::date_label;
use reqwest::Client;
use time::Date;

use crate::{
    pipeline::{Envelope, Extractor, PipelineError},
    run_date,
    sources::{parse_grid, RawGrid},
};

/// Reads the report table straight from the landing page HTML.
///
/// The landing page only ever shows the latest readings, so the requested date
/// is used as a label and nothing more. Runs for any day other than today
/// will store today's figures under that day.
pub struct StaticPageSource {
    client: Client,
    base_url: String,
}

impl StaticPageSource {
    pub fn new(base_url: &str, page_load_timeout: Duration) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(page_load_timeout)
            .build()
            .map_err(|e| PipelineError::Navigation(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    async fn fetch_html(&self) -> Result<String, reqwest::Error> {
        self.client
            .get(&self.base_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

#[async_trait::async_trait]
impl Extractor for StaticPageSource {
    async fn extract(&self, date: Date) -> Result<Envelope<RawGrid>, PipelineError> {
        let label = date_label(date)
            .map_err(|e| PipelineError::Parse(format!("cannot format date: {e}")))?;

        if date != run_date::today() {
            tracing::warn!(
                %date,
                %label,
                "static page only serves the latest readings; rows keep the requested date"
            );
        }

        tracing::info!(url = %self.base_url, "fetching report page");
        let html = self
            .fetch_html()
            .await
            .map_err(|e| {
                PipelineError::Navigation(format!("failed to fetch {}: {e}", self.base_url))
            })?;

        let grid = parse_grid(&html, &label)?;
        Ok(Envelope::now(grid))
    }
}
