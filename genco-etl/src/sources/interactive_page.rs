use std::{
    fmt::Display,
    path::PathBuf,
    time::{Duration, Instant},
};

use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures::{Stream, StreamExt};
use genco_client::domain::date_label;
use serde_json::Value;
use time::Date;
use tokio::task::JoinHandle;

use crate::{
    config::{PageSelectors, RenderWait, SourceConfig},
    pipeline::{Envelope, Extractor, PipelineError},
    sources::{parse_grid, RawGrid},
};

/// Attribute put on every table present before the date is submitted.
const STALE_MARKER: &str = "data-genco-stale";

fn nav_err(context: &str) -> impl FnOnce(chromiumoxide::error::CdpError) -> PipelineError + '_ {
    move |e| PipelineError::Navigation(format!("{context}: {e}"))
}

/// Year, zero-based month and day, as the date picker's controls expect them.
fn picker_values(date: Date) -> (String, String, String) {
    let month_index = u8::from(date.month()) - 1;
    (
        date.year().to_string(),
        month_index.to_string(),
        date.day().to_string(),
    )
}

fn mark_stale_tables_script() -> String {
    format!(
        "(() => {{ document.querySelectorAll('table').forEach(t => t.setAttribute({marker}, '')); \
         return true; }})()",
        marker = Value::from(STALE_MARKER),
    )
}

/// True once a table headed by `header` exists that was not on the page
/// before submit, and it has at least one data cell.
fn ready_script(header: &str) -> String {
    format!(
        r#"(() => Array.from(document.querySelectorAll('th')).some(th => {{
            const table = th.closest('table');
            return th.textContent.trim() === {header}
                && table !== null
                && !table.hasAttribute({marker})
                && table.querySelector('td') !== null;
        }}))()"#,
        header = Value::from(header),
        marker = Value::from(STALE_MARKER),
    )
}

/// Drive browser events until the connection ends. Returns the number of
/// event errors seen; none of them stop the loop.
async fn drive_handler<S, T, E>(mut events: S) -> usize
where
    S: Stream<Item = Result<T, E>> + Unpin,
    E: Display,
{
    let mut errors = 0;
    while let Some(event) = events.next().await {
        if let Err(e) = event {
            errors += 1;
            tracing::debug!(error = %e, "browser handler error");
        }
    }
    errors
}

/// Wait for the handler task after closing the browser. A failed close
/// leaves the connection open, so the task is aborted instead.
async fn release_handler<E: Display>(closed: Result<(), E>, handler: JoinHandle<()>) {
    if let Err(e) = closed {
        tracing::warn!(error = %e, "failed to close browser");
        handler.abort();
    }
    let _ = handler.await;
}

/// Opens the hourly Genco report in headless Chromium and picks the date in
/// the report's jQuery UI date picker before reading the rendered table.
pub struct InteractivePageSource {
    base_url: String,
    page_load_timeout: Duration,
    selector_timeout: Duration,
    selector_poll: Duration,
    chrome_executable: Option<PathBuf>,
    selectors: PageSelectors,
    render_wait: RenderWait,
}

impl InteractivePageSource {
    pub fn new(cfg: &SourceConfig) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            page_load_timeout: cfg.page_load_timeout(),
            selector_timeout: cfg.selector_timeout(),
            selector_poll: cfg.selector_poll(),
            chrome_executable: cfg.chrome_executable.clone(),
            selectors: cfg.page.clone(),
            render_wait: cfg.render_wait.clone(),
        }
    }

    async fn launch(&self) -> Result<(Browser, JoinHandle<()>), PipelineError> {
        let mut builder = BrowserConfig::builder().request_timeout(self.page_load_timeout);
        if let Some(path) = &self.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| PipelineError::Navigation(format!("invalid browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(nav_err("failed to launch browser"))?;

        let handle = tokio::spawn(async move {
            let errors = drive_handler(&mut handler).await;
            tracing::debug!(errors, "browser handler finished");
        });

        Ok((browser, handle))
    }

    /// Walk the report form for `date` and return the rendered page HTML.
    async fn render_report(&self, browser: &Browser, date: Date) -> Result<String, PipelineError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(nav_err("failed to open page"))?;

        tracing::info!(url = %self.base_url, "navigating to report site");
        tokio::time::timeout(self.page_load_timeout, page.goto(self.base_url.clone()))
            .await
            .map_err(|_| {
                PipelineError::Navigation(format!(
                    "timed out after {:?} loading {}",
                    self.page_load_timeout, self.base_url
                ))
            })?
            .map_err(nav_err("failed to load report site"))?;

        self.wait_for(&page, &self.selectors.report_link)
            .await?
            .click()
            .await
            .map_err(nav_err("failed to open hourly report"))?;

        self.wait_for(&page, &self.selectors.date_input)
            .await?
            .click()
            .await
            .map_err(nav_err("failed to open date picker"))?;

        let (year, month_index, day) = picker_values(date);
        self.select_option(&page, &self.selectors.year_select, &year).await?;
        self.select_option(&page, &self.selectors.month_select, &month_index).await?;
        self.click_day(&page, &day).await?;

        let submit = self.wait_for(&page, &self.selectors.submit_button).await?;
        page.evaluate(mark_stale_tables_script())
            .await
            .map_err(nav_err("failed to mark current tables"))?;
        submit.click().await.map_err(nav_err("failed to submit date"))?;

        self.wait_for_render(&page).await?;

        page.content().await.map_err(nav_err("failed to read rendered page"))
    }

    /// Poll for `selector` until it appears or the selector timeout elapses.
    async fn wait_for(&self, page: &Page, selector: &str) -> Result<Element, PipelineError> {
        let started = Instant::now();
        loop {
            match page.find_element(selector).await {
                Ok(el) => return Ok(el),
                Err(_) if started.elapsed() < self.selector_timeout => {
                    tokio::time::sleep(self.selector_poll).await;
                }
                Err(e) => {
                    return Err(PipelineError::Navigation(format!(
                        "selector '{selector}' not found within {:?}: {e}",
                        self.selector_timeout
                    )));
                }
            }
        }
    }

    /// Set a `<select>` value and fire `change` so the date picker redraws.
    async fn select_option(
        &self,
        page: &Page,
        selector: &str,
        value: &str,
    ) -> Result<(), PipelineError> {
        self.wait_for(page, selector).await?;

        let script = format!(
            r#"(() => {{
                const el = document.querySelector({selector});
                if (!el) return false;
                el.value = {value};
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return el.value === {value};
            }})()"#,
            selector = Value::from(selector),
            value = Value::from(value),
        );

        let selected: bool = page
            .evaluate(script)
            .await
            .map_err(nav_err("failed to run select script"))?
            .into_value()
            .map_err(|e| {
                PipelineError::Navigation(format!("unexpected select script result: {e}"))
            })?;

        if !selected {
            return Err(PipelineError::Navigation(format!(
                "option '{value}' not available in '{selector}'"
            )));
        }
        tracing::debug!(selector, value, "date picker option selected");
        Ok(())
    }

    async fn click_day(&self, page: &Page, wanted: &str) -> Result<(), PipelineError> {
        let started = Instant::now();
        loop {
            if let Ok(links) = page.find_elements(self.selectors.day_links.as_str()).await {
                for link in links {
                    let text = link.inner_text().await.ok().flatten().unwrap_or_default();
                    if text.trim() == wanted {
                        link.click().await.map_err(nav_err("failed to click day"))?;
                        return Ok(());
                    }
                }
            }
            if started.elapsed() >= self.selector_timeout {
                return Err(PipelineError::Navigation(format!(
                    "day {wanted} not found in date picker within {:?}",
                    self.selector_timeout
                )));
            }
            tokio::time::sleep(self.selector_poll).await;
        }
    }

    async fn wait_for_render(&self, page: &Page) -> Result<(), PipelineError> {
        match &self.render_wait {
            RenderWait::Fixed { settle_delay_ms } => {
                tracing::debug!(settle_delay_ms, "waiting for report to render");
                tokio::time::sleep(Duration::from_millis(*settle_delay_ms)).await;
                Ok(())
            }
            RenderWait::Poll {
                poll_interval_ms,
                max_wait_ms,
            } => {
                let script = ready_script(&self.selectors.ready_header);
                let max_wait = Duration::from_millis(*max_wait_ms);
                let started = Instant::now();
                loop {
                    let ready = match page.evaluate(script.as_str()).await {
                        Ok(result) => result.into_value::<bool>().unwrap_or(false),
                        Err(e) => {
                            tracing::debug!(error = %e, "render check failed, retrying");
                            false
                        }
                    };
                    if ready {
                        return Ok(());
                    }
                    if started.elapsed() >= max_wait {
                        return Err(PipelineError::Navigation(format!(
                            "report table did not render within {max_wait:?}"
                        )));
                    }
                    tokio::time::sleep(Duration::from_millis(*poll_interval_ms)).await;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Extractor for InteractivePageSource {
    async fn extract(&self, date: Date) -> Result<Envelope<RawGrid>, PipelineError> {
        let label = date_label(date)
            .map_err(|e| PipelineError::Parse(format!("cannot format date: {e}")))?;

        let (mut browser, handler) = self.launch().await?;
        let rendered = self.render_report(&browser, date).await;

        let closed = browser.close().await.map(|_| ());
        drop(browser);
        release_handler(closed, handler).await;

        let html = rendered?;
        let grid = parse_grid(&html, &label)?;
        tracing::info!(%date, rows = grid.rows.len(), "scraped hourly report");
        Ok(Envelope::now(grid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use time::macros::date;

    #[tokio::test]
    async fn handler_keeps_running_after_event_errors() {
        let events = stream::iter(vec![
            Ok(1),
            Err("unknown message"),
            Ok(2),
            Err("unknown message"),
            Ok(3),
        ]);
        assert_eq!(drive_handler(events).await, 2);
    }

    #[tokio::test]
    async fn failed_close_does_not_hang_on_a_live_handler() {
        let handler = tokio::spawn(futures::future::pending::<()>());
        let released = tokio::time::timeout(
            Duration::from_secs(1),
            release_handler(Err("connection still open"), handler),
        )
        .await;
        assert!(released.is_ok());
    }

    #[tokio::test]
    async fn clean_close_waits_for_the_handler() {
        let handler = tokio::spawn(async {});
        release_handler(Ok::<(), &str>(()), handler).await;
    }

    #[test]
    fn picker_month_is_zero_based() {
        assert_eq!(
            picker_values(date!(2024 - 01 - 31)),
            ("2024".to_string(), "0".to_string(), "31".to_string())
        );
        assert_eq!(picker_values(date!(2023 - 12 - 01)).1, "11");
    }

    #[test]
    fn picker_day_is_not_zero_padded() {
        let (_, month, day) = picker_values(date!(2024 - 03 - 05));
        assert_eq!(month, "2");
        assert_eq!(day, "5");
    }

    #[test]
    fn ready_check_ignores_tables_from_before_submit() {
        let mark = mark_stale_tables_script();
        assert!(mark.contains("\"data-genco-stale\""));

        let ready = ready_script("Genco");
        assert!(ready.contains("=== \"Genco\""));
        assert!(ready.contains("!table.hasAttribute(\"data-genco-stale\")"));
    }

    #[test]
    fn ready_check_escapes_header_label() {
        let ready = ready_script("Gen\"co");
        assert!(ready.contains(r#"=== "Gen\"co""#));
    }
}
