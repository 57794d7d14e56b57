use serde::Deserialize;
use sqlx::mysql::MySqlConnectOptions;
use std::{env, fs, path::PathBuf, time::Duration};

pub const CONFIG_PATH_ENV: &str = "GENCO_ETL_CONFIG";
pub const PASSWORD_ENV: &str = "GENCO_DB_PASSWORD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    /// Drive the report's date picker in a headless browser.
    Interactive,
    /// Fetch the landing page HTML as-is. Always returns the latest data.
    Static,
}

/// How long to wait for the report table after submitting the date.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderWait {
    Fixed { settle_delay_ms: u64 },
    Poll { poll_interval_ms: u64, max_wait_ms: u64 },
}

impl Default for RenderWait {
    fn default() -> Self {
        RenderWait::Fixed { settle_delay_ms: 8_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PageSelectors {
    pub report_link: String,
    pub date_input: String,
    pub year_select: String,
    pub month_select: String,
    pub day_links: String,
    pub submit_button: String,
    /// Header label whose presence marks the report table as rendered.
    pub ready_header: String,
}

impl Default for PageSelectors {
    fn default() -> Self {
        Self {
            report_link: "#sideContent_loginVWShortCuts_lnkGencoProfile2".to_string(),
            date_input: "#MainContent_txtReadingDate".to_string(),
            year_select: "#ui-datepicker-div > div > div > select:nth-of-type(2)".to_string(),
            month_select: "#ui-datepicker-div > div > div > select:nth-of-type(1)".to_string(),
            day_links: "#ui-datepicker-div > table > tbody > tr > td > a".to_string(),
            submit_button: "#MainContent_btnGetReadings".to_string(),
            ready_header: "Genco".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub mode: SourceMode,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_page_load_timeout_ms")]
    pub page_load_timeout_ms: u64,
    #[serde(default = "default_selector_timeout_ms")]
    pub selector_timeout_ms: u64,
    #[serde(default = "default_selector_poll_ms")]
    pub selector_poll_ms: u64,
    pub chrome_executable: Option<PathBuf>,
    #[serde(default)]
    pub page: PageSelectors,
    #[serde(default)]
    pub render_wait: RenderWait,
}

impl SourceConfig {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_millis(self.page_load_timeout_ms)
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.selector_timeout_ms)
    }

    pub fn selector_poll(&self) -> Duration {
        Duration::from_millis(self.selector_poll_ms)
    }
}

fn default_base_url() -> String {
    "https://www.niggrid.org/".to_string()
}

fn default_page_load_timeout_ms() -> u64 {
    120_000
}

fn default_selector_timeout_ms() -> u64 {
    30_000
}

fn default_selector_poll_ms() -> u64 {
    250
}

#[derive(Debug, Clone, Deserialize)]
pub struct MySqlConfig {
    pub host: String,
    #[serde(default = "default_mysql_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl MySqlConfig {
    /// Password from the file, falling back to `GENCO_DB_PASSWORD`.
    pub fn password(&self) -> Option<String> {
        self.password.clone().or_else(|| env::var(PASSWORD_ENV).ok())
    }

    pub fn connect_options(&self) -> MySqlConnectOptions {
        let options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user);
        match self.password() {
            Some(password) => options.password(&password),
            None => options,
        }
    }
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_table() -> String {
    "combined_hourly_energy_generated_mwh".to_string()
}

fn default_max_connections() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    #[default]
    Mysql,
    Csv,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    pub csv_path: Option<PathBuf>,
    /// Delete the date's existing rows before appending, in the same transaction.
    #[serde(default)]
    pub replace_existing_date: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::default(),
            batch_size: default_batch_size(),
            max_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
            csv_path: None,
            replace_existing_date: false,
        }
    }
}

fn default_batch_size() -> usize {
    1000
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus exposition written here at the end of each run.
    pub textfile_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub mysql: Option<MySqlConfig>,
    #[serde(default)]
    pub sink: SinkConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "etl-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config '{path}': {e}"))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.sink.batch_size == 0 {
            anyhow::bail!("sink.batch_size must be at least 1");
        }
        match self.sink.kind {
            SinkKind::Mysql if self.mysql.is_none() => {
                anyhow::bail!("sink.kind = \"mysql\" requires a [mysql] section")
            }
            SinkKind::Csv if self.sink.csv_path.is_none() => {
                anyhow::bail!("sink.kind = \"csv\" requires sink.csv_path")
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [source]
            mode = "interactive"

            [mysql]
            host = "db.internal"
            database = "nesidb"
            user = "etl"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.source.mode, SourceMode::Interactive);
        assert_eq!(cfg.source.base_url, "https://www.niggrid.org/");
        assert_eq!(cfg.source.page_load_timeout(), Duration::from_secs(120));
        assert_eq!(cfg.source.render_wait, RenderWait::Fixed { settle_delay_ms: 8_000 });
        assert_eq!(cfg.source.page, PageSelectors::default());

        let mysql = cfg.mysql.unwrap();
        assert_eq!(mysql.port, 3306);
        assert_eq!(mysql.table, "combined_hourly_energy_generated_mwh");

        assert_eq!(cfg.sink.kind, SinkKind::Mysql);
        assert_eq!(cfg.sink.batch_size, 1000);
        assert!(!cfg.sink.replace_existing_date);
        assert!(cfg.metrics.is_none());
    }

    #[test]
    fn poll_render_wait_and_csv_sink_parse() {
        let cfg = AppConfig::from_toml_str(
            r##"
            [source]
            mode = "static"

            [source.render_wait]
            kind = "poll"
            poll_interval_ms = 500
            max_wait_ms = 20000

            [source.page]
            submit_button = "#btnGo"

            [sink]
            kind = "csv"
            csv_path = "/var/lib/genco/hourly.csv"
            "##,
        )
        .unwrap();

        assert_eq!(cfg.source.mode, SourceMode::Static);
        assert_eq!(
            cfg.source.render_wait,
            RenderWait::Poll {
                poll_interval_ms: 500,
                max_wait_ms: 20_000
            }
        );
        assert_eq!(cfg.source.page.submit_button, "#btnGo");
        assert_eq!(cfg.source.page.date_input, "#MainContent_txtReadingDate");
        assert_eq!(cfg.sink.kind, SinkKind::Csv);
    }

    #[test]
    fn mysql_sink_without_connection_is_rejected() {
        let err = AppConfig::from_toml_str(
            r#"
            [source]
            mode = "interactive"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("[mysql]"));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let res = AppConfig::from_toml_str(
            r#"
            [source]
            mode = "static"

            [sink]
            kind = "csv"
            csv_path = "out.csv"
            batch_size = 0
            "#,
        );
        assert!(res.is_err());
    }
}
