use anyhow::{anyhow, Result};
use genco_client::domain::parse_date_label;
use time::{Date, OffsetDateTime};

/// Today's date in local time, or UTC when the local offset is unknown.
pub fn today() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

pub fn yesterday() -> Result<Date> {
    today()
        .previous_day()
        .ok_or_else(|| anyhow!("no day before {}", today()))
}

/// The date a run should process: an explicit `YYYY-MM-DD` argument, or yesterday.
pub fn resolve(arg: Option<&str>) -> Result<Date> {
    match arg {
        Some(label) => parse_date_label(label)
            .map_err(|e| anyhow!("invalid date '{label}', expected YYYY-MM-DD: {e}")),
        None => yesterday(),
    }
}
