use time::macros::format_description;

/// One generating unit's output for one hour of one day.
///
/// Column names match the `combined_hourly_energy_generated_mwh` table, and
/// the field order is the insert order: `Date, Hour, Gencos, EnergyGeneratedMWh`.
/// Values are kept as the text scraped from the report; a blank cell is `None`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HourlyGeneration {
    #[sqlx(rename = "Date")]
    pub date: String,
    #[sqlx(rename = "Hour")]
    pub hour: String,
    #[sqlx(rename = "Gencos")]
    pub gencos: String,
    #[sqlx(rename = "EnergyGeneratedMWh")]
    pub energy_generated_mwh: Option<String>,
}

impl HourlyGeneration {
    pub const COLUMNS: [&'static str; 4] = ["Date", "Hour", "Gencos", "EnergyGeneratedMWh"];
}

/// Render a date the way the `Date` column stores it (`YYYY-MM-DD`).
pub fn date_label(date: time::Date) -> Result<String, time::error::Format> {
    date.format(format_description!("[year]-[month]-[day]"))
}

/// Parse a `YYYY-MM-DD` label back into a date.
pub fn parse_date_label(label: &str) -> Result<time::Date, time::error::Parse> {
    time::Date::parse(label.trim(), format_description!("[year]-[month]-[day]"))
}
